/// Identity of the active playback session
///
/// Guarded by the player's state lock. Every `begin` and `end` bumps the
/// generation, so a writer that sleeps through a stop or a restart can tell
/// its session is gone even when the old and new ids are equal.
#[derive(Debug, Default)]
pub struct SessionGuard {
    id: Option<String>,
    generation: u64,
    eof: bool,
    writers: usize,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session, copying the caller's id
    pub fn begin(&mut self, id: Option<&str>) -> u64 {
        self.id = id.map(str::to_owned);
        self.eof = false;
        self.generation += 1;
        self.generation
    }

    /// Close the current session
    pub fn end(&mut self) {
        self.id = None;
        self.eof = false;
        self.generation += 1;
    }

    /// Whether a write tagged `id` belongs to this session; `None` matches `None`
    pub fn matches(&self, id: Option<&str>) -> bool {
        self.id.as_deref() == id
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn set_eof(&mut self, eof: bool) {
        self.eof = eof;
    }

    pub fn enter_write(&mut self) {
        self.writers += 1;
    }

    pub fn leave_write(&mut self) {
        self.writers = self.writers.saturating_sub(1);
    }

    /// Whether any `write()` call is still inside its copy loop
    pub fn is_writing(&self) -> bool {
        self.writers > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching() {
        let mut session = SessionGuard::new();
        session.begin(Some("A"));

        assert!(session.matches(Some("A")));
        assert!(!session.matches(Some("B")));
        assert!(!session.matches(None));

        session.begin(None);
        assert!(session.matches(None));
        assert!(!session.matches(Some("A")));
    }

    #[test]
    fn test_id_is_copied() {
        let mut session = SessionGuard::new();
        {
            let id = String::from("turn-7");
            session.begin(Some(&id));
        }
        assert_eq!(session.id(), Some("turn-7"));
    }

    #[test]
    fn test_generation_changes_on_begin_and_end() {
        let mut session = SessionGuard::new();

        let first = session.begin(None);
        session.end();
        let second = session.begin(None);

        assert!(second > first + 1);
        assert_eq!(session.generation(), second);
    }

    #[test]
    fn test_end_clears_state() {
        let mut session = SessionGuard::new();
        session.begin(Some("A"));
        session.set_eof(true);

        session.end();

        assert_eq!(session.id(), None);
        assert!(!session.is_eof());
    }

    #[test]
    fn test_writers_survive_session_changes() {
        let mut session = SessionGuard::new();
        session.begin(Some("A"));
        session.enter_write();
        session.enter_write();

        session.end();
        assert!(session.is_writing());

        session.leave_write();
        session.leave_write();
        session.leave_write();
        assert!(!session.is_writing());
    }
}
