use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;

use log::{debug, error, warn};

use crate::audio::adapter::{DecodeOutcome, DecoderAdapter};
use crate::audio::clock::{PrimingGate, StarvationTimer};
use crate::audio::decoder::DecoderFactory;
use crate::audio::lock;
use crate::audio::player::{Command, PlayerState, Shared};

/// What one decode step produced, detached from the adapter's buffers
#[derive(Clone, Copy)]
enum Step {
    Decoded,
    Skipped(usize),
    NeedMoreData,
    Failed,
}

/// Background side of the player: owns the decoder and every sink push
pub(crate) struct PlayerTask {
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    adapter: DecoderAdapter,
    factory: DecoderFactory,
    timer: StarvationTimer,
    priming: Option<PrimingGate>,
    state: PlayerState,
}

impl PlayerTask {
    pub fn new(
        shared: Arc<Shared>,
        commands: Receiver<Command>,
        adapter: DecoderAdapter,
        factory: DecoderFactory,
    ) -> Self {
        let timer = StarvationTimer::new(shared.config.starvation_timeout());
        Self {
            shared,
            commands,
            adapter,
            factory,
            timer,
            priming: None,
            state: PlayerState::Idle,
        }
    }

    pub fn run(mut self) {
        #[cfg(target_os = "macos")]
        raise_priority();

        debug!("Player task running");
        loop {
            let poll = if self.state == PlayerState::Idle {
                self.shared.config.idle_poll()
            } else {
                self.shared.config.active_poll()
            };

            match self.commands.recv_timeout(poll) {
                Ok(Command::Transition(target)) => self.apply(target),
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            if self.state == PlayerState::Play {
                self.play_step();
            }
        }
        debug!("Player task exiting");
    }

    fn apply(&mut self, target: PlayerState) {
        match target {
            PlayerState::Start => self.enter_start(),
            PlayerState::Pause => {
                self.timer.cancel();
                self.priming = None;
                self.set_state(PlayerState::Pause);
            }
            PlayerState::Idle => {
                self.timer.cancel();
                self.set_state(PlayerState::Idle);
            }
            // Entered from play_step only
            PlayerState::Play | PlayerState::Finish => warn!("Ignoring direct request to enter {}", target),
        }

        lock(&self.shared.control).applied += 1;
        self.shared.notify();
    }

    fn enter_start(&mut self) {
        match self.adapter.prepare(&mut self.factory) {
            Ok(()) => {
                let config = &self.shared.config;
                let now = self.shared.clock.now();
                self.priming = Some(PrimingGate::new(now, config.priming_threshold_bytes, config.priming_window()));
                // Starvation counts from the start of the session, not from the first miss
                self.timer.cancel();
                self.timer.arm_if_idle(now);
                self.shared.stats.reset();
                self.set_state(PlayerState::Play);
            }
            Err(e) => {
                let reason = e.to_string();
                let session_id = {
                    let mut control = lock(&self.shared.control);
                    let session_id = control.session.id().map(str::to_owned);
                    control.session.end();
                    control.state = PlayerState::Idle;
                    control.start_error = Some(e);
                    self.shared.playing.store(false, Ordering::SeqCst);
                    session_id
                };
                self.state = PlayerState::Idle;

                self.shared.logger.log_decoder_init_failed(session_id.as_deref(), &reason);
                self.shared.logger.log_state_changed(PlayerState::Start.as_str(), PlayerState::Idle.as_str());
            }
        }
    }

    fn play_step(&mut self) {
        let now = self.shared.clock.now();

        if let Some(gate) = self.priming.as_mut() {
            let buffered = lock(&self.shared.ring).used();
            if !gate.ready(buffered, now) {
                return;
            }
            debug!("Priming done with {} bytes buffered", buffered);
            self.priming = None;
            self.shared.stats.priming.store(false, Ordering::Relaxed);
        }

        let shared = &self.shared;
        let step = match self.adapter.feed_and_decode(&shared.ring) {
            Ok(DecodeOutcome::Decoded(block)) => {
                let pushed = lock(&shared.sink).push(&block);
                if let Err(e) = pushed {
                    warn!("Playback sink rejected {} bytes: {}", block.byte_len(), e);
                    let session_id = lock(&shared.control).session.id().map(str::to_owned);
                    shared.logger.log_sink_error(session_id.as_deref(), &e.to_string());
                }
                shared.stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
                shared.stats.pcm_bytes.fetch_add(block.byte_len() as u64, Ordering::Relaxed);
                Step::Decoded
            }
            Ok(DecodeOutcome::Skipped { bytes }) => Step::Skipped(bytes),
            Ok(DecodeOutcome::NeedMoreData) => Step::NeedMoreData,
            Err(e) => {
                error!("Decoder failed, finishing session: {}", e);
                Step::Failed
            }
        };

        match step {
            Step::Decoded => self.timer.cancel(),
            Step::Skipped(bytes) => {
                debug!("Skipped {} undecodable bytes", bytes);
                self.timer.cancel();
            }
            Step::NeedMoreData => self.timer.arm_if_idle(now),
            Step::Failed => {
                self.finish();
                return;
            }
        }

        let drained = {
            let control = lock(&self.shared.control);
            control.session.is_eof() && lock(&self.shared.ring).is_empty()
        };

        if drained && matches!(step, Step::NeedMoreData) && self.adapter.staged() > 0 {
            // Trailing tag or truncated last frame: nothing more will complete it
            let dropped = self.adapter.discard_staged();
            debug!("Discarded {} trailing bytes at end of stream", dropped);
        }
        self.shared.stats.staged_bytes.store(self.adapter.staged(), Ordering::Relaxed);

        if drained && self.adapter.staged() == 0 {
            self.finish();
        } else if self.timer.expired(now) {
            let session_id = lock(&self.shared.control).session.id().map(str::to_owned);
            self.shared
                .logger
                .log_starvation(session_id.as_deref(), self.shared.config.starvation_timeout_ms);
            self.finish();
        }
    }

    /// Close the session after a drain, starvation or decoder failure
    fn finish(&mut self) {
        self.timer.cancel();
        self.priming = None;

        let (from, session_id) = {
            let mut control = lock(&self.shared.control);
            let from = control.state;
            let session_id = control.session.id().map(str::to_owned);
            self.shared.playing.store(false, Ordering::SeqCst);
            control.session.end();
            control.state = PlayerState::Idle;
            (from, session_id)
        };
        self.state = PlayerState::Idle;
        self.shared.notify();

        let logger = &self.shared.logger;
        logger.log_state_changed(from.as_str(), PlayerState::Finish.as_str());
        logger.log_state_changed(PlayerState::Finish.as_str(), PlayerState::Idle.as_str());
        logger.log_session_finished(
            session_id.as_deref(),
            self.shared.stats.frames_decoded.load(Ordering::Relaxed),
            self.shared.stats.pcm_bytes.load(Ordering::Relaxed),
        );
    }

    fn set_state(&mut self, to: PlayerState) {
        let from = {
            let mut control = lock(&self.shared.control);
            let from = control.state;
            control.state = to;
            from
        };
        self.state = to;
        self.shared.notify();

        if from != to {
            self.shared.logger.log_state_changed(from.as_str(), to.as_str());
        }
    }
}

/// Run the decode loop at real-time priority
#[cfg(target_os = "macos")]
fn raise_priority() {
    unsafe {
        let thread = libc::pthread_self();
        let mut policy: libc::c_int = 0;
        let mut param: libc::sched_param = std::mem::zeroed();

        if libc::pthread_getschedparam(thread, &mut policy, &mut param) == 0 {
            param.sched_priority = 47;
            let _ = libc::pthread_setschedparam(thread, libc::SCHED_FIFO, &param);
        }
    }
}
