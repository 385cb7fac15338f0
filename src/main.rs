use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use voice_stream_player::alert::{play_alert, AlertKind, AlertLibrary};
use voice_stream_player::audio::{CpalSink, DeviceManager, Player};
use voice_stream_player::cli::{CliApp, Commands, ConfigAction, StatusDisplay};
use voice_stream_player::config::{ConfigManager, PlayerConfig};
use voice_stream_player::feeder::StreamFeeder;
use voice_stream_player::logging::PlayerLogger;
use voice_stream_player::{AudioError, ConfigError, PlayerError};

/// Options for one `vsplay play` run
struct PlayOptions {
    file: PathBuf,
    session: Option<String>,
    chunk_bytes: usize,
    chunk_interval: Duration,
    volume: Option<u8>,
    device: Option<String>,
}

#[tokio::main]
async fn main() {
    // Default to 'warn' so log lines do not tear the progress line
    if std::env::var("VSPLAY_LOG_LEVEL").is_err() {
        std::env::set_var("VSPLAY_LOG_LEVEL", "warn");
    }
    if let Err(e) = PlayerLogger::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let app = CliApp::parse();
    if let Err(e) = run(app.command).await {
        error!("{}", e);
        StatusDisplay::display_error(&e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), PlayerError> {
    let mut config_manager = ConfigManager::new()?;

    match command {
        Commands::Play {
            file,
            session,
            chunk_bytes,
            chunk_interval_ms,
            volume,
            device,
        } => {
            let options = PlayOptions {
                file: CliApp::expand_path(&file.to_string_lossy()),
                session,
                chunk_bytes: chunk_bytes as usize,
                chunk_interval: Duration::from_millis(chunk_interval_ms),
                volume,
                device,
            };
            play_file(config_manager.get_config().clone(), options).await
        }
        Commands::Alert { kind } => play_alert_prompt(config_manager.get_config().clone(), kind).await,
        Commands::Devices => list_devices(config_manager.get_config()),
        Commands::Config { action } => configure(&mut config_manager, action),
    }
}

async fn play_file(config: PlayerConfig, options: PlayOptions) -> Result<(), PlayerError> {
    let reader = tokio::fs::File::open(&options.file).await?;
    let linger = config.max_output_latency();
    let player = open_player(config, options.volume, options.device.as_deref())?;

    player.start(options.session.as_deref())?;
    println!("Streaming {}", options.file.display());

    let progress = tokio::spawn(show_progress(Arc::clone(&player)));
    let feeder = StreamFeeder::new(options.chunk_bytes).with_pacing(options.chunk_interval);
    let report = feeder.feed(Arc::clone(&player), options.session, reader).await;
    if report.is_err() {
        player.stop()?;
    }

    wait_for_idle(&player).await;
    progress.abort();
    println!();

    let report = report?;
    if report.interrupted {
        println!("Stopped after {} bytes", report.bytes);
    } else {
        tokio::time::sleep(linger).await;
        println!("OK: Played {} bytes in {} chunks", report.bytes, report.chunks);
    }
    Ok(())
}

async fn play_alert_prompt(config: PlayerConfig, kind: AlertKind) -> Result<(), PlayerError> {
    let library = AlertLibrary::new(config.alert_directory.clone());
    let linger = config.max_output_latency();
    let player = open_player(config, None, None)?;

    let task_player = Arc::clone(&player);
    tokio::task::spawn_blocking(move || play_alert(&task_player, &library, kind))
        .await
        .map_err(|e| AudioError::StreamError(format!("Alert task failed: {}", e)))??;

    wait_for_idle(&player).await;
    tokio::time::sleep(linger).await;
    println!("OK: Played alert {}", kind);
    Ok(())
}

/// Build a player on the output device; Ctrl-C stops its session
fn open_player(config: PlayerConfig, volume: Option<u8>, device: Option<&str>) -> Result<Arc<Player>, PlayerError> {
    let volume = volume.map(CliApp::volume_gain).unwrap_or(config.default_volume);
    let device = device.map(str::to_owned).or_else(|| config.output_device.clone());

    let sink = CpalSink::open(device.as_deref(), volume, config.max_output_latency())?;
    info!("Output on '{}' at {:.0}% volume", sink.device_name(), volume * 100.0);

    let player = Arc::new(Player::new(config, sink)?);

    let stop_playback = player.interrupt_handler();
    ctrlc::set_handler(move || {
        println!("\nReceived interrupt signal. Stopping playback...");
        stop_playback();
    })
    .map_err(|e| AudioError::InitializationFailed(format!("Failed to set Ctrl-C handler: {}", e)))?;

    Ok(player)
}

async fn show_progress(player: Arc<Player>) {
    let mut interval = tokio::time::interval(Duration::from_millis(250));
    loop {
        interval.tick().await;
        StatusDisplay::display_compact_status(&player.status());
    }
}

async fn wait_for_idle(player: &Player) {
    while player.is_playing() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn list_devices(config: &PlayerConfig) -> Result<(), PlayerError> {
    let manager = DeviceManager::new()?;
    let devices = manager.list_devices();

    if devices.is_empty() {
        println!("No audio devices found");
        return Ok(());
    }

    println!("Available audio devices:");
    for device in devices {
        let marker = if config.output_device.as_deref() == Some(device.as_str()) { "*" } else { " " };
        println!("{} {}", marker, device);
    }
    Ok(())
}

fn configure(config_manager: &mut ConfigManager, action: ConfigAction) -> Result<(), PlayerError> {
    match action {
        ConfigAction::Show => {
            let text = toml::to_string_pretty(config_manager.get_config()).map_err(ConfigError::from)?;
            print!("{}", text);
        }
        ConfigAction::Path => println!("{}", config_manager.config_path().display()),
        ConfigAction::Reset => {
            config_manager.reset_to_defaults()?;
            println!("OK: Configuration reset ({})", config_manager.config_path().display());
        }
    }
    Ok(())
}
