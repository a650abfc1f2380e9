use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sonar::config::{Config, DEFAULT_CONFIG_PATH};
use sonar::visualizer::ring;
use sonar::{
    AudioBackendFactory, CaptureSession, CaptureState, FrequencySnapshot, MicrophoneGate,
    Palette, PaletteExtractor, RecognitionClient, ResultDisplay, ResultView, SessionEvent,
    SessionHistory, VisualizerConfig,
};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code after Ctrl-C, as shells report it
const INTERRUPTED: u8 = 130;
const REDRAW_INTERVAL: Duration = Duration::from_millis(50);
const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Parser)]
#[command(name = "sonar")]
#[command(about = "Identify the song playing near your microphone")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (extension optional)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen once and identify the song
    Listen {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Listening time in seconds (overrides the config)
        #[arg(long)]
        duration: Option<u32>,
    },

    /// Check whether the recognition service is ready
    Ping,

    /// List available audio input devices
    Devices,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so `--format json` output stays clean
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Listen { format, duration } => listen(config, format, duration).await,
        Commands::Ping => ping(config).await,
        Commands::Devices => devices(),
    }
}

async fn listen(mut config: Config, format: OutputFormat, duration: Option<u32>) -> Result<ExitCode> {
    if let Some(duration) = duration {
        config.capture.duration_secs = duration;
    }

    let interrupt = CancellationToken::new();
    tokio::spawn({
        let interrupt = interrupt.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        }
    });

    let client = RecognitionClient::new(&config.service)?;
    eprintln!("Waiting for recognition service at {}...", client.base_url());
    if client.wait_until_ready(&interrupt).await.is_none() {
        return Ok(ExitCode::from(INTERRUPTED));
    }

    let backend = AudioBackendFactory::create(config.capture.backend())?;
    let session = CaptureSession::new(
        config.capture.session(),
        backend,
        Arc::new(client),
        SessionHistory::new(),
        MicrophoneGate::new(),
    );
    let mut events = session.subscribe();

    if let Err(e) = session.start().await {
        warn!("Could not start listening: {}", e);
        let message = session
            .state()
            .failure()
            .map(|kind| kind.message().to_string())
            .unwrap_or_else(|| e.to_string());
        eprintln!("{message}");
        return Ok(ExitCode::FAILURE);
    }

    let final_state = watch_session(&session, &mut events, &interrupt, &config.visualizer).await;
    eprintln!();

    match final_state {
        CaptureState::Found => {
            let Some(matched) = session.last_match().await else {
                return Ok(ExitCode::FAILURE);
            };

            let extractor = PaletteExtractor::new(&config.palette)?;
            let mut view = ResultView::open(Arc::clone(&matched), &extractor);
            let wait = Duration::from_secs(config.palette.fetch_timeout_secs.max(1));
            if tokio::time::timeout(wait, view.palette_settled()).await.is_err() {
                info!("Artwork colour not ready, using fallback");
            }

            let display = view.display();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&display)?),
                OutputFormat::Text => print_result(&display, &matched.when_label(Utc::now())),
            }
            view.close();

            Ok(ExitCode::SUCCESS)
        }
        CaptureState::Failed(kind) => {
            eprintln!("{}", kind.message());
            Ok(ExitCode::FAILURE)
        }
        _ => {
            eprintln!("Cancelled");
            Ok(ExitCode::from(INTERRUPTED))
        }
    }
}

/// Draw countdown and spectrum until the session settles or is cancelled
async fn watch_session(
    session: &CaptureSession,
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
    interrupt: &CancellationToken,
    visualizer: &VisualizerConfig,
) -> CaptureState {
    let snapshots = session.snapshots();
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    let mut status = String::from("Listening");

    loop {
        tokio::select! {
            _ = interrupt.cancelled() => {
                session.cancel().await;
                return session.state();
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Countdown(remaining)) => {
                    status = format!("Listening {remaining:>2}s");
                }
                Ok(SessionEvent::ClipReady { bytes }) => {
                    info!("Clip ready ({} bytes)", bytes);
                    status = String::from("Identifying...");
                }
                Ok(SessionEvent::StateChanged(state))
                    if state.is_settled() || state == CaptureState::Idle =>
                {
                    return state;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return session.state(),
            },
            _ = redraw.tick() => {
                let snapshot = snapshots.borrow().clone();
                eprint!("\r{:<16} {}", status, spectrum(&snapshot, visualizer));
                let _ = std::io::stderr().flush();
            }
        }
    }
}

/// One character per visualizer bar
fn spectrum(snapshot: &FrequencySnapshot, visualizer: &VisualizerConfig) -> String {
    ring(snapshot, visualizer)
        .iter()
        .map(|bar| {
            let level = if visualizer.height_spread > 0.0 {
                (bar.height - visualizer.min_height) / visualizer.height_spread
            } else {
                0.0
            };
            let index = (level * (LEVELS.len() - 1) as f32).round() as usize;
            LEVELS[index.min(LEVELS.len() - 1)]
        })
        .collect()
}

fn print_result(display: &ResultDisplay, identified: &str) {
    let Palette { r, g, b } = display.theme.accent;
    let accent = |text: &str| format!("\x1b[1;38;2;{r};{g};{b}m{text}\x1b[0m");

    println!("{}", accent(&display.title));
    println!("{}", display.artist);

    if let Some(album) = &display.album {
        println!("Album:      {album}");
    }
    if let Some(release) = &display.release {
        println!("Released:   {release}");
    }
    if let Some(popularity) = &display.popularity {
        let filled = (popularity.fill_percent / 5.0).round() as usize;
        println!(
            "Popularity: {}{} {}",
            accent(&"█".repeat(filled)),
            "░".repeat(20 - filled.min(20)),
            popularity.label()
        );
    }
    if let Some(confidence) = display.confidence_percent {
        println!("Confidence: {confidence}%");
    }
    if let Some(preview) = &display.preview {
        println!("Preview:    {}", preview.url);
    }
    if let Some(link) = &display.link {
        println!("Spotify:    {}", link.url);
    }
    println!("Identified {identified}");
}

async fn ping(config: Config) -> Result<ExitCode> {
    let client = RecognitionClient::new(&config.service)?;

    match client.ping().await {
        Ok(readiness) => {
            println!("{}", serde_json::to_string_pretty(&readiness)?);
            Ok(if readiness.is_ready() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(e) => {
            eprintln!("{} unreachable: {}", client.base_url(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(feature = "microphone")]
fn devices() -> Result<ExitCode> {
    use sonar::audio::microphone::CpalBackend;

    let devices = CpalBackend::list_devices()?;
    if devices.is_empty() {
        println!("No input devices found");
    }

    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        let format = match (device.sample_rate, device.channels) {
            (Some(rate), Some(channels)) => format!("{rate} Hz, {channels} ch"),
            _ => "format unknown".to_string(),
        };
        println!("{marker} {} ({format})", device.name);
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(not(feature = "microphone"))]
fn devices() -> Result<ExitCode> {
    anyhow::bail!("sonar was built without microphone support (enable the `microphone` feature)")
}
