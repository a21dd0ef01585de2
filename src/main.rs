use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use rustls::crypto::{ring, CryptoProvider};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hualai_viewer::cloud::{CameraDirectory, CredentialProvider, HualaiClient};
use hualai_viewer::config::{AppConfig, ConfigStore, CONFIG_PATH_ENV};
use hualai_viewer::events::EventBus;
use hualai_viewer::viewer::{TrackSink, ViewerController, ViewerDeps};
use hualai_viewer::webrtc::{KvsSignalingConnector, RtcPeerConnectionFactory};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// hualai-viewer command line arguments
#[derive(Parser, Debug)]
#[command(name = "hualai-viewer")]
#[command(version, about = "Live view for Hualai cloud cameras over WebRTC", long_about = None)]
struct CliArgs {
    /// Config file path (default: viewer.toml)
    #[arg(short = 'c', long, value_name = "FILE", env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and list the cameras on the account
    List,

    /// Watch a camera; type another camera id on stdin to switch, `quit` to stop
    View {
        /// Camera id (MAC) to start with
        camera: String,

        /// Record received H.264 / Opus into this directory
        #[arg(short = 'o', long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print events matching this topic as JSON (e.g. "viewer.*" or "*")
        #[arg(short = 'e', long, value_name = "TOPIC")]
        events: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    // Install default crypto provider (required by rustls 0.23+)
    CryptoProvider::install_default(ring::default_provider())
        .expect("Failed to install rustls crypto provider");

    tracing::info!("Starting hualai-viewer v{}", env!("CARGO_PKG_VERSION"));

    let config_path = ConfigStore::resolve_path(args.config);
    let store = ConfigStore::load(&config_path).await?;
    tracing::debug!("Configuration loaded from {}", store.path().display());
    let config = store.into_inner();

    match args.command {
        Command::List => list_cameras(config).await,
        Command::View {
            camera,
            output_dir,
            events,
        } => view(config, camera, output_dir, events).await,
    }
}

async fn list_cameras(config: AppConfig) -> anyhow::Result<()> {
    let client = HualaiClient::new(config)?;
    let token = client.access_token().await?;
    let cameras = client.list_cameras(&token).await?;

    if cameras.is_empty() {
        println!("No cameras on this account");
        return Ok(());
    }

    println!("{:<14} {:<24} {:<12} {:<8}", "MAC", "NAME", "MODEL", "STATE");
    for camera in &cameras {
        println!(
            "{:<14} {:<24} {:<12} {:<8}",
            camera.mac,
            camera.nickname,
            camera.product_model,
            if camera.is_online() { "online" } else { "offline" }
        );
    }
    Ok(())
}

async fn view(
    mut config: AppConfig,
    camera: String,
    output_dir: Option<PathBuf>,
    topic: Option<String>,
) -> anyhow::Result<()> {
    if output_dir.is_some() {
        config.sink.output_dir = output_dir;
    }

    let client = Arc::new(HualaiClient::new(config.clone())?);
    let sink = Arc::new(TrackSink::new(config.sink.output_dir.clone()));
    let events = Arc::new(EventBus::new());

    if let Some(topic) = topic {
        spawn_event_printer(&events, topic);
    }

    let deps = ViewerDeps {
        credentials: client.clone(),
        metadata: client,
        signaling: Arc::new(KvsSignalingConnector),
        peers: Arc::new(RtcPeerConnectionFactory),
        sink: sink.clone(),
    };
    let controller = ViewerController::new(deps, config.webrtc.clone(), events);
    spawn_status_logger(&controller);

    spawn_selection(&controller, camera);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let input = line.trim();
                    match input {
                        "" => continue,
                        "quit" | "exit" => break,
                        camera => spawn_selection(&controller, camera.to_string()),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            },
        }
    }

    controller.shutdown().await;
    tracing::info!(
        "Viewer stopped ({} RTP packets received)",
        sink.packets_received()
    );
    Ok(())
}

/// Run a selection in the background so a newer one can supersede it
fn spawn_selection(controller: &ViewerController, camera: String) {
    let controller = controller.clone();
    tokio::spawn(async move {
        controller.select_camera(&camera).await;
    });
}

fn spawn_status_logger(controller: &ViewerController) {
    let mut status = controller.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            if let Some(error) = &current.error {
                eprintln!("{}", error);
            } else if let Some(camera) = &current.camera {
                tracing::info!(
                    "{}: {}{}",
                    camera,
                    current.state,
                    if current.loading { " (loading)" } else { "" }
                );
            }
        }
    });
}

fn spawn_event_printer(events: &EventBus, topic: String) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !event.matches_topic(&topic) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(json) => println!("{}", json),
                        Err(e) => tracing::warn!("Failed to serialize event: {}", e),
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event printer lagged, {} events dropped", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "hualai_viewer=error,webrtc=error",
        LogLevel::Warn => "hualai_viewer=warn,webrtc=warn",
        LogLevel::Info => "hualai_viewer=info,webrtc=warn",
        LogLevel::Verbose => "hualai_viewer=debug,webrtc=warn",
        LogLevel::Debug => "hualai_viewer=debug,webrtc=info",
        LogLevel::Trace => "hualai_viewer=trace,webrtc=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
