use clap::Parser;
use client::config::{ClientConfig, MatchmakingSource};
use client::environment::FileEnvironment;
use client::error::ConfigError;
use client::input::InputManager;
use client::lobby::ExitReason;
use client::network::{ClientCommand, GameClient};
use client::network_graph::LatencyGraph;
use client::rendering::Renderer;
use client::view::{ChannelView, DisplayEvent, RenderFrame};
use log::{info, warn};
use macroquad::prelude::*;
use shared::PlayerId;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

// Seconds the final frame stays up after the session ends
const LINGER_SECS: f64 = 3.0;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host and port
    #[arg(short = 's', long, default_value = "127.0.0.1:8000")]
    host: String,

    /// Use wss:// and https://
    #[arg(long)]
    secure: bool,

    /// Page path the game was opened from, e.g. /multiplayer/pong or /lobby/guest/pong
    #[arg(short = 'p', long, default_value = "/multiplayer/pong")]
    path: String,

    /// Game name used in room urls
    #[arg(long, default_value = "pong")]
    game: String,

    /// Local player id
    #[arg(short = 'i', long, default_value = "1", allow_negative_numbers = true)]
    player_id: i64,

    /// Matchmaking endpoint returning {room_name}
    #[arg(long)]
    matchmaking_url: Option<String>,

    /// Use the matchmaking queue socket instead of HTTP
    #[arg(long, conflicts_with = "matchmaking_url")]
    queue: bool,

    #[arg(long, default_value = "5000")]
    matchmaking_timeout_ms: u64,

    /// Disable heartbeat probing
    #[arg(long)]
    no_heartbeat: bool,

    #[arg(long, default_value = "1000")]
    heartbeat_ms: u64,

    /// Round trip above which the connection counts as slow
    #[arg(long, default_value = "200")]
    slow_threshold_ms: u64,

    /// Consecutive samples needed to flip connection quality
    #[arg(long, default_value = "1")]
    slow_debounce: u32,

    #[arg(long, default_value = "60")]
    tick_hz: u32,

    /// Maximum ticks per wake-up, 0 for unlimited
    #[arg(long, default_value = "5")]
    max_catch_up: u32,

    /// Key/value file shared between host and guest
    #[arg(long, default_value = "pong_storage.json")]
    storage: PathBuf,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

impl Args {
    fn into_config(self) -> Result<ClientConfig, ConfigError> {
        let matchmaking = if self.queue {
            Some(MatchmakingSource::Queue)
        } else {
            self.matchmaking_url
                .map(|url| MatchmakingSource::Http { url })
        };

        let config = ClientConfig {
            host: self.host,
            secure: self.secure,
            page_path: self.path,
            game: self.game,
            player_id: PlayerId(self.player_id),
            matchmaking,
            matchmaking_timeout: Duration::from_millis(self.matchmaking_timeout_ms),
            heartbeat: (!self.no_heartbeat).then(|| Duration::from_millis(self.heartbeat_ms)),
            slow_threshold: Duration::from_millis(self.slow_threshold_ms),
            slow_debounce: self.slow_debounce,
            max_catch_up: self.max_catch_up,
            storage_path: self.storage,
            ..ClientConfig::default()
        }
        .with_tick_rate(self.tick_hz)?;

        config.validate()?;
        Ok(config)
    }
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Pong".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let (width, height) = (args.width, args.height);
    let config = args.into_config()?;
    let slow_threshold = config.slow_threshold;

    info!("Starting client...");
    info!("Host: {}, page: {}", config.host, config.page_path);
    info!("Controls: W/S or arrows to move, Esc to quit, G for latency graph");

    let (frames_tx, frames_rx) = watch::channel(RenderFrame::default());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (commands_tx, commands_rx) = mpsc::channel(64);
    let interrupt_tx = commands_tx.clone();

    // The session owns its own single-threaded runtime; macroquad keeps the
    // main thread for the window.
    let session = std::thread::spawn(move || -> Result<ExitReason, String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| e.to_string())?;

        runtime.block_on(async move {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = interrupt_tx.send(ClientCommand::WindowClosed).await;
                }
            });

            let env = FileEnvironment::new(config.storage_path.clone());
            let view = ChannelView::new(frames_tx, events_tx);
            let mut client = GameClient::new(config, view, env, commands_rx);
            client.run().await.map_err(|e| e.to_string())
        })
    });

    prevent_quit();
    let mut renderer = Renderer::new(width, height);
    let mut graph = LatencyGraph::new(slow_threshold);
    let mut input = InputManager::new();
    let mut alert: Option<String> = None;
    let mut ended_at: Option<f64> = None;

    loop {
        if is_quit_requested() {
            if ended_at.is_some() {
                break;
            }
            let _ = commands_tx.try_send(ClientCommand::WindowClosed);
        }

        if ended_at.is_none() {
            for command in input.update() {
                if commands_tx.try_send(command).is_err() {
                    warn!("Dropping {:?}, session is busy", command);
                }
            }
        }
        if input.take_graph_toggle() {
            graph.toggle_visibility();
        }

        while let Ok(event) = events_rx.try_recv() {
            match event {
                DisplayEvent::Alert(message) => alert = Some(message),
                DisplayEvent::ConnectionQuality { slow, round_trip } => {
                    info!("Connection slow: {} ({}ms)", slow, round_trip.as_millis());
                }
                _ => {}
            }
        }

        let frame = frames_rx.borrow().clone();
        graph.record_samples(&frame.latency);
        renderer.render(&frame, alert.as_deref());
        graph.render();

        if session.is_finished() {
            let ended = *ended_at.get_or_insert_with(get_time);
            if get_time() - ended > LINGER_SECS {
                break;
            }
        }

        next_frame().await;
    }

    drop(commands_tx);
    match session.join() {
        Ok(Ok(reason)) => {
            info!("Session ended: {}", reason);
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err("session thread panicked".into()),
    }
}
