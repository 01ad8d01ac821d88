//! # Pong Client Library
//!
//! Client core for server-authoritative multiplayer pong. The server owns the
//! game; this library keeps a local display consistent with what the server
//! broadcasts and forwards the player's key presses back upstream.
//!
//! ## Architecture Overview
//!
//! A session runs as one cooperative task. Network envelopes, heartbeat
//! timers, frame wake-ups and local commands are multiplexed with
//! `tokio::select!`, so no two handlers ever run at the same time.
//!
//! ### Connection
//! [`connection::ChannelSocket`] owns the single WebSocket of a session. It
//! speaks JSON envelopes, probes liveness with `ping`/`pong` heartbeats and
//! never reconnects by itself. Sends on a closed socket are dropped, not
//! queued: the next state broadcast supersedes anything lost.
//!
//! ### Latency
//! [`latency::LatencyMonitor`] classifies each heartbeat round trip against a
//! threshold and reports only transitions between normal and slow.
//!
//! ### Session Negotiation
//! [`session::SessionNegotiator`] picks the room before connecting:
//! - Singleplayer: room taken from the page path, optionally against the bot
//! - Matchmaking: HTTP round trip or matchmaking queue socket, with a timeout
//! - Private lobby and tournament: host generates the room id, guest reads it
//!   back from shared storage
//!
//! ### Lobby Lifecycle
//! [`lobby::LobbyStateMachine`] follows `TO_SETUP -> PLAYING -> ENDED` (or
//! `PLAYER_DISCONNECTED`) and turns envelopes into actions: outbound
//! envelopes, display updates, navigation and termination.
//!
//! ### Fixed-Step Loop
//! [`fixed_step::FixedStepLoop`] accumulates wall-clock time and drains it in
//! constant ticks, capping catch-up work per wake-up.
//!
//! ### Entity State
//! [`game::EntityStateSync`] mirrors paddles, ball, scores and countdown. It
//! never predicts: the local paddle only moves when the server says so.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::config::ClientConfig;
//! use client::environment::MemoryEnvironment;
//! use client::network::GameClient;
//! use client::view::RecordingView;
//!
//! # async fn demo() -> Result<(), client::error::ClientError> {
//! let (commands, receiver) = tokio::sync::mpsc::channel(16);
//! let mut session = GameClient::new(
//!     ClientConfig::default(),
//!     RecordingView::new(),
//!     MemoryEnvironment::new(),
//!     receiver,
//! );
//! let reason = session.run().await?;
//! println!("session ended: {}", reason);
//! # drop(commands);
//! # Ok(())
//! # }
//! ```
//!
//! ## Teardown
//!
//! Every way out of a session (game over, opponent gone, Esc, window close,
//! Ctrl-C, lost connection) goes through one teardown routine guarded by
//! [`network::TeardownGuard`]. Exactly one `quit_game` or `unexpected_quit`
//! envelope is sent per session.

pub mod config;
pub mod connection;
pub mod environment;
pub mod error;
pub mod fixed_step;
pub mod game;
pub mod input;
pub mod latency;
pub mod lobby;
pub mod network;
pub mod network_graph;
pub mod rendering;
pub mod session;
pub mod view;
