//! `punch-chat`: peer-to-peer text chat over a hole-punched UDP path.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  ping every interval   ┌────────┐
//!  │ Puncher  │───────────────────────▶│  peer  │
//!  └────┬─────┘                        └───┬────┘
//!       │            chat / ping           │
//!  ┌────▼──────┐◀──────────────────────────┘
//!  │  Socket   │  (one tokio UdpSocket, shared via Arc)
//!  └────┬──────┘
//!       │ raw datagrams
//!  ┌────▼──────┐  Keepalive / Data   ┌───────────┐   append   ┌──────────┐
//!  │ Listener  │────────────────────▶│  Session  │───────────▶│ Timeline │
//!  └───────────┘                     └─────┬─────┘            └──────────┘
//!                      UserInput ─────────▶│ View
//!                                          ▼
//!                                      Renderer
//! ```
//!
//! Each module has a single responsibility:
//! - [`wire`]:       reserved payloads and classification
//! - [`socket`]:     async UDP socket abstraction
//! - [`event`]:      events produced for the session loop
//! - [`listener`]:   receive loop publishing classified events
//! - [`puncher`]:    keep-alive / hole-punch timer
//! - [`discovery`]:  `whoami` / `addr:` external-address exchange
//! - [`timeline`]:   ordered message store and delivery confidence
//! - [`input`]:      single-line editor
//! - [`state`]:      session state-machine types
//! - [`session`]:    the reactive loop and its transitions
//! - [`clipboard`]:  copy targets for selected messages
//! - [`tui`]:        full-screen terminal frontend
//! - [`plain`]:      line-oriented frontend
//! - [`config`]:     startup configuration
//! - [`app`]:        wiring and shutdown

pub mod app;
pub mod clipboard;
pub mod config;
pub mod discovery;
pub mod event;
pub mod input;
pub mod listener;
pub mod plain;
pub mod puncher;
pub mod session;
pub mod socket;
pub mod state;
pub mod timeline;
pub mod tui;
pub mod wire;

pub use config::SessionConfig;
pub use session::{Session, SessionError};
