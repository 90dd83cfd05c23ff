//! Session engine for split timers.
//!
//! Producers (games, autosplitters, manual clients) connect over a Unix
//! socket and drive one [`session::Session`] each with a line protocol.
//! The [`server::Server`] multiplexes every connection onto a single loop
//! that owns the [`registry::Registry`] and publishes the foreground
//! session as a [`snapshot::SessionSnapshot`].
//!
//! ```text
//! producer ──lines──▶ reader task ──Event──▶ server loop ──▶ Session/Timer
//!    ▲                                           │
//!    └──────replies────── writer task ◀──────────┘──▶ watch<SessionSnapshot>
//! ```

pub mod categories;
pub mod codec;
pub mod command;
pub mod config;
pub mod registry;
pub mod server;
pub mod session;
pub mod snapshot;

pub use codec::{CodecError, LineCodec};
pub use command::{Command, DecodeError, PROTOCOL_VERSION};
pub use config::{FileConfig, ServerConfig, SplitdConfig, load_config};
pub use registry::Registry;
pub use server::{Server, SnapshotReceiver};
pub use session::{Session, SessionId};
pub use snapshot::{Row, SessionSnapshot};
