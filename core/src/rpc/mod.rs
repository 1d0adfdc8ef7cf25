//! Remote control of a running player
//!
//! A primary instance listens on a loopback TCP port and exposes named
//! modules of allow-listed commands. Requests and responses are single lines
//! of JSON:
//!
//! ```text
//! {"module":"Software","command":"IsRunning","arguments":null}
//! {"succeeded":true,"message":"","result":"true"}
//! ```
//!
//! A connection serves one request unless the client first sends
//! `Rpc.KeepAlive`, in which case it stays open until `Rpc.Disconnect`.
//!
//! # Example
//!
//! ```bash
//! echo '{"module":"Playlist","command":"Count","arguments":null}' | nc 127.0.0.1 49420
//! ```

mod client;
mod instance;
mod module;
pub mod names;
mod proxy;
mod registry;
mod server;
mod session;
mod types;

#[cfg(test)]
mod tests;

pub use client::{ClientConfig, ClientError, ConnectionMode, RpcClient, is_server_running};
pub use instance::{InstanceError, LaunchOutcome, RacePolicy, SingleInstanceCoordinator};
pub use module::{Arguments, Command, CommandError, Exposure, Module, ModuleBuilder, Signature};
pub use proxy::{LyricsProxy, PlaybackProxy, PlaylistProxy, SoftwareProxy};
pub use registry::{ModuleRegistry, ModuleSet, RegistryError};
pub use server::{RpcConfig, RpcError, RpcServer};
pub use session::{ConnectionSession, SessionState};
pub use types::*;
