//! TCP client for the RPC server
//!
//! A [`RpcClient`] either opens a fresh connection per call (one-shot) or
//! switches a single connection to keep-alive mode and reuses it until
//! [`RpcClient::disconnect`].

use std::io::{self, BufRead, BufReader, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use log::*;
use thiserror::Error;

use super::proxy::{LyricsProxy, PlaybackProxy, PlaylistProxy, SoftwareProxy};
use super::types::{ControlCommand, DEFAULT_PORT, RpcRequest, RpcResponse, RpcResult};

/// Errors that can occur when talking to the server
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no server listening on {0}")]
    NotRunning(SocketAddr),

    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot encode request: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("malformed response: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("server closed the connection without responding")]
    EmptyResponse,

    #[error("{module}.{command} failed: {message}")]
    CommandFailed {
        module: String,
        command: String,
        message: String,
    },

    #[error("{module}.{command} returned {result:?}, expected {expected}")]
    UnexpectedResult {
        module: String,
        command: String,
        expected: &'static str,
        result: RpcResult,
    },

    #[error("connection already closed")]
    Closed,
}

impl ClientError {
    /// True if nothing is listening on the port
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::NotRunning(_))
    }
}

impl RpcResponse {
    /// Turns a failure response into [`ClientError::CommandFailed`]
    pub fn into_result(self, request: &RpcRequest) -> Result<RpcResult, ClientError> {
        if self.succeeded {
            Ok(self.result)
        } else {
            Err(ClientError::CommandFailed {
                module: request.module.clone(),
                command: request.command.clone(),
                message: self.message,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub port: u16,
    /// Applies to connecting, reading and writing
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    OneShot,
    KeepAlive,
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn open(config: &ClientConfig) -> Result<Self, ClientError> {
        let addr = config.addr();
        let stream = TcpStream::connect_timeout(&addr, config.timeout).map_err(|source| {
            if source.kind() == io::ErrorKind::ConnectionRefused {
                ClientError::NotRunning(addr)
            } else {
                ClientError::Connect { addr, source }
            }
        })?;
        stream.set_read_timeout(Some(config.timeout))?;
        stream.set_write_timeout(Some(config.timeout))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
        })
    }

    fn round_trip(&mut self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        let line = request.to_line().map_err(ClientError::Serialize)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;

        let mut response = String::new();
        if self.reader.read_line(&mut response)? == 0 {
            return Err(ClientError::EmptyResponse);
        }
        RpcResponse::from_line(&response).map_err(ClientError::Parse)
    }
}

/// A client for the RPC server
pub struct RpcClient {
    config: ClientConfig,
    mode: ConnectionMode,
    connection: Option<Connection>,
}

impl RpcClient {
    /// Client that connects anew for every call
    pub fn one_shot(config: ClientConfig) -> Self {
        Self {
            config,
            mode: ConnectionMode::OneShot,
            connection: None,
        }
    }

    /// Connects and switches the connection to keep-alive mode
    pub fn keep_alive(config: ClientConfig) -> Result<Self, ClientError> {
        let mut connection = Connection::open(&config)?;
        let request = RpcRequest::control(ControlCommand::KeepAlive);
        connection.round_trip(&request)?.into_result(&request)?;

        Ok(Self {
            config,
            mode: ConnectionMode::KeepAlive,
            connection: Some(connection),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// False once a keep-alive client disconnected or lost its connection
    pub fn is_connected(&self) -> bool {
        match self.mode {
            ConnectionMode::OneShot => true,
            ConnectionMode::KeepAlive => self.connection.is_some(),
        }
    }

    /// Sends a request and returns the raw response, successful or not
    pub fn send(&mut self, request: &RpcRequest) -> Result<RpcResponse, ClientError> {
        match self.mode {
            ConnectionMode::OneShot => Connection::open(&self.config)?.round_trip(request),
            ConnectionMode::KeepAlive => {
                let connection = self.connection.as_mut().ok_or(ClientError::Closed)?;
                let result = connection.round_trip(request);
                if result.is_err() {
                    // The stream is in an unknown state
                    self.connection = None;
                }
                result
            }
        }
    }

    pub fn call(
        &mut self,
        module: &str,
        command: &str,
        arguments: Vec<String>,
    ) -> Result<RpcResponse, ClientError> {
        self.send(&RpcRequest::new(module, command, arguments))
    }

    /// Calls a command and fails unless the response succeeded
    pub fn invoke(
        &mut self,
        module: &str,
        command: &str,
        arguments: Vec<String>,
    ) -> Result<RpcResult, ClientError> {
        let request = RpcRequest::new(module, command, arguments);
        self.send(&request)?.into_result(&request)
    }

    /// Calls a command and decodes its result
    pub fn invoke_as<T>(
        &mut self,
        module: &str,
        command: &str,
        arguments: Vec<String>,
        expected: &'static str,
        decode: impl FnOnce(RpcResult) -> Option<T>,
    ) -> Result<T, ClientError> {
        let result = self.invoke(module, command, arguments)?;
        decode(result.clone()).ok_or_else(|| ClientError::UnexpectedResult {
            module: module.to_string(),
            command: command.to_string(),
            expected,
            result,
        })
    }

    /// Names of the modules attached to the server
    pub fn modules(&mut self) -> Result<Vec<String>, ClientError> {
        let request = RpcRequest::control(ControlCommand::GetModules);
        let result = self.send(&request)?.into_result(&request)?;
        result
            .clone()
            .into_list()
            .ok_or_else(|| ClientError::UnexpectedResult {
                module: request.module,
                command: request.command,
                expected: "string list",
                result,
            })
    }

    /// Ends a keep-alive session. No-op for one-shot clients.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        if let Some(mut connection) = self.connection.take() {
            let request = RpcRequest::control(ControlCommand::Disconnect);
            connection.round_trip(&request)?.into_result(&request)?;
        }
        Ok(())
    }

    pub fn software(&mut self) -> SoftwareProxy<'_> {
        SoftwareProxy::new(self)
    }

    pub fn playback(&mut self) -> PlaybackProxy<'_> {
        PlaybackProxy::new(self)
    }

    pub fn playlist(&mut self) -> PlaylistProxy<'_> {
        PlaylistProxy::new(self)
    }

    pub fn lyrics(&mut self) -> LyricsProxy<'_> {
        LyricsProxy::new(self)
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        if self.connection.is_some()
            && let Err(e) = self.disconnect()
        {
            debug!("Disconnect on drop failed: {}", e);
        }
    }
}

/// Probes for a server on `port`.
///
/// Returns `Ok(false)` when the connection is refused or the peer does not
/// answer `Software.IsRunning` truthily; other failures are returned as errors.
pub fn is_server_running(port: u16, timeout: Duration) -> Result<bool, ClientError> {
    let mut client = RpcClient::one_shot(ClientConfig { port, timeout });
    match client.software().is_running() {
        Ok(running) => Ok(running),
        Err(ClientError::NotRunning(addr)) => {
            debug!("No RPC server on {}", addr);
            Ok(false)
        }
        Err(e @ (ClientError::CommandFailed { .. } | ClientError::UnexpectedResult { .. })) => {
            warn!("Port {} answered the probe with: {}", port, e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
