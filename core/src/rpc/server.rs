//! RPC server implementation
//!
//! Listens on a loopback TCP port and runs one [`ConnectionSession`] per
//! accepted connection on a bounded worker pool.

use std::io::{self, BufReader};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::module::Module;
use super::registry::{ModuleRegistry, ModuleSet};
use super::session::ConnectionSession;
use super::types::DEFAULT_PORT;

/// RPC server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// TCP port on 127.0.0.1, 0 picks a free port
    pub port: u16,
    /// Maximum number of concurrently served connections
    pub max_workers: usize,
    /// Sleep between polls of the listener when no connection is pending
    pub poll_interval_ms: u64,
    /// Sessions idle for longer than this are dropped, `None` waits forever
    pub idle_timeout_secs: Option<u64>,
    /// Writes blocked for longer than this end the session, 0 disables it
    pub write_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_workers: 8,
            poll_interval_ms: 10,
            idle_timeout_secs: Some(300),
            write_timeout_secs: 30,
        }
    }
}

impl RpcConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_secs > 0).then(|| Duration::from_secs(self.write_timeout_secs))
    }
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("RPC server is already running")]
    AlreadyStarted,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RpcError {
    /// True if the port is held by another process
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, Self::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse)
    }
}

/// RPC server that listens for connections and dispatches requests
pub struct RpcServer {
    config: RpcConfig,
    registry: ModuleRegistry,
    modules: Option<Arc<ModuleSet>>,
    running: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
    accept_thread: Option<JoinHandle<()>>,
}

impl RpcServer {
    /// Creates a new RPC server with the given configuration
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config,
            registry: ModuleRegistry::new(),
            modules: None,
            running: Arc::new(AtomicBool::new(false)),
            local_addr: None,
            accept_thread: None,
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Attaches a module before the server starts. Re-attaching a name is a
    /// no-op; once started, the module set is frozen.
    pub fn attach_module(&mut self, module: Module) -> bool {
        if self.modules.is_some() {
            warn!(
                "Not attaching module {}: the module set is frozen once the server starts",
                module.name()
            );
            return false;
        }
        self.registry.attach(module)
    }

    /// Names of the attached modules, in attach order
    pub fn module_names(&self) -> Vec<String> {
        match &self.modules {
            Some(modules) => modules.names().to_vec(),
            None => self.registry.names(),
        }
    }

    /// Binds the listener and starts the accept thread
    pub fn start(&mut self) -> Result<(), RpcError> {
        if self.accept_thread.is_some() {
            return Err(RpcError::AlreadyStarted);
        }

        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(addr).map_err(|source| RpcError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let modules = match &self.modules {
            Some(modules) => modules.clone(),
            None => std::mem::take(&mut self.registry).finalize(),
        };
        self.modules = Some(modules.clone());

        info!(
            "RPC server listening on TCP: {} (modules: {})",
            local_addr,
            modules.names().join(", ")
        );

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("rpc-accept".to_string())
            .spawn(move || Self::accept_loop(listener, modules, running, config));
        match handle {
            Ok(handle) => self.accept_thread = Some(handle),
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        }
        self.local_addr = Some(local_addr);

        Ok(())
    }

    /// Stops accepting connections. Sessions already being served finish
    /// their current request and then close.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(thread) = self.accept_thread.take() {
            let _ = thread.join();
            info!("RPC server stopped");
        }
        self.local_addr = None;
    }

    pub fn is_running(&self) -> bool {
        self.accept_thread.is_some() && self.running.load(Ordering::SeqCst)
    }

    /// Address the listener is bound to, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn port(&self) -> Option<u16> {
        self.local_addr.map(|addr| addr.port())
    }

    #[allow(clippy::needless_pass_by_value)]
    fn accept_loop(
        listener: TcpListener,
        modules: Arc<ModuleSet>,
        running: Arc<AtomicBool>,
        config: RpcConfig,
    ) {
        let workers = config.max_workers.max(1);
        let pool = rusty_pool::ThreadPool::new(workers, workers, Duration::from_secs(60));

        while running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    debug!("TCP connection from {}", addr);
                    let modules = modules.clone();
                    let running = running.clone();
                    let config = config.clone();
                    pool.execute(move || {
                        if let Err(e) = Self::handle_connection(stream, modules, running, &config)
                        {
                            debug!("TCP connection {} ended: {}", addr, e);
                        }
                    });
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(config.poll_interval());
                }
                Err(e) => {
                    error!("TCP accept error: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }

        // Queued and running sessions are left to finish on their own
        pool.shutdown();
    }

    #[allow(clippy::needless_pass_by_value)]
    fn handle_connection(
        stream: TcpStream,
        modules: Arc<ModuleSet>,
        running: Arc<AtomicBool>,
        config: &RpcConfig,
    ) -> io::Result<()> {
        // Accepted sockets inherit non-blocking mode on some platforms
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(config.idle_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        let reader = BufReader::new(stream.try_clone()?);
        let mut session = ConnectionSession::new(reader, stream.try_clone()?, modules, running);
        let result = session.run();
        debug!("Session closed after {} response(s)", session.served());

        let _ = stream.shutdown(Shutdown::Both);
        result
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.stop();
    }
}
