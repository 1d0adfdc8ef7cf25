//! Single-instance coordination
//!
//! The first process to bind the well-known port becomes the primary instance
//! and serves RPC. Later launches find it with a one-shot `Software.IsRunning`
//! probe, forward their arguments to `Playback.Play` and exit.

use std::thread;
use std::time::Duration;

use log::*;
use thiserror::Error;

use super::client::{ClientConfig, ClientError, RpcClient, is_server_running};
use super::module::Module;
use super::server::{RpcConfig, RpcError, RpcServer};

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error(transparent)]
    Server(#[from] RpcError),

    #[error("cannot forward to the running instance: {0}")]
    Client(#[from] ClientError),
}

/// How hard a launch that lost the bind race looks for the winner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RacePolicy {
    pub retries: u32,
    /// Delay before the first re-probe, doubled after each attempt
    pub backoff: Duration,
}

impl Default for RacePolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Result of [`SingleInstanceCoordinator::launch`]
pub enum LaunchOutcome {
    /// This process owns the port; the server is running
    Primary(RpcServer),
    /// Another instance is running and received `forwarded` arguments
    Forwarded { forwarded: usize },
}

impl LaunchOutcome {
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary(_))
    }
}

pub struct SingleInstanceCoordinator {
    config: RpcConfig,
    probe_timeout: Duration,
    race: RacePolicy,
}

impl SingleInstanceCoordinator {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config,
            probe_timeout: Duration::from_secs(1),
            race: RacePolicy::default(),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_race_policy(mut self, race: RacePolicy) -> Self {
        self.race = race;
        self
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Becomes the primary instance serving `modules`, or hands `args` to the
    /// instance that already is.
    pub fn launch(
        &self,
        args: &[String],
        modules: Vec<Module>,
    ) -> Result<LaunchOutcome, InstanceError> {
        if self.probe() {
            let forwarded = self.forward(args)?;
            return Ok(LaunchOutcome::Forwarded { forwarded });
        }

        let mut server = RpcServer::new(self.config.clone());
        for module in modules {
            server.attach_module(module);
        }

        match server.start() {
            Ok(()) => {
                info!("Running as primary instance on port {}", self.config.port);
                Ok(LaunchOutcome::Primary(server))
            }
            Err(e) if e.is_addr_in_use() => {
                let forwarded = self.resolve_race(args, e)?;
                Ok(LaunchOutcome::Forwarded { forwarded })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sends `args` to the running instance as one `Playback.Play` call
    pub fn forward(&self, args: &[String]) -> Result<usize, ClientError> {
        if args.is_empty() {
            info!("Another instance is running, nothing to forward");
            return Ok(0);
        }

        let mut client = RpcClient::one_shot(self.client_config());
        client.playback().play(args)?;
        info!("Forwarded {} item(s) to the running instance", args.len());
        Ok(args.len())
    }

    /// The port was taken between the probe and the bind. Wait for the
    /// winner to answer, or give up with the original bind error.
    fn resolve_race(&self, args: &[String], bind_error: RpcError) -> Result<usize, InstanceError> {
        warn!("{}, looking for the instance that owns it", bind_error);

        let mut backoff = self.race.backoff;
        for attempt in 1..=self.race.retries {
            thread::sleep(backoff);
            backoff = backoff.saturating_mul(2);

            match is_server_running(self.config.port, self.probe_timeout) {
                Ok(true) => return Ok(self.forward(args)?),
                Ok(false) => debug!("Re-probe {}: no answer yet", attempt),
                Err(e) => debug!("Re-probe {} failed: {}", attempt, e),
            }
        }

        Err(bind_error.into())
    }

    /// True if a peer answered the probe. A port held by something that does
    /// not speak the protocol counts as no peer; the bind decides from there.
    fn probe(&self) -> bool {
        if self.config.port == 0 {
            return false;
        }
        match is_server_running(self.config.port, self.probe_timeout) {
            Ok(running) => running,
            Err(e) => {
                warn!("Probe of port {} failed: {}", self.config.port, e);
                false
            }
        }
    }

    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            port: self.config.port,
            ..Default::default()
        }
    }
}
