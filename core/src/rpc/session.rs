//! Per-connection request loop

use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::*;

use super::registry::ModuleSet;
use super::types::{ControlCommand, RpcRequest, RpcResponse, RpcResult};

/// Longest request line accepted, excluding the newline
pub const MAX_LINE_LEN: usize = 1 << 20;

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// Outcome of reading a single line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// A request line was consumed (answered or discarded)
    Handled,
    /// Blank line
    Skipped,
    /// Peer hung up or asked to disconnect
    Closed,
}

/// State of one accepted connection.
///
/// Without `KeepAlive` the session serves exactly one request line and then
/// closes; after `KeepAlive` it keeps serving until the peer disconnects,
/// sends `Disconnect` or the server stops.
pub struct ConnectionSession<R, W> {
    reader: R,
    writer: W,
    modules: Arc<ModuleSet>,
    running: Arc<AtomicBool>,
    keep_alive: bool,
    state: SessionState,
    served: usize,
}

impl<R: BufRead, W: Write> ConnectionSession<R, W> {
    pub fn new(reader: R, writer: W, modules: Arc<ModuleSet>, running: Arc<AtomicBool>) -> Self {
        Self {
            reader,
            writer,
            modules,
            running,
            keep_alive: false,
            state: SessionState::Open,
            served: 0,
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of responses written so far
    pub fn served(&self) -> usize {
        self.served
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Serves requests until the session ends. Transport errors end the
    /// session and are returned to the caller.
    pub fn run(&mut self) -> io::Result<()> {
        let result = self.serve();
        self.state = SessionState::Closed;
        result
    }

    fn serve(&mut self) -> io::Result<()> {
        while self.running.load(Ordering::SeqCst) {
            match self.step()? {
                Step::Closed => break,
                Step::Skipped => continue,
                Step::Handled if !self.keep_alive => break,
                Step::Handled => {}
            }
        }
        Ok(())
    }

    fn step(&mut self) -> io::Result<Step> {
        let mut buf = Vec::new();
        let read = self
            .reader
            .by_ref()
            .take(MAX_LINE_LEN as u64 + 1)
            .read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Ok(Step::Closed);
        }
        if buf.len() > MAX_LINE_LEN && buf.last() != Some(&b'\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("request line longer than {} bytes", MAX_LINE_LEN),
            ));
        }

        let line = match String::from_utf8(buf) {
            Ok(line) => line,
            Err(e) => {
                warn!("Discarding RPC request that is not UTF-8: {}", e);
                return Ok(Step::Handled);
            }
        };
        let line = line.trim();
        if line.is_empty() {
            return Ok(Step::Skipped);
        }

        let request = match RpcRequest::from_line(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Discarding malformed RPC request: {}", e);
                return Ok(Step::Handled);
            }
        };

        let (response, step) = self.route(&request);
        self.write_response(&response)?;
        Ok(step)
    }

    fn route(&mut self, request: &RpcRequest) -> (RpcResponse, Step) {
        if !request.is_control() {
            return (self.modules.dispatch(request), Step::Handled);
        }

        match request.command.parse::<ControlCommand>() {
            Ok(ControlCommand::KeepAlive) => {
                self.keep_alive = true;
                (RpcResponse::success(()), Step::Handled)
            }
            Ok(ControlCommand::Disconnect) => (RpcResponse::success(()), Step::Closed),
            Ok(ControlCommand::GetModules) => (
                RpcResponse::success(RpcResult::List(self.modules.names().to_vec())),
                Step::Handled,
            ),
            Err(_) => (
                RpcResponse::unknown_command(&request.module, &request.command),
                Step::Handled,
            ),
        }
    }

    fn write_response(&mut self, response: &RpcResponse) -> io::Result<()> {
        let line = response.to_line().map_err(io::Error::other)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        self.served += 1;
        Ok(())
    }
}
