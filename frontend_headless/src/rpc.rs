//! RPC integration for the Lark player
//!
//! Module handlers run on the server's worker threads. Anything touching the
//! player is sent to the main loop over a channel and answered there.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use lark_core::logbuf::LogBuffer;
use lark_core::rpc::names::{lyrics, playback, playlist, software};
use lark_core::rpc::{Arguments, CommandError, Module, RegistryError, RpcResult};
use log::*;

use crate::player::{Player, PlayerCommand};

pub type PlayerReply = Result<RpcResult, CommandError>;

/// Message sent from the RPC handlers to the main loop
pub enum PlayerMessage {
    /// A command that needs to be applied to the player
    Request {
        command: PlayerCommand,
        response_tx: Sender<PlayerReply>,
    },
}

/// Sending side of the player channel, shared by all handlers
#[derive(Clone)]
pub struct PlayerHandle {
    tx: Sender<PlayerMessage>,
    timeout: Duration,
}

impl PlayerHandle {
    pub fn new(tx: Sender<PlayerMessage>, timeout: Duration) -> Self {
        Self { tx, timeout }
    }

    /// Sends `command` to the main loop and waits for its reply
    pub fn query(&self, command: PlayerCommand) -> PlayerReply {
        let (response_tx, response_rx) = crossbeam_channel::bounded(1);
        self.tx
            .send(PlayerMessage::Request {
                command,
                response_tx,
            })
            .map_err(|_| CommandError::failed("player is shutting down"))?;
        response_rx
            .recv_timeout(self.timeout)
            .map_err(|_| CommandError::failed("player did not respond"))?
    }
}

/// Applies a single request
pub fn handle_message(player: &mut Player, msg: PlayerMessage) {
    match msg {
        PlayerMessage::Request {
            command,
            response_tx,
        } => {
            debug!("Player command: {:?}", command);
            let _ = response_tx.send(player.apply(command));
        }
    }
}

/// Applies all pending requests. Returns false once every handle is gone.
pub fn process_requests(player: &mut Player, rx: &Receiver<PlayerMessage>) -> bool {
    loop {
        match rx.try_recv() {
            Ok(msg) => handle_message(player, msg),
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Disconnected) => return false,
        }
    }
}

/// Handler that sends a fixed command to the player
fn forward(
    player: &PlayerHandle,
    command: PlayerCommand,
) -> impl Fn(&Arguments) -> PlayerReply + Send + Sync + 'static {
    let player = player.clone();
    move |_| player.query(command.clone())
}

fn software_module(logs: LogBuffer) -> Result<Module, RegistryError> {
    let clear = logs.clone();
    Module::builder(software::MODULE)
        .command(software::IS_RUNNING, &[], |_| Ok(true))
        .command(software::GET_VERSION, &[], |_| {
            Ok(env!("CARGO_PKG_VERSION"))
        })
        .variadic(software::GET_LOG, &[], "count", move |args| {
            match args.rest() {
                [] => Ok(logs.lines()),
                [count] => {
                    let count = count.trim().parse::<usize>().map_err(|e| {
                        CommandError::InvalidArgument {
                            index: 0,
                            value: count.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    Ok(logs.tail(count))
                }
                more => Err(CommandError::Arity {
                    expected: 1,
                    got: more.len(),
                }),
            }
        })
        .internal("ClearLog", &[], move |_| {
            clear.clear();
            Ok(())
        })
        .build()
}

fn playback_module(player: &PlayerHandle) -> Result<Module, RegistryError> {
    let play = player.clone();
    let set_volume = player.clone();
    Module::builder(playback::MODULE)
        .variadic(playback::PLAY, &[], "uris", move |args| {
            play.query(PlayerCommand::Play(args.rest().to_vec()))
        })
        .command(playback::PAUSE, &[], forward(player, PlayerCommand::Pause))
        .command(playback::RESUME, &[], forward(player, PlayerCommand::Resume))
        .command(playback::STOP, &[], forward(player, PlayerCommand::Stop))
        .command(playback::NEXT, &[], forward(player, PlayerCommand::Next))
        .command(playback::PREVIOUS, &[], forward(player, PlayerCommand::Previous))
        .command(playback::GET_STATE, &[], forward(player, PlayerCommand::GetState))
        .command(playback::GET_VOLUME, &[], forward(player, PlayerCommand::GetVolume))
        .command(playback::SET_VOLUME, &["volume"], move |args| {
            set_volume.query(PlayerCommand::SetVolume(args.get(0)?))
        })
        .command(playback::GET_PEAKS, &[], forward(player, PlayerCommand::GetPeaks))
        .build()
}

fn playlist_module(player: &PlayerHandle) -> Result<Module, RegistryError> {
    let add = player.clone();
    Module::builder(playlist::MODULE)
        .command(playlist::COUNT, &[], forward(player, PlayerCommand::Count))
        .variadic(playlist::ADD, &[], "uris", move |args| {
            add.query(PlayerCommand::Add(args.rest().to_vec()))
        })
        .command(playlist::CLEAR, &[], forward(player, PlayerCommand::Clear))
        .command(playlist::ITEMS, &[], forward(player, PlayerCommand::Items))
        .command(playlist::GET_CURRENT, &[], forward(player, PlayerCommand::GetCurrent))
        .build()
}

fn lyrics_module(player: &PlayerHandle) -> Result<Module, RegistryError> {
    let current = player.clone();
    let set = player.clone();
    Module::builder(lyrics::MODULE)
        .command(lyrics::GET_CURRENT_LINE, &[], move |_| {
            current.query(PlayerCommand::GetLyricsLine)
        })
        .command(lyrics::SET_LINE, &["text"], move |args| {
            set.query(PlayerCommand::SetLyricsLine(args.str(0)?.to_string()))
        })
        .build()
}

/// All modules the player exposes
pub fn build_modules(player: &PlayerHandle, logs: LogBuffer) -> Result<Vec<Module>, RegistryError> {
    Ok(vec![
        software_module(logs)?,
        playback_module(player)?,
        playlist_module(player)?,
        lyrics_module(player)?,
    ])
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};

    use lark_core::rpc::{ModuleRegistry, ModuleSet, RpcRequest, RpcResponse};

    use super::*;

    struct Harness {
        modules: Arc<ModuleSet>,
        handle: PlayerHandle,
        logs: LogBuffer,
        main_loop: JoinHandle<Player>,
    }

    impl Harness {
        fn new() -> Self {
            let (tx, rx) = crossbeam_channel::unbounded();
            let handle = PlayerHandle::new(tx, Duration::from_secs(5));
            let logs = LogBuffer::new(16);

            let mut registry = ModuleRegistry::new();
            for module in build_modules(&handle, logs.clone()).unwrap() {
                assert!(registry.attach(module));
            }

            let main_loop = thread::spawn(move || {
                let mut player = Player::new(70);
                while process_requests(&mut player, &rx) {
                    thread::sleep(Duration::from_millis(1));
                }
                player
            });

            Self {
                modules: registry.finalize(),
                handle,
                logs,
                main_loop,
            }
        }

        fn call(&self, module: &str, command: &str, args: &[&str]) -> RpcResponse {
            self.modules.dispatch(&RpcRequest::new(
                module,
                command,
                args.iter().map(|s| s.to_string()).collect(),
            ))
        }

        /// Drops every sender so the main loop ends
        fn finish(self) -> Player {
            let Self {
                modules,
                handle,
                main_loop,
                ..
            } = self;
            drop(modules);
            drop(handle);
            main_loop.join().unwrap()
        }
    }

    #[test]
    fn test_module_names() {
        let harness = Harness::new();
        assert_eq!(
            harness.modules.names(),
            ["Software", "Playback", "Playlist", "Lyrics"]
        );
        harness.finish();
    }

    #[test]
    fn test_empty_playlist_count() {
        let harness = Harness::new();
        let response = harness.call("Playlist", "Count", &[]);
        assert_eq!(
            response.to_line().unwrap(),
            "{\"succeeded\":true,\"message\":\"\",\"result\":\"0\"}\n"
        );
        harness.finish();
    }

    #[test]
    fn test_play_and_query() {
        let harness = Harness::new();
        assert!(harness.call("Playback", "Play", &["a.mp3", "b.mp3"]).succeeded);
        assert_eq!(
            harness.call("Playback", "GetState", &[]).result,
            RpcResult::Text("Playing".into())
        );
        assert_eq!(
            harness.call("Playlist", "GetCurrent", &[]).result,
            RpcResult::Text("a.mp3".into())
        );
        assert_eq!(
            harness.call("Playlist", "Add", &["c.mp3"]).result,
            RpcResult::Number(3.0)
        );
        assert!(harness.call("Playback", "Next", &[]).succeeded);

        let player = harness.finish();
        assert_eq!(player.current(), Some("b.mp3"));
        assert_eq!(player.playlist().len(), 3);
    }

    #[test]
    fn test_volume_validation() {
        let harness = Harness::new();
        let response = harness.call("Playback", "SetVolume", &["loud"]);
        assert!(!response.succeeded);
        assert!(response.message.starts_with("Playback.SetVolume: argument 0"));

        let response = harness.call("Playback", "SetVolume", &["120"]);
        assert!(!response.succeeded);
        assert!(response.message.contains("out of range"));

        assert!(harness.call("Playback", "SetVolume", &["30"]).succeeded);
        assert_eq!(
            harness.call("Playback", "GetVolume", &[]).result,
            RpcResult::Number(30.0)
        );
        harness.finish();
    }

    #[test]
    fn test_lyrics() {
        let harness = Harness::new();
        assert!(harness.call("Lyrics", "GetCurrentLine", &[]).result.is_none());
        assert!(harness.call("Lyrics", "SetLine", &["hello"]).succeeded);
        assert_eq!(
            harness.call("Lyrics", "GetCurrentLine", &[]).result,
            RpcResult::Text("hello".into())
        );
        assert!(!harness.call("Lyrics", "SetLine", &[]).succeeded);
        harness.finish();
    }

    #[test]
    fn test_get_log() {
        let harness = Harness::new();
        for i in 0..5 {
            harness.logs.push(format!("line {i}"));
        }
        assert_eq!(
            harness.call("Software", "GetLog", &[]).result,
            RpcResult::List((0..5).map(|i| format!("line {i}")).collect())
        );
        assert_eq!(
            harness.call("Software", "GetLog", &["2"]).result,
            RpcResult::List(vec!["line 3".into(), "line 4".into()])
        );
        assert!(!harness.call("Software", "GetLog", &["1", "2"]).succeeded);
        assert!(!harness.call("Software", "GetLog", &["many"]).succeeded);

        // Clearing is only possible from inside the process
        assert!(!harness.call("Software", "ClearLog", &[]).succeeded);
        let software = harness.modules.get("Software").unwrap();
        software.invoke_local("ClearLog", &[]).unwrap();
        assert!(harness.logs.is_empty());
        harness.finish();
    }

    #[test]
    fn test_is_running_without_main_loop() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = PlayerHandle::new(tx, Duration::from_millis(50));
        let modules = build_modules(&handle, LogBuffer::new(4)).unwrap();
        let software = &modules[0];

        // Answered on the worker thread
        assert_eq!(
            software.invoke_local("IsRunning", &[]),
            Ok(RpcResult::Boolean(true))
        );

        // Player commands time out when nobody serves the channel
        let err = modules[2].invoke_local("Count", &[]).unwrap_err();
        assert_eq!(err, CommandError::failed("player did not respond"));
        drop(rx);
    }
}
