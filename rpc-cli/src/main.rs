//! Lark RPC Command Line Interface
//!
//! Controls a running Lark instance over its loopback RPC port.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lark_core::rpc::names::{lyrics, playback, playlist, software};
use lark_core::rpc::{
    ClientConfig, ControlCommand, DEFAULT_PORT, PlaybackState, RpcClient, RpcRequest,
    is_server_running,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "lark-rpc")]
#[command(about = "Lark RPC Command Line Interface", long_about = None)]
#[command(after_help = r#"EXAMPLES:
    lark-rpc status                          Show player status
    lark-rpc play a.flac b.flac              Replace the playlist and play
    lark-rpc add ~/Music/*.mp3               Append to the playlist
    lark-rpc volume 40                       Set volume to 40%
    lark-rpc log 20                          Last 20 log lines
    lark-rpc raw Playlist Count              Send any module command
"#)]
struct Cli {
    /// RPC port on 127.0.0.1
    #[arg(short, long, global = true, env = "LARK_RPC_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Connect/read timeout in seconds
    #[arg(short, long, global = true, default_value_t = 5)]
    timeout: u64,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether the player runs and what it is doing
    Status,

    /// List the modules the player exposes
    Modules,

    /// Start playback, replacing the playlist with FILES when given
    Play {
        files: Vec<String>,
    },

    /// Pause playback
    Pause,

    /// Resume paused playback
    Resume,

    /// Stop playback
    Stop,

    /// Skip to the next playlist item
    Next,

    /// Go back to the previous playlist item
    Previous,

    /// Get or set the volume
    Volume {
        /// New volume, 0-100
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: Option<u8>,
    },

    /// Number of playlist items
    Count,

    /// List playlist items
    Items,

    /// Empty the playlist
    Clear,

    /// Append FILES to the playlist
    Add {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Current lyrics line
    Lyrics,

    /// Recent player log lines
    Log {
        /// Number of lines, all buffered lines if omitted
        count: Option<usize>,
    },

    /// Send any module command
    Raw {
        module: String,
        command: String,
        arguments: Vec<String>,
    },
}

impl Commands {
    /// The wire request this subcommand sends, for `--json` output
    fn request(&self) -> Option<RpcRequest> {
        let (module, command, args) = match self {
            Self::Status => return None,
            Self::Modules => return Some(RpcRequest::control(ControlCommand::GetModules)),
            Self::Play { files } => (playback::MODULE, playback::PLAY, files.clone()),
            Self::Pause => (playback::MODULE, playback::PAUSE, vec![]),
            Self::Resume => (playback::MODULE, playback::RESUME, vec![]),
            Self::Stop => (playback::MODULE, playback::STOP, vec![]),
            Self::Next => (playback::MODULE, playback::NEXT, vec![]),
            Self::Previous => (playback::MODULE, playback::PREVIOUS, vec![]),
            Self::Volume { level: None } => (playback::MODULE, playback::GET_VOLUME, vec![]),
            Self::Volume { level: Some(l) } => {
                (playback::MODULE, playback::SET_VOLUME, vec![l.to_string()])
            }
            Self::Count => (playlist::MODULE, playlist::COUNT, vec![]),
            Self::Items => (playlist::MODULE, playlist::ITEMS, vec![]),
            Self::Clear => (playlist::MODULE, playlist::CLEAR, vec![]),
            Self::Add { files } => (playlist::MODULE, playlist::ADD, files.clone()),
            Self::Lyrics => (lyrics::MODULE, lyrics::GET_CURRENT_LINE, vec![]),
            Self::Log { count } => (
                software::MODULE,
                software::GET_LOG,
                count.iter().map(ToString::to_string).collect(),
            ),
            Self::Raw {
                module,
                command,
                arguments,
            } => {
                return Some(RpcRequest::new(
                    module.as_str(),
                    command.as_str(),
                    arguments.clone(),
                ));
            }
        };
        Some(RpcRequest::new(module, command, args))
    }
}

#[derive(Serialize)]
struct StatusReport {
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<String>,
}

fn status(config: ClientConfig) -> Result<StatusReport> {
    if !is_server_running(config.port, config.timeout)? {
        return Ok(StatusReport {
            running: false,
            version: None,
            state: None,
            volume: None,
            current: None,
        });
    }

    let mut client = RpcClient::keep_alive(config)?;
    let report = StatusReport {
        running: true,
        version: Some(client.software().version()?),
        state: Some(client.playback().state()?.to_string()),
        volume: Some(client.playback().volume()?),
        current: client.playlist().current()?,
    };
    client.disconnect()?;
    Ok(report)
}

fn print_status(report: &StatusReport) {
    if !report.running {
        println!("Lark is not running");
        return;
    }
    println!(
        "Lark {} is running",
        report.version.as_deref().unwrap_or("(unknown version)")
    );
    if let Some(state) = &report.state {
        println!("State: {}", state);
    }
    if let Some(volume) = report.volume {
        println!("Volume: {}%", volume);
    }
    match &report.current {
        Some(current) => println!("Current: {}", current),
        None => println!("Current: (nothing)"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig {
        port: cli.port,
        timeout: Duration::from_secs(cli.timeout.max(1)),
    };

    let mut client = RpcClient::one_shot(config);

    match cli.command {
        Commands::Status => {
            let report = status(config)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&report);
            }
        }

        command @ Commands::Raw { .. } => print_response(&mut client, &command)?,

        command if cli.json => print_response(&mut client, &command)?,

        Commands::Modules => {
            for module in client.modules()? {
                println!("{}", module);
            }
        }

        Commands::Play { files } => {
            client.playback().play(&files)?;
            if files.is_empty() {
                println!("Playing");
            } else {
                println!("Playing {} file(s)", files.len());
            }
        }

        Commands::Pause => {
            client.playback().pause()?;
            println!("Paused");
        }

        Commands::Resume => {
            client.playback().resume()?;
            println!("Resumed");
        }

        Commands::Stop => {
            client.playback().stop()?;
            println!("Stopped");
        }

        Commands::Next => {
            client.playback().next()?;
            print_current(&mut client)?;
        }

        Commands::Previous => {
            client.playback().previous()?;
            print_current(&mut client)?;
        }

        Commands::Volume { level: None } => {
            println!("Volume: {}%", client.playback().volume()?);
        }

        Commands::Volume { level: Some(level) } => {
            client.playback().set_volume(level)?;
            println!("Volume set to {}%", level);
        }

        Commands::Count => {
            println!("{}", client.playlist().count()?);
        }

        Commands::Items => {
            let current = client.playlist().current()?;
            for (i, item) in client.playlist().items()?.iter().enumerate() {
                let marker = if current.as_ref() == Some(item) { '>' } else { ' ' };
                println!("{} {:>3}. {}", marker, i + 1, item);
            }
        }

        Commands::Clear => {
            client.playlist().clear()?;
            println!("Playlist cleared");
        }

        Commands::Add { files } => {
            let count = client.playlist().add(&files)?;
            println!("Playlist now has {} item(s)", count);
        }

        Commands::Lyrics => match client.lyrics().current_line()? {
            Some(line) => println!("{}", line),
            None => println!("(no lyrics)"),
        },

        Commands::Log { count } => {
            for line in client.software().log(count)? {
                println!("{}", line);
            }
        }
    }

    Ok(())
}

/// Sends the subcommand's request as is and prints the raw response
fn print_response(client: &mut RpcClient, command: &Commands) -> Result<()> {
    let request = command
        .request()
        .context("Command does not map to a single request")?;
    let response = client
        .send(&request)
        .with_context(|| format!("Failed to call {}.{}", request.module, request.command))?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.succeeded {
        bail!("{}", response.message);
    }
    Ok(())
}

fn print_current(client: &mut RpcClient) -> Result<()> {
    let state = client.playback().state()?;
    match client.playlist().current()? {
        Some(current) if state != PlaybackState::Stopped => println!("{}: {}", state, current),
        Some(current) => println!("Selected: {}", current),
        None => println!("Playlist is empty"),
    }
    Ok(())
}
