mod player;
mod rpc;
mod settings;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use lark_core::logbuf::{BufferedLogger, LogBuffer};
use lark_core::rpc::{LaunchOutcome, Module, RpcConfig, RpcServer, SingleInstanceCoordinator};
use log::*;
use multi_log::MultiLogger;

use crate::player::{Player, PlayerCommand};
use crate::rpc::{PlayerHandle, PlayerMessage, build_modules, handle_message, process_requests};
use crate::settings::AppSettings;

/// How long an RPC handler waits for the main loop
const PLAYER_TIMEOUT: Duration = Duration::from_secs(2);
const TICK: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Lark media player",
    long_about = None)]
struct Args {
    /// Files or URIs to play. Handed to the running instance if there is one.
    files: Vec<String>,

    /// RPC port on 127.0.0.1
    #[arg(short, long, env = "LARK_RPC_PORT")]
    port: Option<u16>,

    /// Always start a new instance, even if one is running
    #[arg(long)]
    no_single_instance: bool,

    /// Exit after serving for this many seconds
    #[arg(long, value_name = "SECS")]
    serve_for: Option<u64>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool, capacity: usize) -> Result<LogBuffer> {
    let logs = LogBuffer::new(capacity);
    let console = env_logger::builder()
        .filter_level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .build();
    let filter = console.filter();
    let loggers: Vec<Box<dyn Log>> = vec![
        Box::new(console),
        Box::new(BufferedLogger::new(logs.clone(), filter)),
    ];
    MultiLogger::init(loggers, filter.to_level().unwrap_or(Level::Error))
        .context("Cannot install logger")?;
    Ok(logs)
}

fn start_standalone(config: RpcConfig, modules: Vec<Module>) -> Result<RpcServer> {
    let mut server = RpcServer::new(config);
    for module in modules {
        server.attach_module(module);
    }
    server.start().context("Cannot start RPC server")?;
    Ok(server)
}

fn run_player(
    player: &mut Player,
    rx: &Receiver<PlayerMessage>,
    serve_for: Option<Duration>,
) {
    let deadline = serve_for.map(|d| Instant::now() + d);

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Serve time elapsed, shutting down");
            break;
        }

        // Block for the first message, then drain whatever else is queued
        match rx.recv_timeout(TICK) {
            Ok(msg) => handle_message(player, msg),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if !process_requests(player, rx) {
            break;
        }

        player.tick();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = AppSettings::load();
    let logs = init_logging(args.verbose, settings.log_capacity)?;

    let mut config = settings.rpc.clone();
    if let Some(port) = args.port {
        config.port = port;
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = PlayerHandle::new(tx, PLAYER_TIMEOUT);
    let modules = build_modules(&handle, logs).context("Cannot build RPC modules")?;

    let mut server = if settings.single_instance && !args.no_single_instance {
        match SingleInstanceCoordinator::new(config).launch(&args.files, modules)? {
            LaunchOutcome::Primary(server) => server,
            LaunchOutcome::Forwarded { forwarded } => {
                info!("Lark is already running, handed over {} item(s)", forwarded);
                return Ok(());
            }
        }
    } else {
        start_standalone(config, modules)?
    };

    let mut player = Player::new(settings.volume);
    if !args.files.is_empty()
        && let Err(e) = player.apply(PlayerCommand::Play(args.files.clone()))
    {
        warn!("Cannot start playback: {}", e);
    }

    run_player(&mut player, &rx, args.serve_for.map(Duration::from_secs));

    server.stop();
    settings.volume = player.volume();
    settings.save();
    Ok(())
}
