//! Tests against a real server on a loopback port

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::*;

type Shared = Arc<Mutex<Vec<String>>>;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn software() -> Module {
    Module::builder("Software")
        .command("IsRunning", &[], |_| Ok(true))
        .command("GetVersion", &[], |_| Ok("1.2.0"))
        .build()
        .unwrap()
}

fn playlist(items: Shared) -> Module {
    let count = items.clone();
    let add = items.clone();
    Module::builder("Playlist")
        .command("Count", &[], move |_| Ok(count.lock().unwrap().len()))
        .variadic("Add", &[], "uris", move |args| {
            let mut items = add.lock().unwrap();
            items.extend_from_slice(args.rest());
            Ok(items.len())
        })
        .command("Items", &[], move |_| Ok(items.lock().unwrap().clone()))
        .build()
        .unwrap()
}

fn playback(played: Shared) -> Module {
    Module::builder("Playback")
        .variadic("Play", &[], "uris", move |args| {
            played.lock().unwrap().extend_from_slice(args.rest());
            Ok(())
        })
        .command("SetVolume", &["volume"], |args| {
            let volume: u8 = args.get(0)?;
            if volume > 100 {
                return Err(CommandError::failed("volume out of range"));
            }
            Ok(())
        })
        .build()
        .unwrap()
}

fn start_server() -> (RpcServer, Shared) {
    let items = Shared::default();
    let mut server = RpcServer::new(RpcConfig::with_port(0));
    server.attach_module(software());
    server.attach_module(playlist(items.clone()));
    server.start().unwrap();
    (server, items)
}

fn client_config(server: &RpcServer) -> ClientConfig {
    ClientConfig {
        port: server.port().unwrap(),
        timeout: Duration::from_secs(5),
    }
}

#[test]
fn test_is_running_wire_format() {
    let (server, _) = start_server();
    let stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    writer
        .write_all(b"{\"module\":\"Software\",\"command\":\"IsRunning\",\"arguments\":null}\n")
        .unwrap();

    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "{\"succeeded\":true,\"message\":\"\",\"result\":\"true\"}\n");

    // One-shot: the server closes after the first response
    line.clear();
    assert_eq!(reader.read_line(&mut line).unwrap(), 0);
}

#[test]
fn test_empty_playlist_count() {
    let (server, _) = start_server();
    let mut client = RpcClient::one_shot(client_config(&server));
    let response = client.call("Playlist", "Count", vec![]).unwrap();
    assert!(response.succeeded);
    assert_eq!(response.result, RpcResult::Text("0".into()));
    assert_eq!(client.playlist().count().unwrap(), 0);
}

#[test]
fn test_keep_alive_session() {
    let (server, items) = start_server();
    let mut client = RpcClient::keep_alive(client_config(&server)).unwrap();
    assert_eq!(client.mode(), ConnectionMode::KeepAlive);

    let uris = vec!["a.mp3".to_string(), "b.mp3".to_string(), "c.mp3".to_string()];
    assert_eq!(client.playlist().add(&uris).unwrap(), 3);
    assert_eq!(client.playlist().count().unwrap(), 3);
    assert_eq!(client.playlist().items().unwrap(), uris);
    assert_eq!(client.software().version().unwrap(), "1.2.0");
    assert_eq!(client.modules().unwrap(), vec!["Software", "Playlist"]);

    client.disconnect().unwrap();
    assert!(!client.is_connected());
    assert!(matches!(
        client.playlist().count(),
        Err(ClientError::Closed)
    ));
    assert_eq!(items.lock().unwrap().len(), 3);
}

#[test]
fn test_failures_keep_session_open() {
    let (server, _) = start_server();
    let mut client = RpcClient::keep_alive(client_config(&server)).unwrap();

    let response = client.call("Video", "Play", vec![]).unwrap();
    assert!(!response.succeeded);
    assert_eq!(response.message, "Unknown module: Video");

    let err = client.invoke("Playlist", "Count", vec!["x".into()]).unwrap_err();
    assert!(matches!(err, ClientError::CommandFailed { .. }));

    assert!(client.software().is_running().unwrap());
}

#[test]
fn test_handler_error_message() {
    let mut server = RpcServer::new(RpcConfig::with_port(0));
    server.attach_module(playback(Shared::default()));
    server.start().unwrap();

    let mut client = RpcClient::one_shot(client_config(&server));
    let err = client.playback().set_volume(150).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Playback.SetVolume failed: Playback.SetVolume: volume out of range"
    );
    client.playback().set_volume(50).unwrap();
}

#[test]
fn test_is_server_running() {
    let (mut server, _) = start_server();
    let port = server.port().unwrap();
    assert!(is_server_running(port, Duration::from_secs(5)).unwrap());

    server.stop();
    assert!(!server.is_running());
    assert!(!is_server_running(port, Duration::from_secs(5)).unwrap());
}

#[test]
fn test_attach_after_start_rejected() {
    let (mut server, _) = start_server();
    assert!(!server.attach_module(playback(Shared::default())));

    let mut client = RpcClient::one_shot(client_config(&server));
    assert_eq!(client.modules().unwrap(), vec!["Software", "Playlist"]);
}

#[test]
fn test_start_twice() {
    let (mut server, _) = start_server();
    assert!(matches!(server.start(), Err(RpcError::AlreadyStarted)));
}

#[test]
fn test_concurrent_sessions() {
    let (server, _) = start_server();
    let config = client_config(&server);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let mut client = RpcClient::keep_alive(config).unwrap();
                let uri = format!("track{i}.mp3");
                for _ in 0..5 {
                    client.playlist().add(std::slice::from_ref(&uri)).unwrap();
                }
                client.disconnect().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut client = RpcClient::one_shot(config);
    assert_eq!(client.playlist().count().unwrap(), 20);
}

#[test]
fn test_stop_ends_keep_alive_session() {
    let (mut server, _) = start_server();
    let mut client = RpcClient::keep_alive(client_config(&server)).unwrap();
    assert_eq!(client.playlist().count().unwrap(), 0);

    server.stop();

    // The request already being waited for may still be served
    let _ = client.playlist().count();
    assert!(client.playlist().count().is_err());
}

#[test]
fn test_primary_then_forwarding() {
    let port = free_port();
    let played = Shared::default();

    let primary = SingleInstanceCoordinator::new(RpcConfig::with_port(port))
        .launch(&[], vec![software(), playback(played.clone())])
        .unwrap();
    assert!(primary.is_primary());

    let files = vec!["one.flac".to_string(), "two.flac".to_string()];
    let secondary = SingleInstanceCoordinator::new(RpcConfig::with_port(port))
        .launch(&files, vec![software()])
        .unwrap();
    assert!(matches!(secondary, LaunchOutcome::Forwarded { forwarded: 2 }));
    assert_eq!(*played.lock().unwrap(), files);

    let empty = SingleInstanceCoordinator::new(RpcConfig::with_port(port))
        .launch(&[], vec![])
        .unwrap();
    assert!(matches!(empty, LaunchOutcome::Forwarded { forwarded: 0 }));
    assert_eq!(played.lock().unwrap().len(), 2);

    drop(primary);
}

#[test]
fn test_port_held_by_foreign_listener() {
    // Accepts connections into its backlog but never answers
    let squatter = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = squatter.local_addr().unwrap().port();

    let coordinator = SingleInstanceCoordinator::new(RpcConfig::with_port(port))
        .with_probe_timeout(Duration::from_millis(100))
        .with_race_policy(RacePolicy {
            retries: 2,
            backoff: Duration::from_millis(10),
        });

    match coordinator.launch(&["a.mp3".to_string()], vec![software()]) {
        Err(InstanceError::Server(e)) => assert!(e.is_addr_in_use()),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("launch succeeded on a taken port"),
    }
}

#[test]
fn test_idle_session_is_dropped() {
    let mut server = RpcServer::new(RpcConfig {
        idle_timeout_secs: Some(1),
        ..RpcConfig::with_port(0)
    });
    server.attach_module(software());
    server.start().unwrap();

    let stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    writer
        .write_all(b"{\"module\":\"Rpc\",\"command\":\"KeepAlive\",\"arguments\":null}\n")
        .unwrap();
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert!(line.starts_with("{\"succeeded\":true"));

    let idle = Instant::now();
    line.clear();
    match reader.read_line(&mut line) {
        Ok(read) => assert_eq!(read, 0),
        Err(e) => assert_ne!(e.kind(), std::io::ErrorKind::WouldBlock),
    }
    let elapsed = idle.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "closed after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5));
}

#[test]
fn test_race_loser_forwards_to_winner() {
    // Holds the port through the first probe and the bind
    let squatter = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = squatter.local_addr().unwrap().port();
    let played = Shared::default();

    let winner = {
        let played = played.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(600));
            drop(squatter);
            let mut server = RpcServer::new(RpcConfig::with_port(port));
            server.attach_module(software());
            server.attach_module(playback(played));
            server.start().unwrap();
            server
        })
    };

    let coordinator = SingleInstanceCoordinator::new(RpcConfig::with_port(port))
        .with_probe_timeout(Duration::from_millis(200))
        .with_race_policy(RacePolicy {
            retries: 8,
            backoff: Duration::from_millis(100),
        });
    let outcome = coordinator
        .launch(&["x.mp3".to_string()], vec![software()])
        .unwrap();
    let server = winner.join().unwrap();

    assert!(matches!(outcome, LaunchOutcome::Forwarded { forwarded: 1 }));
    assert_eq!(*played.lock().unwrap(), vec!["x.mp3".to_string()]);
    drop(server);
}
