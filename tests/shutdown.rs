//! Server shutdown: `stop` waits for every task and nothing fires afterwards.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::time::Duration;

use common::{next_conn, spawn_server, test_config, Client, Event, Recorder};
use seeker::{ConnectionState, Server};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_closes_every_connection() {
    let (recorder, mut conns) = Recorder::new();
    let running = spawn_server(test_config(), recorder.clone()).await;

    let mut clients = Vec::new();
    let mut live = Vec::new();
    for i in 0..5 {
        let mut client = Client::connect(running.addr).await;
        live.push(next_conn(&mut conns).await);
        let line = format!("client {i}");
        client.send_line(&line).await;
        assert_eq!(client.recv_line().await, Some(format!("{line}\n")));
        clients.push(client);
    }

    running.server.stop().await;

    assert!(running.server.is_shutdown());
    assert_eq!(recorder.closes(), 5);
    for conn in &live {
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(recorder.closes_for(conn.id()), 1);
    }
    assert!(running.task.await.unwrap().is_ok());

    let metrics = running.server.metrics().snapshot();
    assert_eq!(metrics.connections_total, 5);
    assert_eq!(metrics.connections_active, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_callbacks_after_stop() {
    let (recorder, mut conns) = Recorder::new();
    let running = spawn_server(test_config(), recorder.clone()).await;

    let mut client = Client::connect(running.addr).await;
    let _conn = next_conn(&mut conns).await;

    running.server.stop().await;
    let settled = recorder.events();

    // whatever the client does now, the server must stay silent
    let _ = tokio::io::AsyncWriteExt::write_all(&mut client.writer, b"late\n").await;
    assert_eq!(client.recv_line().await, None);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(recorder.events(), settled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_waits_for_running_callback() {
    let (recorder, mut conns) = Recorder::with_slow(Duration::from_millis(300));
    let running = spawn_server(test_config(), recorder.clone()).await;

    let mut client = Client::connect(running.addr).await;
    let conn = next_conn(&mut conns).await;
    client.send_line("slow").await;

    // let the dispatcher enter the callback
    tokio::time::sleep(Duration::from_millis(50)).await;
    running.server.stop().await;

    // the reader may win the close while the callback is still sleeping;
    // either way the callback has finished by the time stop returns
    let events = recorder.events();
    assert!(
        events.contains(&Event::Message(conn.id(), "slow-done".into())),
        "stop returned before the callback finished"
    );
    assert!(events.contains(&Event::Close(conn.id())));
}

#[tokio::test]
async fn test_stop_rejects_new_clients() {
    let (recorder, _conns) = Recorder::new();
    let running = spawn_server(test_config(), recorder.clone()).await;

    running.server.stop().await;
    assert!(running.task.await.unwrap().is_ok());

    // the listener is gone with the accept loop
    assert!(tokio::net::TcpStream::connect(running.addr).await.is_err());
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn test_stop_without_start_and_twice() {
    let (recorder, _conns) = Recorder::new();
    let server = Server::new(test_config(), recorder, common::LineProtocol);

    tokio::time::timeout(Duration::from_secs(1), server.stop())
        .await
        .expect("stop before start must not block");
    tokio::time::timeout(Duration::from_secs(1), server.stop())
        .await
        .expect("second stop must not block");

    // a server that was already stopped exits its accept loop at once
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    assert!(server.serve(listener).await.is_ok());
}
