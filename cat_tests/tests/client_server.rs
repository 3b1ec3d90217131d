//! Full socket-based integration tests for client ↔ server communication.

use std::time::Duration;

use cat_client::{client::rejected_status, demo, PadClient};
use cat_shared::{
    gp::{Cuboid, Gp, Label},
    math::Vec3,
    net::{read_reply, CommandConn},
    scene::{Scene, SceneHandle},
    wire::{Command, Header, Opcode, Status},
};
use cat_tests::{init_tracing, spawn_server, test_config};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{tcp::OwnedReadHalf, TcpStream};

/// Full session: BEGIN, ADD, CLOSE, then ADD on the closed handle, then EXIT.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_session_roundtrip() -> anyhow::Result<()> {
    init_tracing();
    let (cfg, server) = spawn_server(test_config(), |s| s.clients_served() >= 1).await?;

    let mut client = PadClient::connect(&cfg).await?;
    let scene = demo::demo_scene();
    let handle = client.begin(&scene).await?;
    assert_ne!(handle.get(), 0);

    let count = client
        .add(handle, &Gp::Label(demo::status_label(scene.len() + 1)))
        .await?;
    assert_eq!(count, scene.len() + 1);

    assert_eq!(client.close(handle).await?, scene.len() + 1);
    assert!(client.open_scenes().is_empty());

    let err = client
        .add(handle, &Gp::Box(Cuboid::new(Vec3::ZERO, Vec3::ONE)))
        .await
        .unwrap_err();
    assert_eq!(rejected_status(&err), Some(Status::SceneNotFound));

    client.exit().await?;

    let server = server.await??;
    assert!(server.pad().is_empty());
    assert_eq!(server.client_count(), 0);
    assert!(server.pad().frames_drawn() >= 1);
    Ok(())
}

/// Scenes belong to the client that opened them and die with it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ownership_and_release_on_exit() -> anyhow::Result<()> {
    init_tracing();
    let (cfg, server) = spawn_server(test_config(), |s| s.clients_served() >= 2).await?;

    let mut alice = PadClient::connect(&cfg).await?;
    let mut bob = PadClient::connect(&cfg).await?;

    let a1 = alice.begin(&Scene::new("alice-1")).await?;
    let a2 = alice.begin(&Scene::new("alice-2")).await?;
    let b1 = bob.begin(&Scene::new("bob-1")).await?;
    assert!(a1 != a2 && a2 != b1 && a1 != b1);

    let label = Gp::Label(Label::new(Vec3::ZERO, "intruder"));
    let err = bob.add(a1, &label).await.unwrap_err();
    assert_eq!(rejected_status(&err), Some(Status::NotOwner));
    let err = bob.close(a2).await.unwrap_err();
    assert_eq!(rejected_status(&err), Some(Status::NotOwner));

    // Bob's own scene still works after the rejections.
    assert_eq!(bob.add(b1, &label).await?, 1);

    // Neither client closes its scenes; EXIT must release them.
    alice.exit().await?;
    bob.exit().await?;

    let server = server.await??;
    assert!(server.pad().is_empty());
    Ok(())
}

/// A header split across several writes is reassembled.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn split_header_and_payload_are_reassembled() -> anyhow::Result<()> {
    init_tracing();
    let (cfg, server) = spawn_server(test_config(), |s| s.clients_served() >= 1).await?;

    let mut stream = TcpStream::connect((cfg.address.as_str(), cfg.port)).await?;
    stream.set_nodelay(true)?;
    let bytes = Command::begin(&demo::demo_scene()).to_bytes();

    for chunk in [&bytes[..5], &bytes[5..31], &bytes[31..40], &bytes[40..]] {
        stream.write_all(chunk).await?;
        stream.flush().await?;
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    let reply = read_reply(&mut stream).await?;
    assert_eq!(reply.status, Status::Ok);
    assert_eq!(reply.value, 1);

    stream.write_all(&Command::exit().to_bytes()).await?;
    let server = server.await??;
    assert!(server.pad().is_empty());
    Ok(())
}

/// Unknown opcodes get a distinct error and the connection stays usable.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_opcode_is_reported() -> anyhow::Result<()> {
    init_tracing();
    let (cfg, server) = spawn_server(test_config(), |s| s.clients_served() >= 1).await?;

    let mut client = PadClient::connect(&cfg).await?;
    let bogus = Command::new(
        Header {
            word0: 0x51,
            arg1: 0,
            arg2: 0,
            arg3: 4,
        },
        vec![1u8, 2, 3, 4].into(),
    );
    let reply = client.request(&bogus).await?;
    assert_eq!(reply.status, Status::UnknownOpcode);
    assert!(reply.message.contains("81"));

    // The four payload bytes were skipped, so the stream is still in sync.
    let handle = client.begin(&Scene::new("after bogus")).await?;
    assert_ne!(handle.get(), 0);
    client.exit().await?;

    server.await??;
    Ok(())
}

/// A header announcing an oversized payload is answered, then disconnected.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_payload_disconnects() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = test_config();
    cfg.max_payload_len = 64;
    let (cfg, server) = spawn_server(cfg, |s| s.clients_served() >= 1).await?;

    let mut stream = TcpStream::connect((cfg.address.as_str(), cfg.port)).await?;
    let header = Command::new(Header::command(Opcode::Begin, 0, 0, 1000), Default::default());
    stream.write_all(&header.to_bytes()).await?;

    let reply = read_reply(&mut stream).await?;
    assert_eq!(reply.status, Status::PayloadTooLarge);

    let server = server.await??;
    assert_eq!(server.client_count(), 0);

    let mut rest = Vec::new();
    let n = stream.read_to_end(&mut rest).await.unwrap_or(0);
    assert_eq!(n, 0, "server should have closed the connection");
    Ok(())
}

/// More pipelined commands than one tick's budget are all answered in order.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipelined_commands_span_ticks() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = test_config();
    cfg.max_commands_per_tick = 8;
    let (cfg, server) = spawn_server(cfg, |s| s.clients_served() >= 1).await?;

    // Raw connection so every ADD can be written before any reply is read.
    let mut conn = CommandConn::connect(&cfg.address, cfg.port).await?;
    conn.send(&Command::begin(&Scene::new("stream"))).await?;
    let reply = conn.recv_reply().await?;
    assert!(reply.is_ok(), "{reply:?}");
    let handle = SceneHandle::new(reply.value).expect("non-zero handle");

    const N: u64 = 50;
    for i in 0..N {
        let gp = Gp::Label(Label::new(Vec3::new(i as f32, 0.0, 0.0), format!("#{i}")));
        conn.send(&Command::add(handle, &gp)).await?;
    }
    for i in 0..N {
        let reply = conn.recv_reply().await?;
        assert!(reply.is_ok(), "{reply:?}");
        assert_eq!(reply.value, i + 1);
    }
    conn.send(&Command::exit()).await?;

    let server = server.await??;
    assert!(server.pad().is_empty());
    Ok(())
}

fn unknown_opcode_batch(count: usize) -> Vec<u8> {
    let cmd = Command::new(
        Header {
            word0: 0x51,
            ..Default::default()
        },
        Default::default(),
    )
    .to_bytes();
    cmd.iter().copied().cycle().take(cmd.len() * count).collect()
}

/// Spawns a writer that floods the server with commands and never reads a
/// reply. The read half is returned so the socket stays open.
async fn spawn_flooder(
    cfg: &cat_shared::config::CatConfig,
    batches: usize,
) -> anyhow::Result<(OwnedReadHalf, tokio::task::JoinHandle<()>)> {
    let stream = TcpStream::connect((cfg.address.as_str(), cfg.port)).await?;
    let (rx, mut tx) = stream.into_split();
    let batch = unknown_opcode_batch(1024);
    let writer = tokio::spawn(async move {
        for _ in 0..batches {
            if tx.write_all(&batch).await.is_err() {
                break;
            }
        }
    });
    Ok((rx, writer))
}

/// A client that never reads its replies does not hold up other clients.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unread_replies_do_not_block_other_clients() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = test_config();
    cfg.max_commands_per_tick = 4096;
    cfg.max_outbound_len = 4096;
    cfg.stall_timeout_ms = 60_000;
    let (cfg, server) = spawn_server(cfg, |s| s.clients_served() >= 1).await?;

    let (_flood_rx, writer) = spawn_flooder(&cfg, 1000).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut client = PadClient::connect(&cfg).await?;
    let scene = Scene::new("still served");
    let begin = client.begin(&scene);
    let handle = tokio::time::timeout(Duration::from_secs(5), begin).await??;
    assert_ne!(handle.get(), 0);
    client.exit().await?;

    let server = server.await??;
    // Only the flooding client is left, still connected.
    assert_eq!(server.client_count(), 1);
    assert!(server.outbound_queued() <= 4096 + 64);
    writer.abort();
    Ok(())
}

/// A client whose reply queue stays full is disconnected.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_reader_is_disconnected() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = test_config();
    cfg.max_commands_per_tick = 4096;
    cfg.max_outbound_len = 4096;
    cfg.stall_timeout_ms = 200;
    let (cfg, server) = spawn_server(cfg, |s| s.clients_served() >= 1).await?;

    let (_flood_rx, writer) = spawn_flooder(&cfg, 2000).await?;

    let server = server.await??;
    assert_eq!(server.client_count(), 0);
    assert_eq!(server.outbound_queued(), 0);
    writer.abort();
    Ok(())
}

/// Dropping the connection mid-command discards the partial command and
/// releases the client's scenes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_mid_command_releases_scenes() -> anyhow::Result<()> {
    init_tracing();
    let (cfg, server) = spawn_server(test_config(), |s| s.clients_served() >= 1).await?;

    let mut stream = TcpStream::connect((cfg.address.as_str(), cfg.port)).await?;
    stream
        .write_all(&Command::begin(&Scene::new("abandoned")).to_bytes())
        .await?;
    let reply = read_reply(&mut stream).await?;
    let handle = SceneHandle::new(reply.value).expect("non-zero handle");

    let add = Command::add(handle, &Gp::Label(Label::new(Vec3::ZERO, "half"))).to_bytes();
    stream.write_all(&add[..add.len() / 2]).await?;
    stream.flush().await?;
    drop(stream);

    let server = server.await??;
    assert!(server.pad().is_empty());
    assert_eq!(server.client_count(), 0);
    Ok(())
}

/// BEGIN past the per-client scene limit is refused; other clients are
/// unaffected.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scene_limit_is_reported() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = test_config();
    cfg.max_scenes_per_client = 2;
    let (cfg, server) = spawn_server(cfg, |s| s.clients_served() >= 2).await?;

    let mut greedy = PadClient::connect(&cfg).await?;
    greedy.begin(&Scene::new("a")).await?;
    greedy.begin(&Scene::new("b")).await?;
    let err = greedy
        .begin(&Scene::new("c"))
        .await
        .expect_err("third scene must be refused");
    assert_eq!(rejected_status(&err), Some(Status::SceneLimit));
    assert_eq!(greedy.open_scenes().len(), 2);

    let mut other = PadClient::connect(&cfg).await?;
    other.begin(&Scene::new("d")).await?;
    other.exit().await?;
    greedy.exit().await?;

    let server = server.await??;
    assert!(server.pad().is_empty());
    Ok(())
}
