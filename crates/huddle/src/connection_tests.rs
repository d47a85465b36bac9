// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::PollSender;

use super::*;
use crate::dispatch::{EventContext, Reply};
use crate::hub::{Hub, Member};

type Inbound = mpsc::Sender<Result<Message, String>>;

fn timing() -> Timing {
    Timing::new(Duration::from_secs(1), Duration::from_secs(5), Duration::from_secs(6))
}

#[test]
fn zero_timing_falls_back_to_defaults() {
    let t = Timing::default();
    assert_eq!(t.write_wait, DEFAULT_WRITE_WAIT);
    assert_eq!(t.pong_wait, DEFAULT_PONG_WAIT);
    assert_eq!(t.ping_period, Duration::from_secs(54));
}

#[test]
fn zero_ping_period_follows_pong_wait() {
    let t = Timing::new(Duration::from_secs(2), Duration::ZERO, Duration::from_secs(10));
    assert_eq!(t.write_wait, Duration::from_secs(2));
    assert_eq!(t.ping_period, Duration::from_secs(9));
    assert_eq!(t.pong_wait, Duration::from_secs(10));
}

#[yare::parameterized(
    one_nano   = { Duration::from_nanos(1) },
    nine_nanos = { Duration::from_nanos(9) },
    one_micro  = { Duration::from_micros(1) },
)]
fn derived_ping_period_is_never_zero(pong_wait: Duration) {
    let t = Timing::new(Duration::from_secs(1), Duration::ZERO, pong_wait);
    assert_eq!(t.ping_period, Duration::from_millis(1));
}

// -- write pump ---------------------------------------------------------------

struct Writer {
    queue: mpsc::Sender<Utf8Bytes>,
    out: mpsc::Receiver<Message>,
    close_tx: oneshot::Sender<Option<CloseFrame>>,
    closed: CancellationToken,
    task: JoinHandle<()>,
}

fn spawn_writer() -> Writer {
    let (queue, send_rx) = mpsc::channel(8);
    let (sink_tx, out) = mpsc::channel(8);
    let (close_tx, close_rx) = oneshot::channel();
    let closed = CancellationToken::new();
    let sink = PollSender::new(sink_tx);
    let task = tokio::spawn(write_pump(sink, send_rx, close_rx, timing(), closed.clone()));
    Writer { queue, out, close_tx, closed, task }
}

#[tokio::test(start_paused = true)]
async fn write_pump_forwards_queued_payloads() -> anyhow::Result<()> {
    let mut w = spawn_writer();
    w.queue.send("first".into()).await?;
    w.queue.send("second".into()).await?;
    assert_eq!(w.out.recv().await, Some(Message::Text("first".into())));
    assert_eq!(w.out.recv().await, Some(Message::Text("second".into())));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn write_pump_pings_every_period() -> anyhow::Result<()> {
    let mut w = spawn_writer();
    let start = Instant::now();
    assert_eq!(w.out.recv().await, Some(Message::Ping(Bytes::new())));
    assert!(start.elapsed() >= Duration::from_secs(5));
    assert_eq!(w.out.recv().await, Some(Message::Ping(Bytes::new())));
    assert!(start.elapsed() >= Duration::from_secs(10));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn closed_queue_sends_close_and_cancels() -> anyhow::Result<()> {
    let mut w = spawn_writer();
    drop(w.queue);
    assert_eq!(w.out.recv().await, Some(Message::Close(None)));
    assert_eq!(w.out.recv().await, None);
    w.closed.cancelled().await;
    w.task.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn close_signal_writes_the_given_frame() -> anyhow::Result<()> {
    let mut w = spawn_writer();
    let frame = CloseCode::Abandoned.frame("abandoned");
    let _ = w.close_tx.send(Some(frame.clone()));
    assert_eq!(w.out.recv().await, Some(Message::Close(Some(frame))));
    w.task.await?;
    assert!(w.closed.is_cancelled());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropped_close_signal_still_closes() -> anyhow::Result<()> {
    let mut w = spawn_writer();
    drop(w.close_tx);
    assert_eq!(w.out.recv().await, Some(Message::Close(None)));
    w.task.await?;
    Ok(())
}

// -- read pump ----------------------------------------------------------------

/// One room with an observer member and an admitted `alice`.
struct Room {
    router: Arc<EventRouter>,
    observer: mpsc::Receiver<Utf8Bytes>,
    retreats: Arc<AtomicUsize>,
    key: SubscriptionKey,
    _alice: mpsc::Receiver<Utf8Bytes>,
}

fn room() -> Room {
    let retreats = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&retreats);
    let router = EventRouter::builder(Hub::spawn(timing()))
        .on("vote", |ctx: EventContext| async move {
            Ok(Reply::Broadcast(OutboundEvent::new("vote_cast", ctx.value, &ctx.user_id)))
        })
        .on("leave", |_ctx: EventContext| async move { Ok(Reply::ForceClose) })
        .retreat_user(move |_room: String, user: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(format!("[\"without {user}\"]"))
            }
        })
        .build();

    let (observer, observer_rx) = Member::channel("r1", "watcher");
    let (alice, alice_rx) = Member::channel("r1", "alice");
    let key =
        SubscriptionKey { conn: alice.id, room_id: "r1".to_owned(), user_id: "alice".to_owned() };
    router.hub().register(observer);
    router.hub().register(alice);
    Room { router, observer: observer_rx, retreats, key, _alice: alice_rx }
}

struct Reader {
    inbound: Inbound,
    close_rx: oneshot::Receiver<Option<CloseFrame>>,
    closed: CancellationToken,
    task: JoinHandle<()>,
}

fn spawn_reader(room: &Room) -> Reader {
    let (inbound, rx) = mpsc::channel(8);
    let (close_tx, close_rx) = oneshot::channel();
    let closed = CancellationToken::new();
    let task = tokio::spawn(read_pump(
        ReceiverStream::new(rx),
        room.key.clone(),
        Arc::clone(&room.router),
        timing(),
        close_tx,
        closed.clone(),
    ));
    Reader { inbound, close_rx, closed, task }
}

fn text(json: &str) -> Result<Message, String> {
    Ok(Message::Text(json.into()))
}

async fn next_json(rx: &mut mpsc::Receiver<Utf8Bytes>) -> anyhow::Result<serde_json::Value> {
    let msg = rx.recv().await.ok_or_else(|| anyhow::anyhow!("queue closed"))?;
    Ok(serde_json::from_str(&msg)?)
}

#[tokio::test]
async fn read_pump_dispatches_and_survives_malformed_input() -> anyhow::Result<()> {
    let mut room = room();
    let r = spawn_reader(&room);

    r.inbound.send(text(r#"{"type":"vote","value":"5"}"#)).await?;
    let msg = next_json(&mut room.observer).await?;
    assert_eq!(msg["type"], "vote_cast");
    assert_eq!(msg["value"], "5");
    assert_eq!(msg["userId"], "alice");

    r.inbound.send(text("not json")).await?;
    r.inbound.send(text(r#"{"type":"no_such_event"}"#)).await?;
    r.inbound.send(Ok(Message::Binary(Bytes::from_static(b"\x00")))).await?;
    r.inbound.send(text(r#"{"type":"vote","value":"8"}"#)).await?;
    let msg = next_json(&mut room.observer).await?;
    assert_eq!(msg["value"], "8");
    assert!(!r.task.is_finished());
    Ok(())
}

#[tokio::test]
async fn force_close_sends_abandoned_and_only_user_left() -> anyhow::Result<()> {
    let mut room = room();
    let r = spawn_reader(&room);

    r.inbound.send(text(r#"{"type":"leave"}"#)).await?;
    r.task.await?;

    let frame = r.close_rx.await?.ok_or_else(|| anyhow::anyhow!("no close frame"))?;
    assert_eq!(frame.code, 4002);
    assert_eq!(frame.reason.as_str(), "abandoned");

    let msg = next_json(&mut room.observer).await?;
    assert_eq!(msg["type"], USER_LEFT);
    assert_eq!(msg["value"], "[\"without alice\"]");
    assert_eq!(msg["userId"], "alice");
    assert_eq!(room.retreats.load(Ordering::SeqCst), 1);

    assert_eq!(room.router.hub().stats().await.connections, 1);
    assert!(room.observer.try_recv().is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_pong_ends_the_session_once() -> anyhow::Result<()> {
    let mut room = room();
    let r = spawn_reader(&room);
    let start = Instant::now();

    r.task.await?;
    assert!(start.elapsed() >= Duration::from_secs(6));
    assert_eq!(r.close_rx.await?, None);

    let msg = next_json(&mut room.observer).await?;
    assert_eq!(msg["type"], USER_LEFT);
    assert_eq!(room.retreats.load(Ordering::SeqCst), 1);
    assert!(room.observer.try_recv().is_err());
    drop(r.inbound);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pong_extends_the_read_deadline() -> anyhow::Result<()> {
    let room = room();
    let r = spawn_reader(&room);
    let start = Instant::now();

    tokio::time::sleep(Duration::from_secs(4)).await;
    r.inbound.send(Ok(Message::Pong(Bytes::new()))).await?;
    // A ping from the client does not count.
    tokio::time::sleep(Duration::from_secs(1)).await;
    r.inbound.send(Ok(Message::Ping(Bytes::new()))).await?;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!r.task.is_finished());

    r.task.await?;
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert!(start.elapsed() < Duration::from_secs(11));
    Ok(())
}

#[tokio::test]
async fn writer_shutdown_stops_a_blocked_reader() -> anyhow::Result<()> {
    let mut room = room();
    let r = spawn_reader(&room);

    r.closed.cancel();
    r.task.await?;
    assert_eq!(r.close_rx.await?, None);
    let msg = next_json(&mut room.observer).await?;
    assert_eq!(msg["type"], USER_LEFT);
    Ok(())
}

#[tokio::test]
async fn peer_close_ends_the_session() -> anyhow::Result<()> {
    let room = room();
    let r = spawn_reader(&room);

    r.inbound.send(Ok(Message::Close(None))).await?;
    r.task.await?;
    assert_eq!(r.close_rx.await?, None);
    assert_eq!(room.retreats.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn last_member_leaving_skips_user_left() -> anyhow::Result<()> {
    let mut room = room();
    drop(std::mem::replace(&mut room.observer, mpsc::channel(1).1));
    // The closed observer queue is evicted on the next broadcast.
    room.router.hub().broadcast(RoomMessage::new("r1", "ping".into()));
    let r = spawn_reader(&room);

    drop(r.inbound);
    r.task.await?;
    assert!(!room.router.hub().room_exists("r1").await);
    assert_eq!(room.retreats.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn socket_and_api_events_broadcast_identical_bytes() -> anyhow::Result<()> {
    let mut room = room();
    let r = spawn_reader(&room);

    r.inbound.send(text(r#"{"type":"vote","value":"{\"points\":3}"}"#)).await?;
    let from_socket = room.observer.recv().await;

    room.router.process_api_event("alice", "r1", "vote", r#"{"points":3}"#.to_owned()).await?;
    let from_api = room.observer.recv().await;

    assert!(from_socket.is_some());
    assert_eq!(from_socket, from_api);
    Ok(())
}
