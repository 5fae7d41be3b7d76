mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bluelink_core::{BluetoothError, BluetoothctlLine, DeviceFilter};
use support::fake_session;

async fn next(rx: &mut tokio::sync::mpsc::UnboundedReceiver<BluetoothctlLine>) -> BluetoothctlLine {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("line in time")
        .expect("channel open")
}

#[tokio::test]
async fn test_commands_reach_stdin_verbatim() {
    let (session, mut peer) = fake_session();

    session.pair("AA:BB:CC:DD:EE:FF").await.unwrap();
    session.scan_on().await.unwrap();
    session.discoverable_timeout(60).await.unwrap();
    session.devices(Some(DeviceFilter::Trusted)).await.unwrap();
    session.pin("1234").await.unwrap();
    session.no().await.unwrap();

    peer.expect("pair AA:BB:CC:DD:EE:FF").await;
    peer.expect("scan on").await;
    peer.expect("discoverable-timeout 60").await;
    peer.expect("devices Trusted").await;
    peer.expect("1234").await;
    peer.expect("no").await;
}

#[tokio::test]
async fn test_one_event_per_non_empty_line_in_order() {
    let (session, mut peer) = fake_session();
    let (_subscription, mut events) = session.events();

    peer.emit_raw(concat!(
        "[NEW] Device AA:BB:CC:DD:EE:FF Phone\n",
        "\n   \n",
        "[CHG] Device AA:BB:CC:DD:EE:FF Connected: yes\n",
        "Agent registered\n",
    ))
    .await;

    assert!(matches!(next(&mut events).await, BluetoothctlLine::DeviceNew { .. }));
    assert!(matches!(next(&mut events).await, BluetoothctlLine::DeviceChanged { .. }));
    assert_eq!(
        next(&mut events).await,
        BluetoothctlLine::Unknown {
            raw_line: "Agent registered".into()
        }
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_prompt_without_newline_is_delivered() {
    let (session, mut peer) = fake_session();
    let (_subscription, mut events) = session.events();

    peer.emit_raw("[agent] Confirm passkey 482913 (yes/no): ").await;

    assert_eq!(
        next(&mut events).await,
        BluetoothctlLine::PasskeyConfirmation {
            passkey: "482913".into()
        }
    );
}

#[tokio::test]
async fn test_handlers_run_in_registration_order() {
    let (session, mut peer) = fake_session();
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = order.clone();
    let _a = session.on_line(move |_| first.lock().unwrap().push("first"));
    let second = order.clone();
    let _b = session.on_line(move |_| second.lock().unwrap().push("second"));
    let (_c, mut events) = session.events();

    peer.emit("Pairing successful").await;
    next(&mut events).await;

    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_unsubscribed_handler_stops_receiving() {
    let (session, mut peer) = fake_session();
    let count = Arc::new(Mutex::new(0));

    let counter = count.clone();
    let subscription = session.on_line(move |_| *counter.lock().unwrap() += 1);
    let (_keep, mut events) = session.events();

    peer.emit("Connection successful").await;
    next(&mut events).await;
    subscription.unsubscribe();
    peer.emit("Connection successful").await;
    next(&mut events).await;

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(session.handler_count(), 1);
}

#[tokio::test]
async fn test_kill_is_idempotent_and_closes_stdin() {
    let (session, mut peer) = fake_session();

    assert!(session.kill().await);
    assert!(!session.kill().await);
    assert!(session.is_killed());
    assert!(peer.closed().await);

    let err = session.connect("AA:BB:CC:DD:EE:FF").await.unwrap_err();
    assert!(matches!(err, BluetoothError::SessionClosed));
}

#[tokio::test]
async fn test_stdout_close_ends_event_stream() {
    let (session, peer) = fake_session();
    let (_subscription, mut events) = session.events();

    let _commands = peer.hang_up();

    let closed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("stream ends in time");
    assert!(closed.is_none());
    assert_eq!(session.handler_count(), 0);
}
