mod support;

use std::time::Duration;
use tokio::time::Instant;

use bluelink_core::{BluetoothError, ToastStyle};
use support::{fake_session, workflows, FakeLauncher, TestHost};

const PHONE: &str = "11:22:33:44:55:66";

#[tokio::test]
async fn test_discoverable_accepts_incoming_pair_then_stops() {
    let (session, mut peer) = fake_session();
    let host = TestHost::new(vec![true], vec![]);
    let workflows = workflows(FakeLauncher::with(vec![session]), &host);

    let setup = tokio::spawn(async move {
        peer.expect("discoverable-timeout 180").await;
        peer.expect("discoverable on").await;
        peer.emit("[CHG] Controller 00:1A:7D:DA:71:13 Discoverable: yes").await;
        peer.emit("Changing discoverable on succeeded").await;
        peer
    });

    let discoverable = workflows.make_discoverable().await.unwrap();
    let mut peer = setup.await.unwrap();
    assert!(discoverable.is_active());

    peer.emit(&format!("[NEW] Device {} Pixel 8", PHONE)).await;
    peer.emit_raw("[agent] Confirm passkey 654321 (yes/no): ").await;
    peer.expect("yes").await;
    peer.emit(&format!("[CHG] Device {} Paired: yes", PHONE)).await;

    // animated, discoverable, nearby, paired
    let toasts = tokio::time::timeout(Duration::from_secs(5), host.notifier.wait_for(4))
        .await
        .expect("toasts in time");
    assert_eq!(toasts[1].style, ToastStyle::Success);
    assert_eq!(toasts[2].title, "Pixel 8 is nearby");
    assert_eq!(toasts[3].title, "Paired with Pixel 8");
    assert!(host.confirmer.asked()[0].message.contains("654321"));

    let peer_task = tokio::spawn(async move {
        peer.expect("discoverable off").await;
        peer.emit("Changing discoverable off succeeded").await;
        peer.closed().await
    });
    discoverable.stop().await.unwrap();
    assert!(peer_task.await.unwrap());
    assert_eq!(host.notifier.toasts().last().unwrap().title, "No longer discoverable");
}

#[tokio::test]
async fn test_stop_reports_failure_from_bluetoothctl() {
    let (session, mut peer) = fake_session();
    let host = TestHost::new(vec![], vec![]);
    let workflows = workflows(FakeLauncher::with(vec![session]), &host);

    let setup = tokio::spawn(async move {
        peer.expect("discoverable-timeout 180").await;
        peer.expect("discoverable on").await;
        peer.emit("Changing discoverable on succeeded").await;
        peer
    });
    let discoverable = workflows.make_discoverable().await.unwrap();
    let mut peer = setup.await.unwrap();

    let peer_task = tokio::spawn(async move {
        peer.expect("discoverable off").await;
        peer.emit("Failed to set discoverable off: org.bluez.Error.Failed").await;
        peer.closed().await
    });

    // The reason can only come back if the session was still open when bluetoothctl answered.
    let err = discoverable.stop().await.unwrap_err();
    match err {
        BluetoothError::Failed { operation, reason } => {
            assert_eq!(operation, "undiscoverable");
            assert_eq!(reason, "org.bluez.Error.Failed");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(peer_task.await.unwrap());

    let last = host.notifier.toasts().last().cloned().unwrap();
    assert_eq!(last.style, ToastStyle::Failure);
    assert_eq!(last.title, "Failed to stop discoverable mode");
    assert_eq!(last.message.as_deref(), Some("org.bluez.Error.Failed"));
}

#[tokio::test(start_paused = true)]
async fn test_discoverable_times_out() {
    let (session, mut peer) = fake_session();
    let host = TestHost::new(vec![], vec![]);
    let workflows = workflows(FakeLauncher::with(vec![session]), &host);

    let peer_task = tokio::spawn(async move {
        peer.expect("discoverable-timeout 180").await;
        peer.expect("discoverable on").await;
        peer.closed().await
    });

    let started = Instant::now();
    let err = workflows.make_discoverable().await.err().unwrap();
    match err {
        BluetoothError::Timeout { operation, after } => {
            assert_eq!(operation, "discoverable");
            assert_eq!(after, Duration::from_secs(10));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(peer_task.await.unwrap());
    assert_eq!(host.notifier.toasts().last().unwrap().message.as_deref(), Some("Timed out"));
}

#[tokio::test]
async fn test_incoming_decline_keeps_discoverable() {
    let (session, mut peer) = fake_session();
    let host = TestHost::new(vec![false], vec![]);
    let workflows = workflows(FakeLauncher::with(vec![session]), &host);

    let setup = tokio::spawn(async move {
        peer.expect("discoverable-timeout 180").await;
        peer.expect("discoverable on").await;
        peer.emit("Changing discoverable on succeeded").await;
        peer
    });

    let discoverable = workflows.make_discoverable().await.unwrap();
    let mut peer = setup.await.unwrap();

    peer.emit(&format!("[NEW] Device {} Pixel 8", PHONE)).await;
    peer.emit("[agent] Confirm passkey 111111 (yes/no):").await;
    peer.expect("no").await;

    let toasts = tokio::time::timeout(Duration::from_secs(5), host.notifier.wait_for(4))
        .await
        .expect("toasts in time");
    assert_eq!(toasts[3].style, ToastStyle::Failure);
    assert_eq!(toasts[3].message.as_deref(), Some("Cancelled"));
    assert!(discoverable.is_active());

    drop(discoverable);
    assert!(peer.closed().await);
}

#[tokio::test]
async fn test_discoverable_failure_rejects() {
    let (session, mut peer) = fake_session();
    let host = TestHost::new(vec![], vec![]);
    let workflows = workflows(FakeLauncher::with(vec![session]), &host);

    let peer_task = tokio::spawn(async move {
        peer.expect("discoverable-timeout 180").await;
        peer.expect("discoverable on").await;
        peer.emit("Failed to set discoverable on: org.bluez.Error.Failed").await;
        peer.closed().await
    });

    let err = workflows.make_discoverable().await.err().unwrap();
    assert!(matches!(err, BluetoothError::Failed { operation: "discoverable", .. }));
    assert!(peer_task.await.unwrap());
    assert_eq!(host.notifier.toasts().last().unwrap().style, ToastStyle::Failure);
}

#[tokio::test]
async fn test_make_undiscoverable() {
    let (session, mut peer) = fake_session();
    let host = TestHost::new(vec![], vec![]);
    let workflows = workflows(FakeLauncher::with(vec![session]), &host);

    let peer_task = tokio::spawn(async move {
        peer.expect("discoverable off").await;
        peer.emit("[CHG] Controller 00:1A:7D:DA:71:13 Discoverable: no").await;
        peer.closed().await
    });

    workflows.make_undiscoverable().await.unwrap();
    assert!(peer_task.await.unwrap());

    let toasts = host.notifier.toasts();
    assert_eq!(toasts[0].title, "Turning off discoverable mode...");
    assert_eq!(toasts[1].style, ToastStyle::Success);
    assert_eq!(toasts[1].title, "Discoverable mode off");
}

#[tokio::test]
async fn test_make_undiscoverable_failure() {
    let (session, mut peer) = fake_session();
    let host = TestHost::new(vec![], vec![]);
    let workflows = workflows(FakeLauncher::with(vec![session]), &host);

    let peer_task = tokio::spawn(async move {
        peer.expect("discoverable off").await;
        peer.emit("Failed to set discoverable off: org.bluez.Error.NotReady").await;
        peer.closed().await
    });

    let err = workflows.make_undiscoverable().await.unwrap_err();
    match err {
        BluetoothError::Failed { operation, reason } => {
            assert_eq!(operation, "undiscoverable");
            assert_eq!(reason, "org.bluez.Error.NotReady");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(peer_task.await.unwrap());
    assert_eq!(host.notifier.toasts().last().unwrap().title, "Failed to stop discoverable mode");
}
