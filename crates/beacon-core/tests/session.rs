//! End-to-end behaviour of the session manager against the simulated radio.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::advertising::{DEFAULT_OFF_FRAME, DEFAULT_ON_FRAME};
use beacon_core::{
    AdvertisementPayload, BeaconError, Config, DiscoveryEvent, Operation, Permission, PermissionSet,
    PermissionStatus, RadioCall, SessionManager, SessionState, SimulatedRadio,
};
use chrono::{TimeDelta, Utc};
use tokio_test::assert_ok;

fn setup() -> (SessionManager, Arc<SimulatedRadio>) {
    let radio = Arc::new(SimulatedRadio::new());
    (SessionManager::new(radio.clone()), radio)
}

fn slow_setup(latency: Duration) -> (SessionManager, Arc<SimulatedRadio>) {
    let radio = Arc::new(SimulatedRadio::new().with_latency(latency));
    (SessionManager::new(radio.clone()), radio)
}

/// A radio that applies each call before it confirms it.
fn late_ack_setup(ack: Duration) -> (SessionManager, Arc<SimulatedRadio>) {
    let radio = Arc::new(SimulatedRadio::new().with_ack_latency(ack));
    (SessionManager::new(radio.clone()), radio)
}

fn granted() -> PermissionSet {
    PermissionSet::pre_granted()
}

fn payload() -> AdvertisementPayload {
    AdvertisementPayload::new("beacon")
}

async fn wait_for_devices(manager: &SessionManager, count: usize) {
    for _ in 0..1000 {
        if manager.aggregator().len().await >= count {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("aggregator never reached {count} devices");
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Advertise,
    StopAdvertise,
    Scan,
    StopScan,
}

const STEPS: [Step; 4] = [Step::Advertise, Step::StopAdvertise, Step::Scan, Step::StopScan];

fn predicted(state: SessionState, step: Step) -> SessionState {
    match (state, step) {
        (SessionState::Idle, Step::Advertise) => SessionState::Advertising,
        (SessionState::Idle, Step::Scan) => SessionState::Scanning,
        (SessionState::Advertising, Step::StopAdvertise)
        | (SessionState::Scanning, Step::StopScan) => SessionState::Idle,
        (state, _) => state,
    }
}

#[tokio::test]
async fn test_every_short_sequence_follows_transition_table() {
    for a in STEPS {
        for b in STEPS {
            for c in STEPS {
                let (manager, _) = setup();
                let mut expected = SessionState::Idle;

                for step in [a, b, c] {
                    let result = match step {
                        Step::Advertise => manager.request_advertise(payload(), &granted()).await,
                        Step::StopAdvertise => manager.stop_advertise().await,
                        Step::Scan => manager.request_scan(&granted(), None).await,
                        Step::StopScan => manager.stop_scan().await,
                    };
                    let next = predicted(expected, step);
                    let illegal_request = matches!(step, Step::Advertise | Step::Scan)
                        && expected != SessionState::Idle;
                    if illegal_request {
                        assert!(
                            matches!(result, Err(BeaconError::InvalidTransition { .. })),
                            "{step:?} from {expected} should be rejected"
                        );
                    } else {
                        assert!(result.is_ok(), "{step:?} from {expected} failed: {result:?}");
                    }
                    expected = next;
                    assert_eq!(manager.state(), expected, "after {a:?}, {b:?}, {c:?}");
                }
            }
        }
    }
}

#[tokio::test]
async fn test_stops_are_idempotent() {
    let (manager, radio) = setup();

    assert_ok!(manager.stop_advertise().await);
    assert_ok!(manager.stop_scan().await);
    assert_eq!(radio.call_count(), 0);

    assert_ok!(manager.request_advertise(payload(), &granted()).await);
    assert_ok!(manager.stop_advertise().await);
    assert_ok!(manager.stop_advertise().await);
    assert_eq!(manager.state(), SessionState::Idle);

    assert_ok!(manager.request_scan(&granted(), None).await);
    assert_ok!(manager.stop_scan().await);
    assert_ok!(manager.stop_scan().await);
    assert_eq!(manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_rediscovery_updates_single_entry() {
    let (manager, radio) = setup();
    assert_ok!(manager.request_scan(&granted(), None).await);

    let t0 = Utc::now();
    for (rssi, offset) in [(-40, 0), (-55, 5)] {
        assert!(radio.inject(DiscoveryEvent {
            address: "AA:BB".to_string(),
            name: None,
            rssi,
            seen_at: t0 + TimeDelta::seconds(offset),
        }));
    }
    for _ in 0..1000 {
        if manager
            .aggregator()
            .get("AA:BB")
            .await
            .is_some_and(|device| device.rssi == -55)
        {
            break;
        }
        tokio::task::yield_now().await;
    }

    let devices = manager.aggregator().current_devices_at(t0 + TimeDelta::seconds(5)).await;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].address, "AA:BB");
    assert_eq!(devices[0].rssi, -55);
}

#[tokio::test]
async fn test_devices_ordered_by_signal_strength() {
    let (manager, radio) = setup();
    assert_ok!(manager.request_scan(&granted(), None).await);

    assert!(radio.inject(DiscoveryEvent::now("AA:BB", None, -70)));
    assert!(radio.inject(DiscoveryEvent::now("CC:DD", None, -40)));
    wait_for_devices(&manager, 2).await;

    let addresses: Vec<String> = manager
        .current_devices()
        .await
        .into_iter()
        .map(|device| device.address)
        .collect();
    assert_eq!(addresses, ["CC:DD", "AA:BB"]);
}

#[tokio::test]
async fn test_update_while_idle_is_rejected() {
    let (manager, radio) = setup();

    let err = manager.update_advertising_data(true).await.unwrap_err();
    assert!(matches!(err, BeaconError::NotAdvertising));
    assert!(manager.payload().is_none());
    assert_eq!(radio.call_count(), 0);
}

#[tokio::test]
async fn test_scan_rejected_while_advertising() {
    let (manager, radio) = setup();
    assert_ok!(manager.request_advertise(payload(), &granted()).await);
    let calls = radio.call_count();

    let err = manager.request_scan(&granted(), None).await.unwrap_err();
    assert!(matches!(
        err,
        BeaconError::InvalidTransition {
            operation: Operation::StartScan,
            ..
        }
    ));
    assert!(!err.is_busy());
    assert_eq!(manager.state(), SessionState::Advertising);
    assert_eq!(radio.call_count(), calls);
}

#[tokio::test]
async fn test_stale_device_hidden_until_rediscovered() {
    let (manager, radio) = setup();
    assert_ok!(manager.request_scan(&granted(), None).await);

    let old = Utc::now() - TimeDelta::seconds(60);
    assert!(radio.inject(DiscoveryEvent {
        address: "AA:BB".to_string(),
        name: None,
        rssi: -50,
        seen_at: old,
    }));
    wait_for_devices(&manager, 1).await;

    assert!(manager.current_devices().await.is_empty());
    assert!(manager.aggregator().get("AA:BB").await.is_some());

    assert!(radio.inject(DiscoveryEvent::now("AA:BB", None, -50)));
    for _ in 0..1000 {
        if !manager.current_devices().await.is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(manager.current_devices().await.len(), 1);
}

#[tokio::test]
async fn test_missing_advertise_permission_is_denied() {
    let (manager, radio) = setup();
    let permissions = PermissionSet::pre_granted()
        .with(Permission::BluetoothAdvertise, PermissionStatus::Denied);

    let err = manager.request_advertise(payload(), &permissions).await.unwrap_err();
    match err {
        BeaconError::PermissionDenied { missing } => {
            assert_eq!(missing, vec![Permission::BluetoothAdvertise]);
        }
        other => panic!("expected PermissionDenied, got {other:?}"),
    }
    assert_eq!(manager.state(), SessionState::Idle);
    assert_eq!(radio.call_count(), 0);
}

#[tokio::test]
async fn test_state_checked_before_permissions() {
    let (manager, _) = setup();
    assert_ok!(manager.request_advertise(payload(), &granted()).await);

    let err = manager
        .request_scan(&PermissionSet::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BeaconError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_permissions_checked_before_radio() {
    let (manager, radio) = setup();
    radio.set_enabled(false);

    let err = manager
        .request_scan(&PermissionSet::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BeaconError::PermissionDenied { .. }));

    let err = manager.request_scan(&granted(), None).await.unwrap_err();
    assert!(matches!(err, BeaconError::RadioUnavailable));
    assert_eq!(manager.state(), SessionState::Idle);
    assert!(!radio.is_scanning());
}

#[tokio::test]
async fn test_adapter_failure_leaves_session_idle() {
    let (manager, radio) = setup();
    radio.fail_next(Operation::StartAdvertising, "ADVERTISING_START_FAILED");

    let err = manager.request_advertise(payload(), &granted()).await.unwrap_err();
    assert!(matches!(
        err,
        BeaconError::AdapterFailure {
            operation: Operation::StartAdvertising,
            ..
        }
    ));
    assert_eq!(manager.state(), SessionState::Idle);
    assert!(manager.payload().is_none());

    assert_ok!(manager.request_advertise(payload(), &granted()).await);
}

#[tokio::test]
async fn test_update_applies_in_place_and_short_circuits() {
    let (manager, radio) = setup();
    assert_ok!(manager.request_advertise(payload(), &granted()).await);

    assert_ok!(manager.update_advertising_data(true).await);
    assert_eq!(radio.call_count(), 1);

    assert_ok!(manager.update_advertising_data(false).await);
    assert!(!manager.payload().unwrap().data_enabled);
    assert!(matches!(
        radio.calls().last(),
        Some(RadioCall::UpdateAdvertising(_))
    ));
    assert_eq!(
        radio.advertised().unwrap(),
        manager.advertisement_data().unwrap()
    );
    assert!(!radio
        .calls()
        .iter()
        .any(|call| matches!(call, RadioCall::StopAdvertising)));
}

#[tokio::test]
async fn test_stop_pushes_off_frame_first() {
    let (manager, radio) = setup();
    assert_ok!(manager.request_advertise(payload(), &granted()).await);
    assert_ok!(manager.stop_advertise().await);

    let calls = radio.calls();
    assert_eq!(calls.len(), 3);
    match &calls[1] {
        RadioCall::UpdateAdvertising(data) => {
            assert_eq!(
                hex::encode_upper(&data.manufacturer_data),
                beacon_core::advertising::DEFAULT_OFF_FRAME
            );
        }
        other => panic!("expected off frame update, got {other:?}"),
    }
    assert_eq!(calls[2], RadioCall::StopAdvertising);
    assert!(manager.payload().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_update_in_flight_completes_before_stop() {
    let (manager, radio) = slow_setup(Duration::from_millis(50));
    assert_ok!(manager.request_advertise(payload(), &granted()).await);

    let update = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.update_advertising_data(false).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_ok!(manager.stop_advertise().await);
    assert_ok!(update.await.unwrap());

    assert_eq!(manager.state(), SessionState::Idle);
    let calls = radio.calls();
    assert!(matches!(calls[1], RadioCall::UpdateAdvertising(_)));
    // Data was already off, so no extra off frame before the stop.
    assert_eq!(calls[2], RadioCall::StopAdvertising);
}

#[tokio::test(start_paused = true)]
async fn test_stop_wins_over_queued_update() {
    let (manager, radio) = slow_setup(Duration::from_millis(50));
    assert_ok!(manager.request_advertise(payload(), &granted()).await);

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.update_advertising_data(false).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.update_advertising_data(true).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_ok!(manager.stop_advertise().await);

    assert_ok!(first.await.unwrap());
    assert!(matches!(
        second.await.unwrap(),
        Err(BeaconError::NotAdvertising)
    ));
    assert_eq!(manager.state(), SessionState::Idle);
    assert!(radio.advertised().is_none());

    let updates = radio
        .calls()
        .into_iter()
        .filter(|call| matches!(call, RadioCall::UpdateAdvertising(_)))
        .count();
    assert_eq!(updates, 1);
}

#[tokio::test(start_paused = true)]
async fn test_update_after_stop_began_is_rejected() {
    let (manager, _) = slow_setup(Duration::from_millis(50));
    assert_ok!(manager.request_advertise(payload(), &granted()).await);

    let stop = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.stop_advertise().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = manager.update_advertising_data(false).await.unwrap_err();
    assert!(matches!(err, BeaconError::NotAdvertising));

    assert_ok!(stop.await.unwrap());
    assert_eq!(manager.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_queued_updates_end_on_last_value() {
    let (manager, radio) = slow_setup(Duration::from_millis(50));
    assert_ok!(manager.request_advertise(payload(), &granted()).await);

    let mut handles = Vec::new();
    for value in [false, true, false] {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.update_advertising_data(value).await
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for handle in handles {
        assert_ok!(handle.await.unwrap());
    }

    assert!(!manager.payload().unwrap().data_enabled);
    assert_eq!(
        radio.advertised().unwrap(),
        manager.advertisement_data().unwrap()
    );
}

#[tokio::test(start_paused = true)]
async fn test_busy_stop_while_advertise_in_flight() {
    let (manager, _) = slow_setup(Duration::from_millis(50));

    let start = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.request_advertise(payload(), &granted()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = manager.stop_advertise().await.unwrap_err();
    assert!(err.is_busy());

    assert_ok!(start.await.unwrap());
    assert_eq!(manager.state(), SessionState::Advertising);
}

#[tokio::test(start_paused = true)]
async fn test_scan_timeout_returns_to_idle() {
    let (manager, radio) = setup();
    assert_ok!(
        manager
            .request_scan(&granted(), Some(Duration::from_secs(5)))
            .await
    );
    assert!(radio.inject(DiscoveryEvent::now("AA:BB", None, -40)));
    wait_for_devices(&manager, 1).await;
    assert_eq!(manager.snapshot().scan.unwrap().timeout_secs, Some(5));

    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(manager.state(), SessionState::Idle);
    assert!(!radio.is_scanning());
    assert!(manager.snapshot().scan.is_none());
    assert!(manager.aggregator().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_does_not_stop_next_scan() {
    let (manager, _) = setup();
    assert_ok!(
        manager
            .request_scan(&granted(), Some(Duration::from_secs(5)))
            .await
    );
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_ok!(manager.stop_scan().await);

    assert_ok!(manager.request_scan(&granted(), None).await);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(manager.state(), SessionState::Scanning);
}

#[tokio::test]
async fn test_new_scan_clears_previous_results() {
    let (manager, radio) = setup();
    assert_ok!(manager.request_scan(&granted(), None).await);
    assert!(radio.inject(DiscoveryEvent::now("AA:BB", None, -40)));
    wait_for_devices(&manager, 1).await;

    assert_ok!(manager.stop_scan().await);
    assert!(manager.current_devices().await.is_empty());

    assert_ok!(manager.request_scan(&granted(), None).await);
    assert!(manager.current_devices().await.is_empty());
}

#[tokio::test]
async fn test_subscribers_see_transitions() {
    let (manager, _) = setup();
    let mut updates = manager.subscribe();
    assert_eq!(updates.borrow().state, SessionState::Idle);

    assert_ok!(manager.request_scan(&granted(), None).await);
    let snapshot = updates
        .wait_for(|snapshot| snapshot.state == SessionState::Scanning)
        .await
        .unwrap()
        .clone();
    assert!(snapshot.scan.is_some());
    assert!(snapshot.transitioning.is_none());

    assert_ok!(manager.stop_scan().await);
    let snapshot = updates
        .wait_for(|snapshot| snapshot.state == SessionState::Idle)
        .await
        .unwrap()
        .clone();
    assert!(snapshot.scan.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_advertise_abandoned_after_radio_applied_can_be_stopped() {
    let (manager, radio) = late_ack_setup(Duration::from_secs(5));

    let attempt = tokio::time::timeout(
        Duration::from_secs(1),
        manager.request_advertise(payload(), &granted()),
    )
    .await;
    assert!(attempt.is_err());
    assert!(radio.advertised().is_some());
    assert_eq!(manager.state(), SessionState::Idle);

    assert_ok!(manager.stop_advertise().await);
    assert!(radio.advertised().is_none());
    assert_eq!(manager.state(), SessionState::Idle);

    assert_ok!(manager.request_advertise(payload(), &granted()).await);
    assert_eq!(manager.state(), SessionState::Advertising);
}

#[tokio::test(start_paused = true)]
async fn test_advertise_abandoned_after_radio_applied_does_not_block_restart() {
    let (manager, radio) = late_ack_setup(Duration::from_secs(5));

    let attempt = tokio::time::timeout(
        Duration::from_secs(1),
        manager.request_advertise(payload(), &granted()),
    )
    .await;
    assert!(attempt.is_err());

    assert_ok!(manager.request_advertise(payload(), &granted()).await);
    assert_eq!(manager.state(), SessionState::Advertising);
    assert_eq!(radio.advertised().unwrap(), manager.advertisement_data().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_scan_abandoned_after_radio_applied_is_stopped_before_advertising() {
    let (manager, radio) = late_ack_setup(Duration::from_secs(5));

    let attempt =
        tokio::time::timeout(Duration::from_secs(1), manager.request_scan(&granted(), None)).await;
    assert!(attempt.is_err());
    assert!(radio.is_scanning());
    assert_eq!(manager.state(), SessionState::Idle);

    assert_ok!(manager.request_advertise(payload(), &granted()).await);
    assert!(!radio.is_scanning());
    assert_eq!(manager.state(), SessionState::Advertising);
}

#[tokio::test(start_paused = true)]
async fn test_scan_abandoned_after_radio_applied_can_be_stopped() {
    let (manager, radio) = late_ack_setup(Duration::from_secs(5));

    let attempt =
        tokio::time::timeout(Duration::from_secs(1), manager.request_scan(&granted(), None)).await;
    assert!(attempt.is_err());

    assert_ok!(manager.stop_scan().await);
    assert!(!radio.is_scanning());
    assert_ok!(manager.stop_scan().await);
    assert_eq!(
        radio
            .calls()
            .iter()
            .filter(|call| matches!(call, RadioCall::StopScan))
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_update_is_resent() {
    let (manager, radio) = late_ack_setup(Duration::from_secs(5));
    assert_ok!(manager.request_advertise(payload(), &granted()).await);

    let attempt = tokio::time::timeout(
        Duration::from_secs(1),
        manager.update_advertising_data(false),
    )
    .await;
    assert!(attempt.is_err());
    assert!(manager.payload().unwrap().data_enabled);
    let frame = || hex::encode_upper(radio.advertised().unwrap().manufacturer_data);
    assert_eq!(frame(), DEFAULT_OFF_FRAME);

    assert_ok!(manager.update_advertising_data(true).await);
    assert_eq!(frame(), DEFAULT_ON_FRAME);
    assert_eq!(radio.advertised().unwrap(), manager.advertisement_data().unwrap());
}

#[tokio::test]
async fn test_oversized_legacy_advertisement_never_reaches_radio() {
    let mut config = Config::default();
    config.advertising.parameters.legacy_mode = true;
    let radio = Arc::new(SimulatedRadio::new());
    let manager = assert_ok!(SessionManager::from_config(radio.clone(), &config));

    let err = manager
        .request_advertise(AdvertisementPayload::new("x".repeat(29)), &granted())
        .await
        .unwrap_err();

    assert!(matches!(err, BeaconError::InvalidPayload(_)));
    assert_eq!(radio.call_count(), 0);
    assert_eq!(manager.state(), SessionState::Idle);
}
