mod common;

use std::{sync::Arc, time::Duration};

use common::{MockDevice, Step};
use taptpos::{
    config::{keys, ConfigStore, MemoryStore},
    dispatch::{DispatchError, DispatchOptions, Dispatcher, UNKNOWN_INTENT_ID},
    reader::DeviceError,
    ws::{PaymentEvent, PaymentRequest},
};

fn request(id: &str) -> PaymentRequest {
    PaymentEvent::decode(&format!(
        r#"{{"payment_intent_id":"{id}","client_secret":"{id}_secret_abc","amount":500,"currency":"usd"}}"#,
        id = id
    ))
    .into_request()
    .unwrap()
}

fn dispatcher(device: MockDevice) -> (Dispatcher, Arc<MockDevice>) {
    let device = Arc::new(device);
    let (dispatcher, _outcomes) = Dispatcher::new(
        device.clone(),
        common::paired_store("pay.example.com"),
        DispatchOptions::default(),
    );
    (dispatcher, device)
}

#[tokio::test]
async fn test_collect_settles_intent_id() {
    common::init_log();

    let (dispatcher, device) = dispatcher(MockDevice::already_connected());

    let settled = dispatcher.collect(&request("pi_1")).await.unwrap();

    assert_eq!(settled, "pi_1");
    assert_eq!(device.calls(), ["retrieve", "collect", "confirm"]);
}

#[tokio::test]
async fn test_step_failure_is_tagged_and_not_retried() {
    common::init_log();

    for (step, tag, calls) in [
        (Step::Retrieve, "retrieve-failed", vec!["retrieve"]),
        (Step::Collect, "collect-failed", vec!["retrieve", "collect"]),
        (
            Step::Confirm,
            "confirm-failed",
            vec!["retrieve", "collect", "confirm"],
        ),
    ] {
        let (dispatcher, device) = dispatcher(
            MockDevice::already_connected().fail_at(step, DeviceError::new("DECLINED", "no")),
        );

        let err = dispatcher.collect(&request("pi_1")).await.unwrap_err();

        assert_eq!(err.tag(), tag);
        assert!(err.to_string().contains("[DECLINED]: no"), "{}", err);
        assert_eq!(device.calls(), calls);
    }
}

#[tokio::test]
async fn test_confirmed_intent_without_id() {
    common::init_log();

    let (dispatcher, _device) = dispatcher(MockDevice::already_connected().confirm_without_id());

    let settled = dispatcher.collect(&request("pi_1")).await.unwrap();

    assert_eq!(settled, UNKNOWN_INTENT_ID);
}

#[tokio::test]
async fn test_incomplete_config_is_refused() {
    common::init_log();

    let device = Arc::new(MockDevice::already_connected());
    let store = MemoryStore::default();
    store.set(keys::ORIGIN, "pay.example.com".into()).unwrap();

    let (dispatcher, _outcomes) =
        Dispatcher::new(device.clone(), Arc::new(store), DispatchOptions::default());

    let err = dispatcher.collect(&request("pi_1")).await.unwrap_err();

    assert!(matches!(err, DispatchError::ConfigIncomplete));
    assert!(device.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_reader_is_device_not_ready() {
    common::init_log();

    let (dispatcher, device) = dispatcher(MockDevice::default().keep_discovery_open());

    let err = dispatcher.collect(&request("pi_1")).await.unwrap_err();

    assert_eq!(err.tag(), "device-not-ready");
    assert!(err.to_string().contains("unreachable device"));
    assert_eq!(device.count("retrieve"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_drops_overlapping_events() {
    common::init_log();

    let device = Arc::new(MockDevice::already_connected());
    let (dispatcher, mut outcomes) = Dispatcher::new(
        device.clone(),
        common::paired_store("pay.example.com"),
        DispatchOptions::default(),
    );

    assert!(dispatcher.dispatch(request("pi_1")));
    assert!(!dispatcher.dispatch(request("pi_2")));
    assert!(dispatcher.gate().is_busy());

    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.payment_intent_id, "pi_1");
    assert_eq!(outcome.result.unwrap(), "pi_1");

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(dispatcher.dispatch(request("pi_3")));
    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.result.unwrap(), "pi_3");

    assert_eq!(device.count("confirm"), 2);
}
