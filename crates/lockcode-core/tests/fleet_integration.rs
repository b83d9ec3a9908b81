#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! Integration tests for the fleet controller over file-backed devices.
//!
//! Builds the registry from configuration exactly as the CLI does, then
//! drives create/update/delete through the controller and checks the state
//! files.

use std::sync::Arc;
use std::time::Duration;

use lockcode_core::config::load_layers;
use lockcode_core::drivers::DefaultDriverFactory;
use lockcode_core::{CreateKeyCodeRequest, DeviceRegistry, Error, FleetController, LockCode};
use tokio_stream::StreamExt;

fn controller_for(dir: &tempfile::TempDir, capacity: u16) -> FleetController {
    let settings = dir.path().join("settings.json");
    let body = serde_json::json!({
        "engine": {"capacity": capacity},
        "fleet": {"lock_name_filter": "lock"},
        "devices": [
            {"id": 1, "name": "Front Door Lock", "driver": {"kind": "file", "path": dir.path().join("1.json")}},
            {"id": 2, "name": "Hallway Sensor", "driver": {"kind": "memory"}},
            {"id": 3, "name": "Garage Lock", "driver": {"kind": "file", "path": dir.path().join("3.json")}}
        ]
    });
    std::fs::write(&settings, body.to_string()).unwrap();

    let config = load_layers(&[settings]).unwrap();
    let factory = DefaultDriverFactory {
        io_timeout: Duration::from_secs(5),
    };
    let registry =
        DeviceRegistry::from_config(&config.devices, config.engine.limits(), &factory).unwrap();
    FleetController::new(Arc::new(registry)).with_lock_filter(config.fleet.lock_name_filter)
}

#[tokio::test]
async fn fleet_create_streams_one_result_per_lock() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = controller_for(&dir, 250);

    let mut results = fleet
        .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", None))
        .unwrap();

    let mut seen = Vec::new();
    while let Some(outcome) = results.next().await {
        assert_eq!(outcome.result.as_ref().unwrap().position, 250);
        seen.push(outcome.device.id);
    }
    assert_eq!(seen, vec![1, 3]);

    let on_disk: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("3.json")).unwrap()).unwrap();
    assert_eq!(on_disk["codes"][0]["name"], "Alice");
}

#[tokio::test]
async fn second_create_for_same_owner_conflicts_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = controller_for(&dir, 250);

    fleet
        .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", None))
        .unwrap()
        .collect_outcomes()
        .await;
    let outcomes = fleet
        .create_key_code(CreateKeyCodeRequest::new("87654321", "Alice", None))
        .unwrap()
        .collect_outcomes()
        .await;

    assert_eq!(outcomes.len(), 2);
    for outcome in outcomes {
        assert!(matches!(outcome.result, Err(Error::DuplicateOwner { .. })));
    }
}

#[tokio::test]
async fn full_device_fails_while_others_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = controller_for(&dir, 1);

    fleet
        .create_key_code(CreateKeyCodeRequest::new("11111111", "Bob", Some(1)))
        .unwrap()
        .collect_outcomes()
        .await;

    let outcomes = fleet
        .create_key_code(CreateKeyCodeRequest::new("22222222", "Carol", None))
        .unwrap()
        .collect_outcomes()
        .await;
    assert!(matches!(
        outcomes[0].result,
        Err(Error::CapacityExhausted { device_id: 1, capacity: 1 })
    ));
    assert_eq!(outcomes[1].result.as_ref().unwrap().position, 1);
}

#[tokio::test]
async fn update_then_delete_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = controller_for(&dir, 250);

    fleet
        .create_key_code(CreateKeyCodeRequest::new("12345678", "Alice", Some(3)))
        .unwrap()
        .collect_outcomes()
        .await;

    let updated = fleet.update_key_code(3, "Alice", "55556666").await.unwrap();
    assert!(updated.success);
    assert_eq!(
        fleet.list_key_codes(3).await.unwrap(),
        vec![LockCode::new("55556666", "Alice", 250)]
    );

    let deleted = fleet.delete_key_code("Alice", 3).await.unwrap();
    assert_eq!(deleted.message, "Key code deleted");
    let again = fleet.delete_key_code("Alice", 3).await.unwrap();
    assert!(again.success);
    assert_eq!(again.message, "Key code not found");
}

#[tokio::test]
async fn listing_devices_ignores_fan_out_filter() {
    let dir = tempfile::tempdir().unwrap();
    let fleet = controller_for(&dir, 250);

    assert_eq!(fleet.list_devices(None).len(), 3);
    assert_eq!(fleet.list_devices(Some("sensor")).len(), 1);
    assert_eq!(fleet.fleet_targets().len(), 2);
}
