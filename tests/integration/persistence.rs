#[path = "common/mod.rs"]
mod common;

use std::{fs, path::Path};

use botpool::{
    activity::ActivityLog, config::load_settings, record::RunState, store::SlotStore,
};
use common::{HomeEnvGuard, fake_pool, fast_settings};
use serde_json::Value;
use tempfile::tempdir;

#[test]
fn configuration_round_trips_through_the_store() {
    let temp = tempdir().unwrap();
    let settings = fast_settings(temp.path(), 4);

    {
        let fake = fake_pool(&settings, Some(SlotStore::new(settings.slot_store_path())));
        fake.pool.configure(0, Path::new("/bots/alpha.bat")).unwrap();
        fake.pool.configure(3, Path::new("/bots/delta.sh")).unwrap();
        fake.pool.rename(3, "Delta").unwrap();
    }

    let stored: Value =
        serde_json::from_str(&fs::read_to_string(settings.slot_store_path()).unwrap()).unwrap();
    let slots = stored.as_array().unwrap();
    assert_eq!(slots.len(), 4);
    assert_eq!(slots[0]["path"], "/bots/alpha.bat");
    assert_eq!(slots[0]["name"], "alpha.bat");
    assert!(slots[1].is_null());
    assert_eq!(slots[3]["name"], "Delta");

    let reloaded = fake_pool(&settings, Some(SlotStore::new(settings.slot_store_path())));
    let records = reloaded.pool.snapshots().unwrap();
    assert_eq!(
        records[3].executable_path(),
        Some(Path::new("/bots/delta.sh"))
    );
    assert_eq!(records[3].display_name(), "Delta");
    assert_eq!(records[3].run_state(), RunState::Stopped);
    assert_eq!(records[2].run_state(), RunState::Unconfigured);
}

#[test]
fn store_written_by_hand_is_hydrated() {
    let temp = tempdir().unwrap();
    let settings = fast_settings(temp.path(), 2);
    fs::write(
        settings.slot_store_path(),
        r#"[{"path": "/bots/one.sh", "name": ""}, {"path": "/bots/two.sh", "name": "Two"}]"#,
    )
    .unwrap();

    let fake = fake_pool(&settings, Some(SlotStore::new(settings.slot_store_path())));
    let records = fake.pool.snapshots().unwrap();
    assert_eq!(records[0].display_name(), "one.sh");
    assert_eq!(records[1].display_name(), "Two");
}

#[test]
fn corrupt_store_does_not_stop_the_pool() {
    let temp = tempdir().unwrap();
    let settings = fast_settings(temp.path(), 2);
    fs::write(settings.slot_store_path(), "[{\"path\": ").unwrap();

    let fake = fake_pool(&settings, Some(SlotStore::new(settings.slot_store_path())));
    assert!(fake.sink.contains("corrupt"));

    fake.pool.configure(1, Path::new("/bots/fresh.sh")).unwrap();
    let stored: Value =
        serde_json::from_str(&fs::read_to_string(settings.slot_store_path()).unwrap()).unwrap();
    assert_eq!(stored[1]["path"], "/bots/fresh.sh");
}

#[test]
fn activity_log_accumulates_events() {
    let temp = tempdir().unwrap();
    let log = ActivityLog::new(temp.path().join("activity_log.json"));

    log.append("Added file /bots/a.sh for bot 1").unwrap();
    log.append("Started bot 1").unwrap();
    log.append("Stopped bot 1").unwrap();

    let messages: Vec<_> = log.entries().unwrap().into_iter().map(|(_, m)| m).collect();
    assert_eq!(messages.len(), 3);
    assert!(messages.contains(&"Started bot 1".to_string()));

    let raw: Value =
        serde_json::from_str(&fs::read_to_string(log.path()).unwrap()).unwrap();
    assert_eq!(raw.as_object().unwrap().len(), 3);
}

#[test]
fn default_state_dir_lives_under_home() {
    let temp = tempdir().unwrap();
    let home = temp.path().join("home");
    fs::create_dir_all(&home).unwrap();
    let _home = HomeEnvGuard::set(&home);

    let settings = load_settings(None).unwrap();
    assert_eq!(settings.state_dir, home.join(".local/share/botpool"));
    assert_eq!(
        settings.slot_store_path(),
        home.join(".local/share/botpool/bot_paths.json")
    );
}

#[test]
fn settings_file_in_config_dir_is_found() {
    let temp = tempdir().unwrap();
    let home = temp.path().join("home");
    let config_dir = home.join(".config/botpool");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("botpool.yaml"), "slots: 3\ntoken_prefix: farm\n").unwrap();
    let _home = HomeEnvGuard::set(&home);

    let settings = load_settings(None).unwrap();
    assert_eq!(settings.slots, 3);
    assert_eq!(settings.token_for(2), "farm-3");
}
