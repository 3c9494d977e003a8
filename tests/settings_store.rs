use std::fs;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use disconnect_monitor::detector::AlertTiming;
use disconnect_monitor::settings::{MonitorSettings, SettingsStore, TriggerSettings};
use tempfile::tempdir;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_VARS: &[&str] = &["DCMON_INTERVAL_SECS", "DCMON_SENSITIVITY", "DCMON_WEBHOOK_URL"];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

/// Push the file's mtime forward so refresh sees a change even on
/// filesystems with coarse timestamps.
fn touch_later(path: &std::path::Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}

#[test]
fn missing_file_yields_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();

    let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
    let settings = store.snapshot();
    assert_eq!(settings, MonitorSettings::default());
    assert_eq!(settings.check_interval_seconds, 5);
    assert!((settings.sensitivity_threshold - 0.7).abs() < f32::EPSILON);
    assert!(settings.destinations().is_empty());
    assert!(!store.refresh().unwrap());
}

#[test]
fn file_values_are_parsed_and_clamped() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(
        &path,
        r#"{
            "checkIntervalSeconds": 2,
            "sensitivityThreshold": 0.55,
            "focusMode": true,
            "trigger": {"url": "https://notify.example/push", "id": "abc"},
            "alertTiming": {"confirmationWindowSecs": 20}
        }"#,
    )
    .unwrap();

    let settings = SettingsStore::new(path).unwrap().snapshot();
    assert_eq!(settings.check_interval_seconds, 5);
    assert!((settings.sensitivity_threshold - 0.55).abs() < f32::EPSILON);
    assert!(settings.focus_mode);
    assert_eq!(
        settings.trigger,
        Some(TriggerSettings {
            url: "https://notify.example/push".into(),
            id: "abc".into()
        })
    );
    assert_eq!(
        settings.alert_timing,
        AlertTiming {
            confirmation_window_secs: 20,
            ..AlertTiming::default()
        }
    );
}

#[test]
fn malformed_file_at_startup_falls_back_to_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, "{ not json").unwrap();

    let store = SettingsStore::new(path).unwrap();
    assert_eq!(store.snapshot(), MonitorSettings::default());
}

#[test]
fn refresh_picks_up_edits_and_keeps_previous_on_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, r#"{"checkIntervalSeconds": 10}"#).unwrap();
    let store = SettingsStore::new(path.clone()).unwrap();
    assert_eq!(store.snapshot().check_interval_seconds, 10);
    assert!(!store.refresh().unwrap());

    fs::write(&path, r#"{"checkIntervalSeconds": 30, "localAudioEnabled": true}"#).unwrap();
    touch_later(&path, 5);
    assert!(store.refresh().unwrap());
    let settings = store.snapshot();
    assert_eq!(settings.check_interval_seconds, 30);
    assert!(settings.local_audio_enabled);

    fs::write(&path, "{ broken").unwrap();
    touch_later(&path, 10);
    assert!(store.refresh().is_err());
    assert_eq!(store.snapshot().check_interval_seconds, 30);
    // The broken revision is not retried until the file changes again.
    assert!(!store.refresh().unwrap());
}

#[test]
fn update_persists_normalized_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let store = SettingsStore::new(path.clone()).unwrap();

    let saved = store
        .update(MonitorSettings {
            check_interval_seconds: 600,
            sensitivity_threshold: 0.9,
            ..MonitorSettings::default()
        })
        .unwrap();
    assert_eq!(saved.check_interval_seconds, 60);

    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk["checkIntervalSeconds"], 60);
    assert!(!store.refresh().unwrap());

    let reopened = SettingsStore::new(path).unwrap();
    assert_eq!(reopened.snapshot(), saved);
}

#[test]
fn env_overrides_apply_on_load() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, r#"{"checkIntervalSeconds": 10, "sensitivityThreshold": 0.5}"#).unwrap();

    std::env::set_var("DCMON_INTERVAL_SECS", "20");
    std::env::set_var("DCMON_SENSITIVITY", "not-a-number");
    std::env::set_var("DCMON_WEBHOOK_URL", "https://hooks.example/env");
    let settings = SettingsStore::new(path).unwrap().snapshot();
    clear_env();

    assert_eq!(settings.check_interval_seconds, 20);
    assert!((settings.sensitivity_threshold - 0.5).abs() < f32::EPSILON);
    assert_eq!(
        settings.webhook.map(|w| w.url).as_deref(),
        Some("https://hooks.example/env")
    );
}
