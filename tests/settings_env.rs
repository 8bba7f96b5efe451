mod support;

use quicknotes_lib::infra::settings::{self, AppSettings, SUPABASE_ANON_KEY_ENV, SUPABASE_URL_ENV};
use quicknotes_lib::app_paths::{self, DATA_DIR_ENV};

#[test]
fn data_dir_override_and_first_run_defaults() {
    let mut env = support::TestEnv::new();
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path().join("qn");
    env.set_var(DATA_DIR_ENV, &data_dir);
    env.remove_var(SUPABASE_URL_ENV);
    env.remove_var(SUPABASE_ANON_KEY_ENV);

    let resolved = app_paths::app_data_dir().expect("data dir");
    assert_eq!(resolved, data_dir);
    assert!(resolved.is_dir());

    let loaded = settings::read(&resolved).expect("read");
    assert_eq!(loaded, AppSettings::default());
    assert!(app_paths::settings_path(&resolved).exists());
}

#[test]
fn env_overrides_apply_without_being_persisted() {
    let mut env = support::TestEnv::new();
    let dir = tempfile::tempdir().expect("tempdir");
    settings::write(
        dir.path(),
        &AppSettings {
            supabase_url: "https://file.supabase.co".to_string(),
            supabase_anon_key: "file-key".to_string(),
            ..AppSettings::default()
        },
    )
    .expect("write");
    env.set_var(SUPABASE_URL_ENV, "https://env.supabase.co");
    env.set_var(SUPABASE_ANON_KEY_ENV, " env-key ");

    let loaded = settings::read(dir.path()).expect("read");
    assert_eq!(loaded.supabase_url, "https://env.supabase.co");
    assert_eq!(loaded.supabase_anon_key, "env-key");
    loaded.require_backend().expect("backend configured");

    let on_disk = std::fs::read_to_string(app_paths::settings_path(dir.path())).expect("read file");
    assert!(on_disk.contains("https://file.supabase.co"));
    assert!(!on_disk.contains("env-key"));
}
