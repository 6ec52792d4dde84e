use super::*;
use tempfile::tempdir;

#[test]
fn test_settings_path_layout() {
    let path = settings_path_in(Path::new("/cache"));
    assert_eq!(path, PathBuf::from("/cache/.zsearch/setting.json"));
}

#[test]
fn test_write_default_then_load() {
    let dir = tempdir().unwrap();
    let path = settings_path_in(dir.path());

    write_default_if_missing(&path).unwrap();
    assert!(path.exists());

    let settings = load_settings_from(&path).unwrap();
    assert_eq!(settings, SearchSettings::default());
}

#[test]
fn test_existing_file_is_not_overwritten() {
    let dir = tempdir().unwrap();
    let path = settings_path_in(dir.path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{"concurrency": 8, "debounce_ms": 50}"#).unwrap();

    write_default_if_missing(&path).unwrap();

    let settings = load_settings_from(&path).unwrap();
    assert_eq!(settings.concurrency, 8);
    assert_eq!(settings.debounce_ms, 50);
    assert_eq!(settings.pause_thresholds, vec![5_000, 10_000]);
}

#[test]
fn test_corrupt_file_loads_as_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("setting.json");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(load_settings_from(&path).is_none());
    assert!(load_settings_from(&dir.path().join("missing.json")).is_none());
}
