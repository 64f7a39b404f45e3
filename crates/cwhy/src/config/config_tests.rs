use super::*;
use serial_test::serial;

const VARS: &[&str] = &[
    "CWHY_CONTEXT_LINES",
    "CWHY_BYTE_BUDGET",
    "CWHY_FIXTURES_DIR",
    "CWHY_JOBS",
];

fn clear_env() {
    for var in VARS {
        unsafe {
            std::env::remove_var(var);
        }
    }
}

#[test]
fn test_bundle_settings_default() {
    let settings = BundleSettings::default();
    assert_eq!(settings.context_lines, 3);
    assert_eq!(settings.byte_budget, 16 * 1024);
}

#[test]
#[serial]
fn test_from_env_without_overrides_is_default_settings() {
    clear_env();

    let config = Config::from_env();
    assert_eq!(config.settings, BundleSettings::default());
    assert_eq!(config.fixtures_dir, PathBuf::from("tests/.regression"));
    assert!(config.jobs >= 1);
}

#[test]
#[serial]
fn test_from_env_reads_overrides() {
    clear_env();
    unsafe {
        std::env::set_var("CWHY_CONTEXT_LINES", "5");
        std::env::set_var("CWHY_BYTE_BUDGET", " 2048 ");
        std::env::set_var("CWHY_FIXTURES_DIR", "/tmp/cwhy-fixtures");
        std::env::set_var("CWHY_JOBS", "2");
    }

    let config = Config::from_env();
    assert_eq!(config.settings.context_lines, 5);
    assert_eq!(config.settings.byte_budget, 2048);
    assert_eq!(config.fixtures_dir, PathBuf::from("/tmp/cwhy-fixtures"));
    assert_eq!(config.jobs, 2);

    clear_env();
}

#[test]
#[serial]
fn test_from_env_ignores_garbage() {
    clear_env();
    unsafe {
        std::env::set_var("CWHY_CONTEXT_LINES", "many");
        std::env::set_var("CWHY_BYTE_BUDGET", "-1");
    }

    let config = Config::from_env();
    assert_eq!(config.settings, BundleSettings::default());

    clear_env();
}

#[test]
#[serial]
fn test_from_env_clamps_zero_jobs() {
    clear_env();
    unsafe {
        std::env::set_var("CWHY_JOBS", "0");
    }

    assert_eq!(Config::from_env().jobs, 1);

    clear_env();
}
