//! Layering of file and environment sources over the built-in defaults.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig as _;
use tempfile::TempDir;

use hmibridge_config::{Config, LogFormat, OriginScope, TimeoutDirective};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` on edition 2024; the override is
        // restored in `Drop` while the mutex is still held.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

fn write_config(dir: &TempDir, contents: &str) -> OsString {
    let path = dir.path().join("hmibridge.toml");
    fs::write(&path, contents).expect("write config file");
    path.into_os_string()
}

#[test]
fn file_layer_sets_timeouts_and_overrides() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = write_config(
        &temp_dir,
        r#"
log_format = "compact"
request_timeout_ms = 2500
timeout_overrides = [
    { origin = "hmi", verb = "SDL.GetListOfPermissions", timeout_ms = 5000 },
]
"#,
    );
    let _env = EnvOverride::set_var("HMIBRIDGE_CONFIG_PATH", &path);

    let config = Config::load_from_iter([OsString::from("hmibridged")]).expect("config loads");

    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.request_timeout(), Duration::from_millis(2500));
    assert_eq!(
        config.timeout_overrides(),
        &[TimeoutDirective::new(
            OriginScope::Hmi,
            "SDL.GetListOfPermissions",
            5000
        )]
    );
}

#[test]
fn environment_sets_sweep_interval() {
    let _env = EnvOverride::set_var("HMIBRIDGE_SWEEP_INTERVAL_MS", OsStr::new("40"));
    let config = Config::load_from_iter([OsString::from("hmibridged")]).expect("config loads");

    assert_eq!(config.sweep_interval(), Duration::from_millis(40));
}

#[test]
fn malformed_file_is_reported() {
    let temp_dir = TempDir::new().expect("create temp dir");
    let path = write_config(&temp_dir, "request_timeout_ms = \"soon\"\n");
    let _env = EnvOverride::set_var("HMIBRIDGE_CONFIG_PATH", &path);

    let result = Config::load_from_iter([OsString::from("hmibridged")]);

    assert!(result.is_err(), "malformed file should fail to load");
}
