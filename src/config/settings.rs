//! Application settings loading from config.toml
//!
//! Every field has a default, so an empty file (or none at all when using the
//! default location) yields a configuration that matches the canteen's
//! current deployment, with three windows and the guest department 219.

use crate::entities::Window;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Address the terminal API binds to
    pub listen_addr: String,
    /// Relational database URL; `DATABASE_URL` overrides it
    pub database_url: Option<String>,
    /// Redis URL; `REDIS_URL` overrides it
    pub redis_url: String,
    /// Upper bound for a single swipe, in milliseconds
    pub request_timeout_ms: u64,
    /// Departments that always dine as walk-ins (guests, visitors)
    pub privileged_dept_ids: Vec<i64>,
    /// Meal id reported when no window assignment is known
    pub default_meal_id: i64,
    /// User id recorded on generated weekly slots
    pub setmeal_creator_id: i64,
    /// Terminal device id to serving window
    pub devices: HashMap<String, Window>,
    /// Cron rules for the scheduled maintainers
    pub schedule: ScheduleConfig,
    /// Operating license location and verification key
    pub license: LicenseConfig,
}

/// Cron rules (`sec min hour day-of-month month day-of-week`), local time.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Nightly expiration of unclaimed reservations
    pub expire_orders: String,
    /// Weekly generation of next week's slot skeleton
    pub generate_week: String,
    /// Daily meal-slot cache refresh
    pub refresh_meal_cache: String,
    /// Daily license re-validation
    pub license_check: String,
}

/// Where the license artifact lives and which key signs it.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LicenseConfig {
    /// Path to the JSON license file
    pub path: String,
    /// Base64-encoded ed25519 public key
    pub public_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let devices = [
            ("0180800116", Window::A),
            ("0127448632", Window::B),
            ("0158577664", Window::C),
        ]
        .into_iter()
        .map(|(device, window)| (device.to_string(), window))
        .collect();

        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            request_timeout_ms: 5_000,
            privileged_dept_ids: vec![219],
            default_meal_id: 1,
            setmeal_creator_id: 263,
            devices,
            schedule: ScheduleConfig::default(),
            license: LicenseConfig::default(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            expire_orders: "0 0 23 * * *".to_string(),
            generate_week: "0 0 10 * * Thu".to_string(),
            refresh_meal_cache: "0 0 5 * * *".to_string(),
            license_check: "0 0 2 * * *".to_string(),
        }
    }
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            path: "config/license.lic".to_string(),
            public_key: String::new(),
        }
    }
}

impl AppConfig {
    /// Window a terminal device is bound to, if any.
    #[must_use]
    pub fn window_for_device(&self, device_id: &str) -> Option<Window> {
        self.devices.get(device_id).copied()
    }

    /// Whether card-holders of this department skip reservation checks.
    #[must_use]
    pub fn is_privileged(&self, dept_id: i64) -> bool {
        self.privileged_dept_ids.contains(&dept_id)
    }

    /// Deadline for a single swipe.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.redis_url = url;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = Some(url);
        }
    }
}

/// Loads application settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A window label is not one of `A`, `B`, `C`
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    debug!("Loading configuration from {:?}", path.as_ref());
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    let mut config = parse_config(&contents)?;
    config.apply_env_overrides();
    Ok(config)
}

fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

/// Loads settings from `CANTEEN_CONFIG` or ./config.toml, falling back to
/// defaults when the default file does not exist.
pub fn load_default_config() -> Result<AppConfig> {
    if let Ok(path) = std::env::var("CANTEEN_CONFIG") {
        return load_config(path);
    }

    let path = Path::new("config.toml");
    if path.exists() {
        load_config(path)
    } else {
        warn!("config.toml not found, using built-in defaults");
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            listen_addr = "127.0.0.1:9000"
            redis_url = "redis://cache:6379/2"
            request_timeout_ms = 2500
            privileged_dept_ids = [219, 300]
            default_meal_id = 7

            [devices]
            "D-1" = "A"
            "D-2" = "C"

            [schedule]
            expire_orders = "0 30 22 * * *"

            [license]
            path = "/etc/canteen/license.lic"
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.request_timeout(), Duration::from_millis(2500));
        assert!(config.is_privileged(300));
        assert!(!config.is_privileged(1));
        assert_eq!(config.default_meal_id, 7);
        assert_eq!(config.window_for_device("D-2"), Some(Window::C));
        assert_eq!(config.window_for_device("0180800116"), None);
        assert_eq!(config.schedule.expire_orders, "0 30 22 * * *");
        // Unset fields in a present section keep their defaults
        assert_eq!(config.schedule.generate_week, "0 0 10 * * Thu");
        assert_eq!(config.license.path, "/etc/canteen/license.lic");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.privileged_dept_ids, vec![219]);
        assert_eq!(config.default_meal_id, 1);
        assert_eq!(config.setmeal_creator_id, 263);
        assert_eq!(config.window_for_device("0127448632"), Some(Window::B));
        assert_eq!(config.devices.len(), 3);
    }

    #[test]
    fn test_unknown_window_is_rejected() {
        let result = parse_config("[devices]\n\"D-9\" = \"Z\"\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/canteen/config.toml");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "setmeal_creator_id = 42\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.setmeal_creator_id, 42);
    }
}
