//! Configuration loading
//!
//! TOML is tried first, the postcard binary image second. When neither is
//! available the built-in defaults are used.

use super::types::{ConfigError, TrainConfig};

#[cfg(feature = "serde")]
use super::types::CONFIG_VERSION;

impl TrainConfig {
    /// Parse a TOML document
    ///
    /// Missing keys keep their defaults:
    ///
    /// ```toml
    /// [ramp]
    /// acceleration = 0.02
    ///
    /// [reconcile]
    /// delay_ms = 400
    /// ```
    #[cfg(feature = "toml")]
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: TrainConfig = toml::from_str(input).map_err(|_| {
            warn!("TOML parse error");
            ConfigError::TomlParse
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Decode a postcard binary image
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: TrainConfig =
            postcard::from_bytes(bytes).map_err(|_| ConfigError::Deserialize)?;

        if config.version != CONFIG_VERSION {
            warn!(
                "Config version mismatch: found {}, expected {}",
                config.version,
                CONFIG_VERSION
            );
            return Err(ConfigError::VersionMismatch);
        }

        config.validate()?;
        Ok(config)
    }

    /// Encode as a postcard binary image into `buf`
    ///
    /// Returns the used part of `buf`.
    #[cfg(feature = "serde")]
    pub fn to_bytes<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], ConfigError> {
        postcard::to_slice(self, buf).map_err(|_| ConfigError::Serialize)
    }
}

/// Load configuration from whatever sources are available
///
/// Tries `toml_input` first and falls back to the `binary` image. With neither
/// source present the defaults are returned.
pub fn load_config(toml_input: Option<&str>, binary: Option<&[u8]>) -> Result<TrainConfig, ConfigError> {
    #[allow(unused_mut)]
    let mut last_error = None;

    #[cfg(feature = "toml")]
    if let Some(input) = toml_input {
        match TrainConfig::from_toml(input) {
            Ok(config) => {
                info!("Loaded configuration from TOML");
                log_config_summary(&config);
                return Ok(config);
            }
            Err(e) => {
                warn!("Failed to load TOML config: {}, trying binary", e);
                last_error = Some(e);
            }
        }
    }
    #[cfg(not(feature = "toml"))]
    if toml_input.is_some() {
        warn!("TOML support not enabled, ignoring TOML config");
    }

    #[cfg(feature = "serde")]
    if let Some(bytes) = binary {
        let config = TrainConfig::from_bytes(bytes)?;
        info!("Loaded configuration from binary image");
        log_config_summary(&config);
        return Ok(config);
    }
    #[cfg(not(feature = "serde"))]
    if binary.is_some() {
        warn!("Binary config support not enabled, ignoring image");
    }

    match last_error {
        Some(e) => Err(e),
        None => {
            info!("No stored configuration, using defaults");
            Ok(TrainConfig::default())
        }
    }
}

fn log_config_summary(config: &TrainConfig) {
    debug!(
        "Config: tolerance={} accel={} decel={} delay={}ms",
        config.sync.tolerance,
        config.ramp.acceleration,
        config.ramp.deceleration,
        config.reconcile.delay_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_sources_gives_defaults() {
        assert_eq!(load_config(None, None), Ok(TrainConfig::default()));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_binary_image() {
        let mut config = TrainConfig::default();
        config.ramp.acceleration = 0.03;
        config.reconcile.delay_ms = 450;

        let mut buf = [0u8; 128];
        let used = config.to_bytes(&mut buf).unwrap().len();

        assert_eq!(load_config(None, Some(&buf[..used])), Ok(config));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_binary_version_mismatch() {
        let mut config = TrainConfig::default();
        config.version = CONFIG_VERSION + 1;

        let mut buf = [0u8; 128];
        let used = config.to_bytes(&mut buf).unwrap().len();

        assert_eq!(
            TrainConfig::from_bytes(&buf[..used]),
            Err(ConfigError::VersionMismatch)
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_buffer_too_small() {
        let mut buf = [0u8; 2];
        assert_eq!(
            TrainConfig::default().to_bytes(&mut buf),
            Err(ConfigError::Serialize)
        );
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_partial_toml() {
        let input = r#"
            [ramp]
            acceleration = 0.02

            [reconcile]
            delay_ms = 400
        "#;

        let config = TrainConfig::from_toml(input).unwrap();
        assert_eq!(config.ramp.acceleration, 0.02);
        assert_eq!(config.ramp.deceleration, crate::config::DEFAULT_DECELERATION);
        assert_eq!(config.reconcile.delay_ms, 400);
        assert_eq!(config.reconcile.step_threshold, 3);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_falls_back_to_binary() {
        let mut config = TrainConfig::default();
        config.sync.tolerance = 0.004;

        let mut buf = [0u8; 128];
        let used = config.to_bytes(&mut buf).unwrap().len();

        let loaded = load_config(Some("ramp = ["), Some(&buf[..used])).unwrap();
        assert_eq!(loaded.sync.tolerance, 0.004);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_invalid_toml_values() {
        let input = "[ramp]\nacceleration = -0.5\n";
        assert_eq!(TrainConfig::from_toml(input), Err(ConfigError::Invalid));
        assert_eq!(load_config(Some(input), None), Err(ConfigError::Invalid));
    }
}
