use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::settings::{CameraSetting, SettingValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// How long to wait for the next image; 0 waits forever.
    pub grab_timeout_ms: u64,
    /// Node writes applied in order after the device is initialized.
    pub settings: Vec<CameraSetting>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            grab_timeout_ms: 2000,
            settings: vec![CameraSetting::enumeration("AcquisitionMode", "Continuous")],
        }
    }
}

impl CameraConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grab_timeout_ms(mut self, grab_timeout_ms: u64) -> Self {
        self.grab_timeout_ms = grab_timeout_ms;
        self
    }

    pub fn with_setting(mut self, setting: CameraSetting) -> Self {
        self.settings.push(setting);
        self
    }

    pub fn grab_timeout(&self) -> Option<Duration> {
        match self.grab_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for setting in &self.settings {
            if setting.name.trim().is_empty() {
                return Err("Setting names cannot be empty".to_string());
            }
            match &setting.value {
                SettingValue::Enum(entry) if entry.trim().is_empty() => {
                    return Err(format!("Enumeration entry for {} cannot be empty", setting.name));
                }
                SettingValue::Float(value) if !value.is_finite() => {
                    return Err(format!("Value for {} must be finite", setting.name));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CameraConfig::default();
        assert_eq!(config.grab_timeout_ms, 2000);
        assert_eq!(config.grab_timeout(), Some(Duration::from_millis(2000)));
        assert_eq!(
            config.settings,
            vec![CameraSetting::enumeration("AcquisitionMode", "Continuous")]
        );
    }

    #[test]
    fn test_config_builder() {
        let config = CameraConfig::new()
            .with_grab_timeout_ms(0)
            .with_setting(CameraSetting::float("ExposureTime", 5000.0));

        assert_eq!(config.grab_timeout(), None);
        assert_eq!(config.settings.len(), 2);
        assert_eq!(config.settings[1], CameraSetting::float("ExposureTime", 5000.0));
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(CameraConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_config() {
        let config = CameraConfig::new().with_setting(CameraSetting::int(" ", 1));
        assert!(config.validate().is_err());

        let config = CameraConfig::new().with_setting(CameraSetting::enumeration("ExposureAuto", ""));
        assert!(config.validate().is_err());

        let config = CameraConfig::new().with_setting(CameraSetting::float("Gain", f64::NAN));
        assert!(config.validate().is_err());
    }
}
