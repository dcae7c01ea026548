use crate::error::{AlertError, Result};
use crate::notification::NotificationSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the backing store address.
pub const STORE_ADDRESS_ENV: &str = "QDB_ADDR";

pub const DEFAULT_STORE_ADDRESS: &str = "redis:6379";

// ---------------------------------------------------------------------------
// TriggerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    #[serde(default = "default_trigger_type")]
    pub entity_type: String,
    #[serde(default = "default_trigger_field")]
    pub field: String,
}

fn default_trigger_type() -> String {
    "AlertController".to_string()
}

fn default_trigger_field() -> String {
    "SendTrigger".to_string()
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            entity_type: default_trigger_type(),
            field: default_trigger_field(),
        }
    }
}

// ---------------------------------------------------------------------------
// ActuatorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActuatorConfig {
    #[serde(default = "default_tts_type")]
    pub tts_entity_type: String,
    #[serde(default = "default_email_type")]
    pub email_entity_type: String,
}

fn default_tts_type() -> String {
    "AudioController".to_string()
}

fn default_email_type() -> String {
    "SmtpController".to_string()
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            tts_entity_type: default_tts_type(),
            email_entity_type: default_email_type(),
        }
    }
}

// ---------------------------------------------------------------------------
// AlertConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertConfig {
    #[serde(default = "default_store_address")]
    pub store_address: String,
    #[serde(default)]
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub actuators: ActuatorConfig,
}

fn default_store_address() -> String {
    DEFAULT_STORE_ADDRESS.to_string()
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            store_address: default_store_address(),
            trigger: TriggerConfig::default(),
            actuators: ActuatorConfig::default(),
        }
    }
}

impl AlertConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: AlertConfig = serde_yaml::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise start from defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// An explicit address (flag or env) replaces whatever the file said.
    /// A blank override is treated as absent.
    pub fn with_store_address(mut self, address: Option<&str>) -> Self {
        if let Some(addr) = address.map(str::trim).filter(|a| !a.is_empty()) {
            self.store_address = addr.to_string();
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("store_address", &self.store_address),
            ("trigger.entity_type", &self.trigger.entity_type),
            ("trigger.field", &self.trigger.field),
            ("actuators.tts_entity_type", &self.actuators.tts_entity_type),
            (
                "actuators.email_entity_type",
                &self.actuators.email_entity_type,
            ),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(AlertError::Config(format!("{key} must not be blank")));
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> Result<NotificationSchema> {
        Ok(NotificationSchema::alert_trigger(
            &self.trigger.entity_type,
            &self.trigger.field,
        )?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_alert_controller_deployment() {
        let config = AlertConfig::default();
        assert_eq!(config.store_address, "redis:6379");
        assert_eq!(config.trigger.entity_type, "AlertController");
        assert_eq!(config.trigger.field, "SendTrigger");
        assert_eq!(config.actuators.tts_entity_type, "AudioController");
        assert_eq!(config.actuators.email_entity_type, "SmtpController");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alert.yaml");
        std::fs::write(&path, "store_address: qdb:7000\nactuators:\n  tts_entity_type: Speaker\n")
            .unwrap();
        let config = AlertConfig::load(&path).unwrap();
        assert_eq!(config.store_address, "qdb:7000");
        assert_eq!(config.actuators.tts_entity_type, "Speaker");
        assert_eq!(config.actuators.email_entity_type, "SmtpController");
        assert_eq!(config.trigger, TriggerConfig::default());
    }

    #[test]
    fn unknown_keys_rejected() {
        let result = serde_yaml::from_str::<AlertConfig>("store_adress: x\n");
        assert!(result.is_err(), "typo in key should be rejected");
    }

    #[test]
    fn blank_values_rejected_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alert.yaml");
        std::fs::write(&path, "trigger:\n  field: \"\"\n").unwrap();
        let err = AlertConfig::load(&path).unwrap_err();
        assert!(matches!(err, AlertError::Config(_)));
    }

    #[test]
    fn explicit_address_overrides_file() {
        let config = AlertConfig::default().with_store_address(Some("10.0.0.5:6379"));
        assert_eq!(config.store_address, "10.0.0.5:6379");
        let config = AlertConfig::default().with_store_address(Some("  "));
        assert_eq!(config.store_address, DEFAULT_STORE_ADDRESS);
        let config = AlertConfig::default().with_store_address(None);
        assert_eq!(config.store_address, DEFAULT_STORE_ADDRESS);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = AlertConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, AlertError::Io(_)));
    }
}
