use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine::{HandoffMode, SimulationConfig};
use thiserror::Error;

pub(crate) const CONFIG_FILE_NAME: &str = "simulation.json";
pub(crate) const HANDOFF_ENV_VAR: &str = "SCROLLER_HANDOFF";

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config '{path}' at {field}: {source}")]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{var} must be 'mailbox' or 'locked', got '{value}'")]
    InvalidHandoff { var: &'static str, value: String },
}

pub(crate) fn load_simulation_config(path: &Path) -> Result<SimulationConfig, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == io::ErrorKind::NotFound => {
            return Ok(SimulationConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse_simulation_config(path, &raw)
}

fn parse_simulation_config(path: &Path, raw: &str) -> Result<SimulationConfig, ConfigError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, SimulationConfig>(&mut deserializer).map_err(|error| {
        let field = match error.path().to_string() {
            field if field.is_empty() || field == "." => "<root>".to_string(),
            field => field,
        };
        ConfigError::Parse {
            path: path.to_path_buf(),
            field,
            source: error.into_inner(),
        }
    })
}

pub(crate) fn apply_handoff_override(
    mut config: SimulationConfig,
    raw: Option<&str>,
) -> Result<SimulationConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(config);
    };
    config.handoff = HandoffMode::parse(raw).ok_or_else(|| ConfigError::InvalidHandoff {
        var: HANDOFF_ENV_VAR,
        value: raw.to_string(),
    })?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use engine::Size;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = TempDir::new().expect("temp");
        let config =
            load_simulation_config(&temp.path().join(CONFIG_FILE_NAME)).expect("defaults");
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"{ "tick_period_ms": 16, "viewport": { "w": 800, "h": 600 }, "handoff": "locked" }"#,
        )
        .expect("write");

        let config = load_simulation_config(&path).expect("config");
        assert_eq!(config.tick_period_ms, 16);
        assert_eq!(config.viewport, Size { w: 800, h: 600 });
        assert_eq!(config.handoff, HandoffMode::LockedSnapshot);
        assert_eq!(config.speed, SimulationConfig::default().speed);
    }

    #[test]
    fn malformed_field_reports_its_path() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "viewport": { "w": "wide", "h": 600 } }"#).expect("write");

        let err = load_simulation_config(&path).expect_err("parse error");
        match err {
            ConfigError::Parse { field, .. } => assert_eq!(field, "viewport.w"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn key_bindings_can_be_rebound() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "key_bindings": { "up": [12] } }"#).expect("write");

        let config = load_simulation_config(&path).expect("config");
        assert_eq!(config.key_bindings.up, vec![12]);
        assert_eq!(
            config.key_bindings.down,
            SimulationConfig::default().key_bindings.down
        );
    }

    #[test]
    fn handoff_override_accepts_known_modes() {
        let config = apply_handoff_override(SimulationConfig::default(), Some("locked"))
            .expect("override");
        assert_eq!(config.handoff, HandoffMode::LockedSnapshot);

        let config = apply_handoff_override(config, None).expect("no override");
        assert_eq!(config.handoff, HandoffMode::LockedSnapshot);
    }

    #[test]
    fn handoff_override_rejects_unknown_modes() {
        let err = apply_handoff_override(SimulationConfig::default(), Some("ring"))
            .expect_err("invalid");
        assert!(matches!(err, ConfigError::InvalidHandoff { .. }));
    }
}
