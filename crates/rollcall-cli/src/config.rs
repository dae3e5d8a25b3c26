use std::path::{Path, PathBuf};

use rollcall_core::locator::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_NMS_THRESHOLD};
use rollcall_core::{LocatorSettings, DEFAULT_MATCH_THRESHOLD, DETECTOR_MODEL_FILE, EXTRACTOR_MODEL_FILE};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV: &str = "ROLLCALL_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// CLI configuration: defaults, then the TOML file, then `ROLLCALL_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance accepted as the same person.
    pub match_threshold: f32,
    /// Minimum SCRFD score for a face to be kept.
    pub detection_confidence: f32,
    /// IoU above which overlapping detections are suppressed.
    pub nms_threshold: f32,
}

/// Every field optional; only what is present overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    match_threshold: Option<f32>,
    detection_confidence: Option<f32>,
    nms_threshold: Option<f32>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            model_dir: data_dir.join("models"),
            db_path: data_dir.join("rollcall.db"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            detection_confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        }
    }
}

impl Config {
    /// Load the full layered configuration. `file` wins over `ROLLCALL_CONFIG`.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        if let Some(path) = file {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            config.merge_toml(&text)?;
            tracing::debug!(path = %path.display(), "config file loaded");
        }
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay the values present in a TOML document.
    pub fn merge_toml(&mut self, text: &str) -> Result<(), ConfigError> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.match_threshold {
            self.match_threshold = v;
        }
        if let Some(v) = file.detection_confidence {
            self.detection_confidence = v;
        }
        if let Some(v) = file.nms_threshold {
            self.nms_threshold = v;
        }
        Ok(())
    }

    /// Overlay `ROLLCALL_*` variables as seen through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        env_f32(&lookup, "ROLLCALL_MATCH_THRESHOLD", &mut self.match_threshold);
        env_f32(&lookup, "ROLLCALL_DETECTION_CONFIDENCE", &mut self.detection_confidence);
        env_f32(&lookup, "ROLLCALL_NMS_THRESHOLD", &mut self.nms_threshold);
    }

    pub fn locator_settings(&self) -> LocatorSettings {
        LocatorSettings {
            confidence_threshold: self.detection_confidence,
            nms_threshold: self.nms_threshold,
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(DETECTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(EXTRACTOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn env_f32(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut f32) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable number"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.match_threshold, 0.5);
        assert_eq!(config.detection_confidence, 0.5);
        assert_eq!(config.nms_threshold, 0.4);
        assert!(config.scrfd_model_path().ends_with("det_10g.onnx"));
        assert!(config.arcface_model_path().ends_with("w600k_r50.onnx"));
    }

    #[test]
    fn test_toml_overrides_only_present_keys() {
        let mut config = Config::default();
        config
            .merge_toml("db_path = \"/srv/rollcall/school.db\"\nmatch_threshold = 0.6\n")
            .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/srv/rollcall/school.db"));
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.nms_threshold, 0.4);
    }

    #[test]
    fn test_unknown_toml_key_rejected() {
        let mut config = Config::default();
        assert!(matches!(
            config.merge_toml("similarity = 0.4"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_beats_file() {
        let mut config = Config::default();
        config.merge_toml("match_threshold = 0.6").unwrap();
        config.apply_env(env(&[
            ("ROLLCALL_MATCH_THRESHOLD", "0.45"),
            ("ROLLCALL_MODEL_DIR", "/opt/models"),
        ]));
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(
            config.scrfd_model_path(),
            PathBuf::from("/opt/models/det_10g.onnx").to_string_lossy()
        );
    }

    #[test]
    fn test_bad_env_number_keeps_previous() {
        let mut config = Config::default();
        config.apply_env(env(&[("ROLLCALL_NMS_THRESHOLD", "lots")]));
        assert_eq!(config.nms_threshold, 0.4);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, "detection_confidence = 0.7\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.detection_confidence, 0.7);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }
}
