use rollcall_hw::SerialSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Kiosk configuration: defaults, then an optional TOML file, then
/// `ROLLCALL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path.
    pub camera_device: String,
    /// Requested capture size; the driver may negotiate another.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Directory of `<Name>.jpg|png|jpeg` reference images.
    pub gallery_dir: PathBuf,
    /// Attendance workbook.
    pub ledger_path: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Serial device of the door controller.
    pub serial_device: String,
    pub baud_rate: u32,
    pub serial_timeout_ms: u64,
    /// Wait after opening the serial port before the first command.
    pub serial_settle_ms: u64,
    /// How long the door stays released per recognized face.
    pub door_hold_secs: u64,
    /// Cosine similarity needed for a positive match.
    pub similarity_threshold: f32,
    pub window_title: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video1".to_string(),
            frame_width: 640,
            frame_height: 480,
            gallery_dir: PathBuf::from("known_faces"),
            ledger_path: PathBuf::from("attendance.xlsx"),
            model_dir: rollcall_core::default_model_dir(),
            serial_device: "/dev/ttyACM0".to_string(),
            baud_rate: 9600,
            serial_timeout_ms: 1000,
            serial_settle_ms: 2000,
            door_hold_secs: 5,
            similarity_threshold: 0.40,
            window_title: "Attendance System".to_string(),
        }
    }
}

impl Config {
    /// Resolve the configuration.
    ///
    /// `explicit` (from `--config`) or `ROLLCALL_CONFIG` must exist if given;
    /// the default `rollcall.toml` is only read when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from);
        let required = explicit.map(Path::to_path_buf).or(from_env);

        let mut config = match required {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply `ROLLCALL_*` overrides looked up through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("ROLLCALL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        override_parsed(&lookup, "ROLLCALL_FRAME_WIDTH", &mut self.frame_width)?;
        override_parsed(&lookup, "ROLLCALL_FRAME_HEIGHT", &mut self.frame_height)?;
        if let Some(v) = lookup("ROLLCALL_GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_LEDGER_PATH") {
            self.ledger_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_SERIAL_DEVICE") {
            self.serial_device = v;
        }
        override_parsed(&lookup, "ROLLCALL_BAUD_RATE", &mut self.baud_rate)?;
        override_parsed(&lookup, "ROLLCALL_SERIAL_TIMEOUT_MS", &mut self.serial_timeout_ms)?;
        override_parsed(&lookup, "ROLLCALL_SERIAL_SETTLE_MS", &mut self.serial_settle_ms)?;
        override_parsed(&lookup, "ROLLCALL_DOOR_HOLD_SECS", &mut self.door_hold_secs)?;
        override_parsed(&lookup, "ROLLCALL_SIMILARITY_THRESHOLD", &mut self.similarity_threshold)?;
        if let Some(v) = lookup("ROLLCALL_WINDOW_TITLE") {
            self.window_title = v;
        }
        self.validate()
    }

    /// Reject values that parse but can never work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Cosine range. Also rejects NaN.
        let threshold = self.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                key: "similarity_threshold".to_string(),
                value: threshold.to_string(),
            });
        }
        Ok(())
    }

    pub fn door_hold(&self) -> Duration {
        Duration::from_secs(self.door_hold_secs)
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            device: self.serial_device.clone(),
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.serial_timeout_ms),
            settle: Duration::from_millis(self.serial_settle_ms),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}
