//! Layered application configuration
//!
//! Built-in defaults, then an optional TOML file, then `DROWSY_*`
//! environment overrides (`__` separates nested keys).

use std::path::{Path, PathBuf};
use std::time::Duration;

use camera_capture::CameraConfig;
use config::{Config, Environment, File, FileFormat};
use dms::{DmsConfig, ScriptStep, ScriptedDetector};
use serde::{Deserialize, Serialize};

use crate::MonitorError;

/// Env var naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "DROWSY_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "drowsiness-monitor.toml";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "DROWSY";

/// Logging output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Simulated driver for the synthetic pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Frames with eyes open per cycle
    pub open_frames: u32,
    /// Frames with eyes closed per cycle
    pub closed_frames: u32,
    pub open_probability: f32,
    pub closed_probability: f32,
    /// Simulated detector inference time
    pub detector_latency_ms: u64,
    /// Stop after this long instead of waiting for Ctrl-C
    pub duration_secs: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            open_frames: 90,
            closed_frames: 45,
            open_probability: 0.92,
            closed_probability: 0.08,
            detector_latency_ms: 20,
            duration_secs: None,
        }
    }
}

impl DemoConfig {
    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }

    /// Detector that opens and closes both eyes in a fixed cycle
    pub fn detector(&self) -> ScriptedDetector {
        let open = std::iter::repeat(ScriptStep::eyes(self.open_probability, self.open_probability))
            .take(self.open_frames as usize);
        let closed =
            std::iter::repeat(ScriptStep::eyes(self.closed_probability, self.closed_probability))
                .take(self.closed_frames as usize);

        ScriptedDetector::new(open.chain(closed))
            .cycling()
            .with_latency(Duration::from_millis(self.detector_latency_ms))
    }

    fn validate(&self) -> Result<(), MonitorError> {
        if self.open_frames + self.closed_frames == 0 {
            return Err(MonitorError::Invalid(
                "demo cycle needs at least one frame".into(),
            ));
        }
        for p in [self.open_probability, self.closed_probability] {
            if !(0.0..=1.0).contains(&p) {
                return Err(MonitorError::Invalid(format!(
                    "demo probability {} outside [0, 1]",
                    p
                )));
            }
        }
        Ok(())
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub dms: DmsConfig,
    pub log: LogConfig,
    pub demo: DemoConfig,
}

impl AppConfig {
    /// Load from `DROWSY_CONFIG` (required when set) or the default file
    /// (optional), then apply environment overrides
    pub fn load() -> Result<Self, MonitorError> {
        let explicit = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let required = explicit.is_some();
        let path = explicit.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path, required, environment())
    }

    pub fn load_from(path: &Path, required: bool, env: Environment) -> Result<Self, MonitorError> {
        let config: AppConfig = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(required))
            .add_source(env)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        self.camera.rotation()?;
        self.dms.validate()?;
        self.demo.validate()
    }
}

/// Environment source for `DROWSY_SECTION__KEY` overrides
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::Rotation;

    fn missing_file() -> PathBuf {
        std::env::temp_dir().join("drowsiness-monitor-absent.toml")
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let mut map = config::Map::new();
        for (key, value) in vars {
            map.insert(key.to_string(), value.to_string());
        }
        environment().source(Some(map))
    }

    #[test]
    fn test_defaults_without_file() {
        let config = AppConfig::load_from(&missing_file(), false, env(&[])).unwrap();
        assert_eq!(config.camera.fps, 15);
        assert_eq!(config.camera.rotation().unwrap(), Rotation::Deg270);
        assert_eq!(config.dms.debounce.drowsy_streak, 3);
        assert_eq!(config.dms.alert.cooldown_ms, 6000);
        assert_eq!(config.log.level, "info");
        assert!(config.demo.duration().is_none());
    }

    #[test]
    fn test_required_file_missing_is_error() {
        assert!(matches!(
            AppConfig::load_from(&missing_file(), true, env(&[])),
            Err(MonitorError::Config(_))
        ));
    }

    #[test]
    fn test_file_then_env_overrides() {
        let path = std::env::temp_dir().join(format!(
            "drowsiness-monitor-test-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"
[camera]
fps = 30
rotation_degrees = 90

[dms.debounce]
drowsy_streak = 4

[log]
json = true
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(
            &path,
            true,
            env(&[
                ("DROWSY_DMS__DEBOUNCE__DROWSY_STREAK", "6"),
                ("DROWSY_DEMO__DURATION_SECS", "30"),
            ]),
        )
        .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.camera.fps, 30);
        assert_eq!(config.camera.rotation().unwrap(), Rotation::Deg90);
        assert_eq!(config.dms.debounce.drowsy_streak, 6);
        // untouched keys keep their defaults
        assert_eq!(config.dms.debounce.awake_streak, 5);
        assert!(config.log.json);
        assert_eq!(config.demo.duration(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = AppConfig::load_from(
            &missing_file(),
            false,
            env(&[("DROWSY_CAMERA__ROTATION_DEGREES", "45")]),
        );
        assert!(matches!(result, Err(MonitorError::Camera(_))));

        let mut config = AppConfig::default();
        config.demo.closed_probability = 1.5;
        assert!(matches!(config.validate(), Err(MonitorError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_demo_detector_cycles() {
        use dms::FaceDetector;

        let demo = DemoConfig {
            open_frames: 1,
            closed_frames: 2,
            detector_latency_ms: 0,
            ..Default::default()
        };
        let detector = demo.detector();
        let frame = camera_capture::FrameNormalizer::new()
            .normalize(&camera_capture::SyntheticCamera::frame(
                &CameraConfig {
                    width: 4,
                    height: 4,
                    ..Default::default()
                },
                Rotation::Deg0,
                0,
            ))
            .unwrap();

        let mut left = Vec::new();
        for _ in 0..4 {
            let faces = detector.detect(&frame).await.unwrap();
            left.push(faces[0].left_eye_open.unwrap());
        }
        assert_eq!(left, vec![0.92, 0.08, 0.08, 0.92]);
    }
}
