//! Runtime settings
//!
//! Values come from `FAKESCOPE_*` environment variables with defaults; the
//! CLI overrides individual fields after loading.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    /// ONNX model for the learned-model layer. `None` selects the statistical proxy.
    pub model_path: Option<PathBuf>,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub max_upload_mb: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            db_path: PathBuf::from("fakescope.db"),
            upload_dir: PathBuf::from("uploads"),
            model_path: None,
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            max_upload_mb: 200,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("FAKESCOPE_HOST").unwrap_or(defaults.host),
            port: parse_or(non_empty("FAKESCOPE_PORT"), "FAKESCOPE_PORT", defaults.port),
            db_path: non_empty("FAKESCOPE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            upload_dir: non_empty("FAKESCOPE_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            model_path: non_empty("FAKESCOPE_MODEL_PATH").map(PathBuf::from),
            ffmpeg: non_empty("FAKESCOPE_FFMPEG").unwrap_or(defaults.ffmpeg),
            ffprobe: non_empty("FAKESCOPE_FFPROBE").unwrap_or(defaults.ffprobe),
            max_upload_mb: parse_or(
                non_empty("FAKESCOPE_MAX_UPLOAD_MB"),
                "FAKESCOPE_MAX_UPLOAD_MB",
                defaults.max_upload_mb,
            ),
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn parse_or<T: std::str::FromStr + std::fmt::Display>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("{} has invalid value {:?}, using {}", key, raw, default);
                default
            }
        },
        None => default,
    }
}
