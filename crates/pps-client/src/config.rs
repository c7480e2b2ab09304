use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_MOUNT_POINT: &str = "/pps/";
pub const DEFAULT_MAX_OBJECT_SIZE: usize = 16 * 1024;
pub const MIN_OBJECT_SIZE: usize = 512;
pub const MAX_OBJECT_SIZE: usize = 64 * 1024;

pub const MOUNT_POINT_ENV: &str = "PPS_MOUNT_POINT";
pub const MAX_OBJECT_SIZE_ENV: &str = "PPS_MAX_OBJECT_SIZE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpsConfig {
    pub mount_point: PathBuf,
    pub max_object_size: usize,
}

impl Default for PpsConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
        }
    }
}

impl PpsConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(mount_point) = env_value(MOUNT_POINT_ENV) {
            config.mount_point = PathBuf::from(mount_point);
        }
        if let Some(raw) = env_value(MAX_OBJECT_SIZE_ENV) {
            match raw.parse::<usize>() {
                Ok(size) => {
                    config.set_max_object_size(size);
                }
                Err(err) => warn!(
                    event = "pps_config_invalid",
                    key = MAX_OBJECT_SIZE_ENV,
                    value = %raw,
                    error = %err
                ),
            }
        }
        config
    }

    pub fn with_mount_point(mut self, mount_point: impl Into<PathBuf>) -> Self {
        self.mount_point = mount_point.into();
        self
    }

    pub fn set_max_object_size(&mut self, size: usize) -> bool {
        if !is_valid_object_size(size) {
            return false;
        }
        self.max_object_size = size;
        true
    }
}

pub fn is_valid_object_size(size: usize) -> bool {
    (MIN_OBJECT_SIZE..=MAX_OBJECT_SIZE).contains(&size)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
