//! Configuration validation with range checks.

use std::path::{Component, Path};

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.workers == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.workers must be > 0".into(),
            ));
        }
        if self.scheduler.data_dirs.is_empty() {
            return Err(ConfigError::ValidationError(
                "scheduler.data_dirs must name at least one directory".into(),
            ));
        }
        for dir in &self.scheduler.data_dirs {
            if !is_single_component(dir) {
                return Err(ConfigError::ValidationError(format!(
                    "scheduler.data_dirs entry '{dir}' must be a single relative path component"
                )));
            }
        }
        if self.pipeline.sink_count == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.sink_count must be > 0".into(),
            ));
        }
        if self.pipeline.deque_capacity < 2 || !self.pipeline.deque_capacity.is_power_of_two() {
            return Err(ConfigError::ValidationError(
                "pipeline.deque_capacity must be a power of two >= 2".into(),
            ));
        }
        if self.paths.effects_file.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "paths.effects_file must not be empty".into(),
            ));
        }
        if self.paths.input_root.as_os_str().is_empty()
            || self.paths.output_root.as_os_str().is_empty()
        {
            return Err(ConfigError::ValidationError(
                "paths.input_root and paths.output_root must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn is_single_component(dir: &str) -> bool {
    let mut components = Path::new(dir).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
