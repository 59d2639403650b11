/*!
    Pipeline configuration, loadable from JSON.
*/

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use media_sink::ContainerFormat;
use media_transform::RotationPolicy;
use media_types::{Error, Result};

/**
    Tunables shared by the offline pipeline and live recording.

    Every field has a default, so a config file only needs to name what it
    changes:

    ```json
    { "pool_capacity": 4, "rotation_policy": "quarter_turn_only" }
    ```
*/
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of output buffers in flight between the video lane and the sink.
    pub pool_capacity: usize,
    /// How often a lane re-checks a sink that is not ready, in milliseconds.
    pub readiness_poll_ms: u64,
    /// Which source rotations are baked into the output pixels.
    pub rotation_policy: RotationPolicy,
    /// Output container.
    pub container: ContainerFormat,
    /// Video bitrate in bits per second, instead of the source's.
    pub video_bitrate: Option<u64>,
    /// Move the movie header to the front of the file.
    pub fast_start: bool,
    /// Log every frame the live pipeline drops, not just the totals.
    pub log_dropped_frames: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 3,
            readiness_poll_ms: 5,
            rotation_policy: RotationPolicy::default(),
            container: ContainerFormat::default(),
            video_bitrate: None,
            fast_start: true,
            log_dropped_frames: false,
        }
    }
}

impl PipelineConfig {
    /**
        Load a config from a JSON file.
    */
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)
            .map_err(|e| Error::invalid_data(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    /**
        Write this config to a JSON file.
    */
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| Error::invalid_data(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms.max(1))
    }
}
