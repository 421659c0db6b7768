use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use ftl_types::Geometry;

/// Device geometry as it appears in the config file. A real media manager
/// would publish this (§6); here it's operator-supplied since the mock
/// media has no hardware to probe.
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct GeometryConfig {
    pub nr_channels: u16,
    pub nr_luns: u16,
    #[serde(default = "defaults::planes_per_lun")]
    pub planes_per_lun: u16,
    pub blocks_per_lun: u32,
    pub pages_per_blk: u32,
    pub sec_per_pg: u16,
    #[serde(default = "defaults::sec_size")]
    pub sec_size: u32,
    pub min_write_pgs: u32,
    pub max_write_pgs: u32,
}

impl From<GeometryConfig> for Geometry {
    fn from(g: GeometryConfig) -> Geometry {
        Geometry {
            nr_channels: g.nr_channels,
            nr_luns: g.nr_luns,
            planes_per_lun: g.planes_per_lun,
            blocks_per_lun: g.blocks_per_lun,
            pages_per_blk: g.pages_per_blk,
            sec_per_pg: g.sec_per_pg,
            sec_size: g.sec_size,
            min_write_pgs: g.min_write_pgs,
            max_write_pgs: g.max_write_pgs,
        }
    }
}

/// Top-level FTL configuration (§1, §4.6, §9). Loaded once at bring-up and
/// handed around as `Arc<FtlConfig>`; nothing here changes after `Ftl::new`.
#[derive(Deserialize, Debug, Clone)]
pub struct FtlConfig {
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    pub geometry: GeometryConfig,

    /// Host-visible capacity: LBAs are `[0, nr_secs)` (§3). Smaller than
    /// the raw device capacity implied by `geometry` — the difference is
    /// over-provisioning for GC and bad-block headroom, a placement
    /// policy decision left to the operator rather than derived here.
    pub nr_secs: u64,

    /// Ring buffer capacity in sectors; must be a power of two (§4.1).
    #[serde(default = "defaults::ring_capacity")]
    pub ring_capacity: u64,

    /// §9 open question resolved: the source hard-codes `atomic_inc_below`
    /// at 400000; here it's configurable.
    #[serde(default = "defaults::inflight_cap")]
    pub inflight_cap: u64,

    /// Pre-erased block pool depth per LUN (§4.6, default 1).
    #[serde(default = "defaults::pool_depth")]
    pub pool_depth: usize,

    /// Free-block count below which a LUN enters emergency GC (§3, §4.6).
    #[serde(default = "defaults::emergency_threshold")]
    pub emergency_threshold: usize,

    /// Provisioner tick interval in milliseconds (§4.6, default 10ms).
    #[serde(default = "defaults::provisioner_tick_ms")]
    pub provisioner_tick_ms: u64,
}

impl FtlConfig {
    pub fn provisioner_tick(&self) -> Duration {
        Duration::from_millis(self.provisioner_tick_ms)
    }
}

mod defaults {
    pub fn log_level() -> String {
        "info".into()
    }

    pub fn planes_per_lun() -> u16 {
        1
    }

    pub fn sec_size() -> u32 {
        4096
    }

    pub fn ring_capacity() -> u64 {
        1 << 16
    }

    /// §9: the source's `atomic_inc_below` hard-coded cap, kept as the
    /// default but now overridable.
    pub fn inflight_cap() -> u64 {
        400_000
    }

    pub fn pool_depth() -> usize {
        1
    }

    pub fn emergency_threshold() -> usize {
        2
    }

    pub fn provisioner_tick_ms() -> u64 {
        10
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("ring_capacity {0} is not a power of two")]
    RingCapacityNotPowerOfTwo(u64),
}

impl FtlConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().display().to_string();
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path_str,
            source,
        })?;
        let config: FtlConfig = toml::from_str(&raw)?;
        if !config.ring_capacity.is_power_of_two() {
            return Err(ConfigError::RingCapacityNotPowerOfTwo(config.ring_capacity));
        }
        Ok(config)
    }
}
