//! Configuration for the FTL core (`[ADDED]`, SPEC_FULL.md §1): geometry,
//! ring capacity, inflight admission cap, pool depth, emergency-GC
//! threshold, and provisioner tick interval, loaded from a TOML file in
//! the teacher's `obsidian-config`/`onyx-config` style.

mod config;

pub use config::{ConfigError, FtlConfig, GeometryConfig};
