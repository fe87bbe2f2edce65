//! Macrofeed core: resilient acquisition of economic indicator series.
//!
//! - Descriptor table and TOML configuration
//! - HTTP transport with bounded retries
//! - Source-specific raw fetchers
//! - Schema normalization into (date, value) series
//! - Flat-file snapshot cache used when every source is down
//! - Acquisition orchestrator reporting LIVE / CACHED / UNAVAILABLE

pub mod config;
pub mod data;
pub mod descriptor;
pub mod series;
pub mod stats;

pub use config::{Config, ConfigError};
pub use data::{Acquirer, AcquisitionResult};
pub use descriptor::{Endpoint, Frequency, SeriesDescriptor, SourceKind};
pub use series::{NormalizedSeries, Observation, Provenance};
