//! Series acquisition: transport, fetchers, normalization and the snapshot cache.

pub mod acquire;
pub mod bcra;
pub mod datos_gob;
pub mod json;
pub mod normalize;
pub mod provider;
pub mod snapshot;
pub mod sources;
pub mod transport;

pub use acquire::{
    AcquireFailure, AcquireProgress, AcquireSummary, Acquirer, AcquisitionResult, NoProgress,
    ProbeOutcome, StderrProgress,
};
pub use normalize::{normalize, NormalizationError, NormalizationErrorKind, PayloadShape};
pub use provider::{FetchError, FetchErrorKind, RawFetcher, RawPayload};
pub use snapshot::{SnapshotCache, SnapshotMeta, SnapshotStatus};
pub use sources::{FetcherFactory, HttpSources};
pub use transport::{
    ClientOptions, HttpClient, HttpResponse, ReqwestClient, RetryConfig, Transport, TransportError,
};
