pub mod admission;
pub mod checksum;
pub mod client;
pub mod job;
pub mod library;
pub mod naming;
pub mod pipeline;
pub mod queue;
pub mod receiver;
pub mod registry;
pub mod worker;

pub use pipeline::{IngestPipeline, IngestSettings};

/// Suffix carried by temp files while an upload is still being received.
/// Files with this suffix never appear in listings and are skipped by
/// producers scanning their watch folders.
pub const TEMP_SUFFIX: &str = ".part";

pub mod generated {
    tonic::include_proto!("vidgate.v1");
}
