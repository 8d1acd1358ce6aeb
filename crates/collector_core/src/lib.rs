//! Collector core: pure data model for crawl artifacts.
mod artifact;
mod budget;
mod formatter;
mod window;

pub use artifact::{
    Artifact, ArtifactError, CrawlItem, DataKind, ErrorDetails, Payload, PayloadError,
};
pub use budget::SampleBudget;
pub use formatter::{file_safe_name, NameFormatter};
pub use window::{DateWindow, Granularity, WindowError};
