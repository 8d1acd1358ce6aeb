//! The fixed-order transformation chain applied to every produced artifact
//! before it reaches delivery extensions.
//!
//! Stage order matters: later stages assume the shape produced by earlier
//! ones. Each stage passes an artifact through unchanged when it does not
//! apply, and an [`ArtifactError`] is never transformed by any stage.

use collector_core::{Artifact, ArtifactError, CrawlItem, ErrorDetails, Payload, SampleBudget};

use crate::resize::{ResizeConfig, DEFAULT_CHUNK_SIZE};
use crate::root_path::RootPathConfig;
use crate::split::SplitMode;
use crate::stream_json;
use crate::{resize, root_path, split};

/// Default OCDS schema version stamped on synthesized packages.
pub const DEFAULT_PACKAGE_VERSION: &str = "1.1";

/// Lazy artifact stream handed between stages.
pub type ItemStream = Box<dyn Iterator<Item = CrawlItem> + Send>;

/// Per-source stage-enabling flags. Everything defaults to off; a plain
/// source passes through the pipeline untouched.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub split: SplitMode,
    /// Dot-separated path at which the real data is embedded.
    pub root_path: Option<String>,
    /// Chunk size for package resizing; `None` disables the stage.
    pub resize: Option<u64>,
    pub package_version: String,
    pub budget: SampleBudget,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            split: SplitMode::None,
            root_path: None,
            resize: None,
            package_version: DEFAULT_PACKAGE_VERSION.to_string(),
            budget: SampleBudget::unlimited(),
        }
    }
}

impl PipelineConfig {
    /// Enables resizing at the default chunk size.
    pub fn with_resize(mut self) -> Self {
        self.resize = Some(DEFAULT_CHUNK_SIZE);
        self
    }
}

/// Fatal to the whole source; raised before any request is issued.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid root path: {0}")]
    InvalidRootPath(#[from] stream_json::StreamError),
    #[error("resize chunk size must be positive")]
    ZeroChunkSize,
}

pub struct Pipeline {
    config: PipelineConfig,
    root_segments: Option<Vec<String>>,
}

impl Pipeline {
    /// Validates the configuration eagerly; `SplitMode` already makes the
    /// two splitting sub-modes mutually exclusive by construction.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let root_segments = config
            .root_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .map(stream_json::parse_path)
            .transpose()?;
        if config.resize == Some(0) {
            return Err(PipelineError::ZeroChunkSize);
        }
        Ok(Self {
            config,
            root_segments,
        })
    }

    /// Runs one response's artifact (or error) through the stage chain.
    ///
    /// The returned stream is lazy: pulling stops all remaining upstream
    /// work, which is how the sample budget bounds IO on large payloads.
    pub fn transform(&self, item: CrawlItem) -> ItemStream {
        let mut stream: ItemStream = Box::new(std::iter::once(item));
        stream = split::apply(self.config.split, self.config.budget.clone(), stream);
        if let Some(segments) = &self.root_segments {
            stream = root_path::apply(
                RootPathConfig {
                    segments: segments.clone(),
                    budget: self.config.budget.clone(),
                    package_version: self.config.package_version.clone(),
                },
                stream,
            );
        }
        stream = wrap(self.config.package_version.clone(), stream);
        if let Some(chunk_size) = self.config.resize {
            stream = resize::apply(
                ResizeConfig {
                    chunk_size,
                    budget: self.config.budget.clone(),
                },
                stream,
            );
        }
        materialize(stream)
    }
}

/// Package-wrapping stage: a bare release or record becomes a minimal
/// one-item package and the kind is reclassified accordingly. File-like
/// payloads are read to completion first.
fn wrap(version: String, stream: ItemStream) -> ItemStream {
    Box::new(stream.map(move |item| {
        let artifact = match item {
            CrawlItem::Error(error) => return CrawlItem::Error(error),
            CrawlItem::Artifact(artifact) if artifact.kind.is_package() => {
                return CrawlItem::Artifact(artifact)
            }
            CrawlItem::Artifact(artifact) => artifact,
        };
        let value = match artifact.payload.into_value() {
            Ok(value) => value,
            Err(err) => {
                return CrawlItem::Error(ArtifactError::new(
                    artifact.name,
                    artifact.source_url,
                    ErrorDetails::Parse {
                        message: err.to_string(),
                    },
                ))
            }
        };
        let package = serde_json::json!({
            artifact.kind.array_key(): [value],
            "version": version,
        });
        CrawlItem::Artifact(Artifact {
            name: artifact.name,
            source_url: artifact.source_url,
            kind: artifact.kind.packaged(),
            payload: Payload::Json(package),
            sequence_number: artifact.sequence_number,
        })
    }))
}

/// Materialization stage: every artifact reaching delivery has a concrete
/// in-memory payload; open handles are read fully and closed here.
fn materialize(stream: ItemStream) -> ItemStream {
    Box::new(stream.map(|item| {
        let artifact = match item {
            CrawlItem::Error(error) => return CrawlItem::Error(error),
            CrawlItem::Artifact(artifact) if !artifact.payload.is_stream() => {
                return CrawlItem::Artifact(artifact)
            }
            CrawlItem::Artifact(artifact) => artifact,
        };
        match artifact.payload.into_bytes() {
            Ok(bytes) => CrawlItem::Artifact(Artifact {
                name: artifact.name,
                source_url: artifact.source_url,
                kind: artifact.kind,
                payload: Payload::Bytes(bytes),
                sequence_number: artifact.sequence_number,
            }),
            Err(err) => CrawlItem::Error(ArtifactError::new(
                artifact.name,
                artifact.source_url,
                ErrorDetails::Payload {
                    message: err.to_string(),
                },
            )),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_chunk_size_is_a_config_error() {
        let config = PipelineConfig {
            resize: Some(0),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::new(config),
            Err(PipelineError::ZeroChunkSize)
        ));
    }

    #[test]
    fn bad_root_path_is_a_config_error() {
        let config = PipelineConfig {
            root_path: Some("results..item".to_string()),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Pipeline::new(config),
            Err(PipelineError::InvalidRootPath(_))
        ));
    }
}
