use std::fmt;
use std::io::{self, Cursor, Read};

use serde::Serialize;
use serde_json::Value;
use url::Url;

/// The closed set of data shapes a source can declare for its responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Release,
    Record,
    ReleasePackage,
    RecordPackage,
}

impl DataKind {
    /// The packaged counterpart of this kind. Already-packaged kinds map to
    /// themselves.
    pub fn packaged(self) -> DataKind {
        match self {
            DataKind::Release => DataKind::ReleasePackage,
            DataKind::Record => DataKind::RecordPackage,
            other => other,
        }
    }

    pub fn is_package(self) -> bool {
        matches!(self, DataKind::ReleasePackage | DataKind::RecordPackage)
    }

    /// The key under which a package of this kind stores its items.
    pub fn array_key(self) -> &'static str {
        match self {
            DataKind::Release | DataKind::ReleasePackage => "releases",
            DataKind::Record | DataKind::RecordPackage => "records",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Release => write!(f, "release"),
            DataKind::Record => write!(f, "record"),
            DataKind::ReleasePackage => write!(f, "release_package"),
            DataKind::RecordPackage => write!(f, "record_package"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("io error while reading payload: {0}")]
    Io(#[from] io::Error),
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The body of an artifact. `Stream` carries a still-open file-like handle
/// (an archive member, for example); the materialization stage guarantees
/// no `Stream` payload ever reaches delivery.
pub enum Payload {
    Bytes(Vec<u8>),
    Json(Value),
    Stream(Box<dyn Read + Send>),
}

impl Payload {
    /// Reads the payload to completion, consuming any open handle.
    pub fn into_bytes(self) -> Result<Vec<u8>, PayloadError> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Json(value) => Ok(serde_json::to_vec(&value)?),
            Payload::Stream(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    /// Decodes the payload as a single JSON value.
    pub fn into_value(self) -> Result<Value, PayloadError> {
        match self {
            Payload::Json(value) => Ok(value),
            other => Ok(serde_json::from_slice(&other.into_bytes()?)?),
        }
    }

    /// A readable view of the payload. `Json` payloads are serialized first.
    pub fn into_reader(self) -> Result<Box<dyn Read + Send>, PayloadError> {
        match self {
            Payload::Stream(reader) => Ok(reader),
            other => Ok(Box::new(Cursor::new(other.into_bytes()?))),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Payload::Stream(_))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Payload::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Payload::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// The unit handed to downstream delivery.
///
/// `sequence_number` is `Some` if and only if the artifact is one of N
/// chunks split from a single response; un-chunked artifacts never carry it.
#[derive(Debug)]
pub struct Artifact {
    pub name: String,
    pub source_url: Url,
    pub kind: DataKind,
    pub payload: Payload,
    pub sequence_number: Option<u64>,
}

impl Artifact {
    pub fn new(
        name: impl Into<String>,
        source_url: Url,
        kind: DataKind,
        payload: impl Into<Payload>,
    ) -> Self {
        Self {
            name: name.into(),
            source_url,
            kind,
            payload: payload.into(),
            sequence_number: None,
        }
    }

    /// A chunk artifact: one of several derived from a single response.
    pub fn chunk(
        name: impl Into<String>,
        source_url: Url,
        kind: DataKind,
        payload: impl Into<Payload>,
        sequence_number: u64,
    ) -> Self {
        Self {
            name: name.into(),
            source_url,
            kind,
            payload: payload.into(),
            sequence_number: Some(sequence_number),
        }
    }
}

/// Structured description of why a request produced no artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDetails {
    /// The upstream server answered with a non-success status.
    HttpStatus { code: u16 },
    /// The payload could not be parsed at some point mid-stream.
    Parse { message: String },
    /// The upstream server answered 2xx but the body is an error envelope.
    Upstream { body: Value },
    /// The payload could not be read (a closed or failing handle).
    Payload { message: String },
    /// Enumeration could not continue (a first page with no next link and
    /// no filter that would explain an empty result).
    Termination { message: String },
}

/// Alternative outcome for a request; produced instead of an [`Artifact`],
/// never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactError {
    pub name: String,
    pub source_url: Url,
    pub details: ErrorDetails,
}

impl ArtifactError {
    pub fn new(name: impl Into<String>, source_url: Url, details: ErrorDetails) -> Self {
        Self {
            name: name.into(),
            source_url,
            details,
        }
    }
}

/// One element of the pipeline's stream.
#[derive(Debug)]
pub enum CrawlItem {
    Artifact(Artifact),
    Error(ArtifactError),
}

impl From<Artifact> for CrawlItem {
    fn from(artifact: Artifact) -> Self {
        CrawlItem::Artifact(artifact)
    }
}

impl From<ArtifactError> for CrawlItem {
    fn from(error: ArtifactError) -> Self {
        CrawlItem::Error(error)
    }
}
