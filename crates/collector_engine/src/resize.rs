//! Package-resizing stage.
//!
//! Some publishers serve one release package containing tens of thousands
//! of releases. This stage regroups the package's items into fixed-size
//! chunks, each wrapped in a copy of the original package-level metadata.
//! The metadata is read in a single skip-key streaming pass so the huge
//! item array is never parsed just to reach its sibling fields.

use std::io::Cursor;

use collector_core::{
    Artifact, ArtifactError, CrawlItem, ErrorDetails, Payload, SampleBudget,
};
use serde_json::{Map, Value};

use crate::pipeline::ItemStream;
use crate::stream_json::JsonItems;

/// Default number of items per resized package.
pub const DEFAULT_CHUNK_SIZE: u64 = 100;

#[derive(Debug, Clone)]
pub(crate) struct ResizeConfig {
    pub chunk_size: u64,
    pub budget: SampleBudget,
}

pub(crate) fn apply(config: ResizeConfig, stream: ItemStream) -> ItemStream {
    Box::new(stream.flat_map(move |item| resize_item(&config, item)))
}

type ValueResults = Box<dyn Iterator<Item = Result<Value, String>> + Send>;

fn resize_item(config: &ResizeConfig, item: CrawlItem) -> ItemStream {
    let artifact = match item {
        CrawlItem::Error(error) => return Box::new(std::iter::once(CrawlItem::Error(error))),
        CrawlItem::Artifact(artifact) if !artifact.kind.is_package() => {
            return Box::new(std::iter::once(CrawlItem::Artifact(artifact)))
        }
        CrawlItem::Artifact(artifact) => artifact,
    };

    let key = artifact.kind.array_key();
    let name = artifact.name;
    let source_url = artifact.source_url;
    let kind = artifact.kind;
    let parse_failure = |message: String| {
        CrawlItem::Error(ArtifactError::new(
            name.clone(),
            source_url.clone(),
            ErrorDetails::Parse { message },
        ))
    };

    // Package metadata once, item sequence lazily.
    let (metadata, items): (Map<String, Value>, ValueResults) = match artifact.payload {
        Payload::Json(Value::Object(mut object)) => {
            let items = match object.remove(key) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            (object, Box::new(items.into_iter().map(Ok)))
        }
        Payload::Json(_) => {
            return Box::new(std::iter::once(parse_failure(
                "package is not a JSON object".to_string(),
            )))
        }
        payload => {
            let bytes = match payload.into_bytes() {
                Ok(bytes) => bytes,
                Err(err) => {
                    return Box::new(std::iter::once(CrawlItem::Error(ArtifactError::new(
                        name.clone(),
                        source_url.clone(),
                        ErrorDetails::Payload {
                            message: err.to_string(),
                        },
                    ))))
                }
            };
            // Metadata-only pass: the item array is token-skipped, not
            // parsed.
            let metadata = JsonItems::new(&bytes[..], "", Some(key))
                .and_then(|mut items| items.next().transpose())
                .map_err(|err| err.to_string())
                .and_then(|value| match value {
                    Some(Value::Object(object)) => Ok(object),
                    _ => Err("package is not a JSON object".to_string()),
                });
            let metadata = match metadata {
                Ok(metadata) => metadata,
                Err(message) => return Box::new(std::iter::once(parse_failure(message))),
            };
            let items = match JsonItems::new(Cursor::new(bytes), &format!("{key}.item"), None) {
                Ok(items) => items,
                Err(err) => {
                    return Box::new(std::iter::once(parse_failure(err.to_string())))
                }
            };
            (
                metadata,
                Box::new(items.map(|result| result.map_err(|err| err.to_string()))),
            )
        }
    };

    let chunk_size = config.budget.chunk_size(config.chunk_size) as usize;
    let budget = config.budget.clone();
    let mut items = items;
    let mut sequence = 0u64;
    let mut failed = false;
    Box::new(std::iter::from_fn(move || {
        if failed || budget.is_exhausted() {
            return None;
        }
        let mut chunk = Vec::with_capacity(chunk_size);
        while chunk.len() < chunk_size {
            match items.next() {
                None => break,
                Some(Ok(value)) => chunk.push(value),
                Some(Err(message)) => {
                    failed = true;
                    return Some(CrawlItem::Error(ArtifactError::new(
                        name.clone(),
                        source_url.clone(),
                        ErrorDetails::Parse { message },
                    )));
                }
            }
        }
        if chunk.is_empty() || !budget.try_take() {
            return None;
        }
        sequence += 1;
        let mut package = metadata.clone();
        package.insert(key.to_string(), Value::Array(chunk));
        Some(CrawlItem::Artifact(Artifact::chunk(
            name.clone(),
            source_url.clone(),
            kind,
            Payload::Json(Value::Object(package)),
            sequence,
        )))
    }))
}
