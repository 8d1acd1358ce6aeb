//! Record-splitting stage: one response payload becomes one chunk artifact
//! per line or per concatenated top-level JSON value.

use std::io::{BufRead, BufReader};

use collector_core::{Artifact, ArtifactError, CrawlItem, ErrorDetails, Payload, SampleBudget};
use serde_json::Value;

use crate::pipeline::ItemStream;

/// Which record-splitting sub-mode a source enables, if any. At most one is
/// active per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    #[default]
    None,
    /// Each non-empty line of the payload is one record.
    Lines,
    /// The payload is a sequence of top-level JSON values with no
    /// separators between them.
    ConcatenatedJson,
}

pub(crate) fn apply(mode: SplitMode, budget: SampleBudget, stream: ItemStream) -> ItemStream {
    if mode == SplitMode::None {
        return stream;
    }
    Box::new(stream.flat_map(move |item| split_item(mode, budget.clone(), item)))
}

fn split_item(mode: SplitMode, budget: SampleBudget, item: CrawlItem) -> ItemStream {
    let artifact = match item {
        CrawlItem::Error(error) => return Box::new(std::iter::once(CrawlItem::Error(error))),
        // Chunks are never re-split.
        CrawlItem::Artifact(artifact) if artifact.sequence_number.is_some() => {
            return Box::new(std::iter::once(CrawlItem::Artifact(artifact)))
        }
        CrawlItem::Artifact(artifact) => artifact,
    };

    let name = artifact.name;
    let source_url = artifact.source_url;
    let kind = artifact.kind;
    let reader = match artifact.payload.into_reader() {
        Ok(reader) => reader,
        Err(err) => {
            return Box::new(std::iter::once(CrawlItem::Error(ArtifactError::new(
                name,
                source_url,
                ErrorDetails::Payload {
                    message: err.to_string(),
                },
            ))))
        }
    };

    match mode {
        SplitMode::None => unreachable!("handled in apply"),
        SplitMode::Lines => {
            let mut lines = BufReader::new(reader).lines();
            let mut sequence = 0u64;
            let mut failed = false;
            Box::new(std::iter::from_fn(move || {
                // Budget first, so an exhausted sample stops reading the
                // rest of a large payload.
                if failed || budget.is_exhausted() {
                    return None;
                }
                loop {
                    match lines.next()? {
                        Ok(line) if line.trim().is_empty() => continue,
                        Ok(line) => {
                            if !budget.try_take() {
                                return None;
                            }
                            sequence += 1;
                            return Some(CrawlItem::Artifact(Artifact::chunk(
                                name.clone(),
                                source_url.clone(),
                                kind,
                                line.into_bytes(),
                                sequence,
                            )));
                        }
                        Err(err) => {
                            failed = true;
                            return Some(CrawlItem::Error(ArtifactError::new(
                                name.clone(),
                                source_url.clone(),
                                ErrorDetails::Payload {
                                    message: err.to_string(),
                                },
                            )));
                        }
                    }
                }
            }))
        }
        SplitMode::ConcatenatedJson => {
            let mut values = serde_json::Deserializer::from_reader(reader).into_iter::<Value>();
            let mut sequence = 0u64;
            let mut failed = false;
            Box::new(std::iter::from_fn(move || {
                if failed || budget.is_exhausted() {
                    return None;
                }
                match values.next()? {
                    Ok(value) => {
                        if !budget.try_take() {
                            return None;
                        }
                        sequence += 1;
                        Some(CrawlItem::Artifact(Artifact::chunk(
                            name.clone(),
                            source_url.clone(),
                            kind,
                            Payload::Json(value),
                            sequence,
                        )))
                    }
                    Err(err) => {
                        failed = true;
                        Some(CrawlItem::Error(ArtifactError::new(
                            name.clone(),
                            source_url.clone(),
                            ErrorDetails::Parse {
                                message: err.to_string(),
                            },
                        )))
                    }
                }
            }))
        }
    }
}
