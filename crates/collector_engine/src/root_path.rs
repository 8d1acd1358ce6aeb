//! Root-path extraction stage.
//!
//! Many sources embed the real data at a nested path inside an arbitrary
//! enclosing structure. This stage stream-parses the payload at that path
//! and replaces the artifact with the extracted values. When the values are
//! releases or records scattered across the payload (a terminal `item`
//! segment), they are accumulated into one synthesized package instead:
//! downstream consumers handle one well-formed package far better than
//! thousands of fragments.

use collector_core::{
    Artifact, ArtifactError, CrawlItem, DataKind, ErrorDetails, Payload, SampleBudget,
};
use serde_json::{Map, Value};
use url::Url;

use crate::pipeline::ItemStream;
use crate::stream_json::JsonItems;

#[derive(Debug, Clone)]
pub(crate) struct RootPathConfig {
    pub segments: Vec<String>,
    pub budget: SampleBudget,
    pub package_version: String,
}

enum Mode {
    /// Non-`item` terminal: the path names a single embedded value.
    Single,
    /// Terminal `item` over packages: one artifact per extracted package.
    PerValue,
    /// Bare releases or records at a terminal `item`: accumulate into one
    /// synthesized package from an empty base.
    AccumulateBare,
    /// Doubled `item` (items of arrays within many packages): iterate the
    /// outer packages, keep the first one's metadata, accumulate the inner
    /// arrays.
    AccumulatePackages,
}

impl RootPathConfig {
    fn mode(&self, kind: DataKind) -> Mode {
        let Some((last, head)) = self.segments.split_last() else {
            return Mode::Single;
        };
        if last != "item" {
            return Mode::Single;
        }
        if !kind.is_package() {
            return Mode::AccumulateBare;
        }
        if head.iter().any(|segment| segment == "item") {
            Mode::AccumulatePackages
        } else {
            Mode::PerValue
        }
    }

    fn path(&self) -> String {
        self.segments.join(".")
    }

    /// For the doubled-`item` shape `outer.item.<key>.item`: the path of
    /// the packages and the key of the array inside each.
    fn outer_path_and_key(&self) -> (String, String) {
        let len = self.segments.len();
        let key = self.segments[len - 2].clone();
        (self.segments[..len - 2].join("."), key)
    }
}

struct Accumulator {
    name: String,
    source_url: Url,
    kind: DataKind,
    base: Option<Map<String, Value>>,
    items: Vec<Value>,
}

pub(crate) fn apply(config: RootPathConfig, stream: ItemStream) -> ItemStream {
    Box::new(RootPathStage {
        config,
        input: stream,
        pending: None,
        accumulator: None,
        done: false,
    })
}

struct RootPathStage {
    config: RootPathConfig,
    input: ItemStream,
    pending: Option<ItemStream>,
    accumulator: Option<Accumulator>,
    done: bool,
}

impl Iterator for RootPathStage {
    type Item = CrawlItem;

    fn next(&mut self) -> Option<CrawlItem> {
        loop {
            if self.done {
                return None;
            }
            if let Some(pending) = &mut self.pending {
                match pending.next() {
                    Some(item) => return Some(item),
                    None => self.pending = None,
                }
            }
            match self.input.next() {
                None => {
                    self.done = true;
                    let version = self.config.package_version.clone();
                    return self
                        .accumulator
                        .take()
                        .map(|accumulator| synthesize_package(accumulator, version));
                }
                Some(CrawlItem::Error(error)) => return Some(CrawlItem::Error(error)),
                Some(CrawlItem::Artifact(artifact)) => {
                    match self.config.mode(artifact.kind) {
                        Mode::Single => {
                            self.pending =
                                Some(extract_single(&self.config, artifact));
                        }
                        Mode::PerValue => {
                            self.pending = Some(extract_per_value(&self.config, artifact));
                        }
                        Mode::AccumulateBare => {
                            if let Some(error) = self.accumulate_bare(artifact) {
                                return Some(CrawlItem::Error(error));
                            }
                        }
                        Mode::AccumulatePackages => {
                            if let Some(error) = self.accumulate_packages(artifact) {
                                return Some(CrawlItem::Error(error));
                            }
                        }
                    }
                }
            }
        }
    }
}

impl RootPathStage {
    /// Drains the artifact's extracted values into the accumulator.
    /// Returns the parse error, if any, once accumulated input stands.
    fn accumulate_bare(&mut self, artifact: Artifact) -> Option<ArtifactError> {
        let name = artifact.name.clone();
        let source_url = artifact.source_url.clone();
        let budget = self.config.budget.clone();
        let path = self.config.path();
        let values = match open_items(artifact.payload, &path, None) {
            Ok(values) => values,
            Err(error) => return Some(payload_error(name, source_url, error)),
        };
        let accumulator = self.accumulator_for_fields(name.clone(), source_url.clone(), artifact.kind);
        for value in values {
            if budget.is_exhausted() {
                break;
            }
            match value {
                Ok(value) => {
                    if !budget.try_take() {
                        break;
                    }
                    accumulator.items.push(value);
                }
                Err(err) => {
                    return Some(ArtifactError::new(
                        name,
                        source_url,
                        ErrorDetails::Parse {
                            message: err.to_string(),
                        },
                    ))
                }
            }
        }
        None
    }

    fn accumulate_packages(&mut self, artifact: Artifact) -> Option<ArtifactError> {
        let name = artifact.name.clone();
        let source_url = artifact.source_url.clone();
        let budget = self.config.budget.clone();
        let (outer_path, key) = self.config.outer_path_and_key();
        let packages = match open_items(artifact.payload, &outer_path, None) {
            Ok(values) => values,
            Err(error) => return Some(payload_error(name, source_url, error)),
        };
        let accumulator = self.accumulator_for_fields(name.clone(), source_url.clone(), artifact.kind);
        for package in packages {
            if budget.is_exhausted() {
                break;
            }
            let package = match package {
                Ok(package) => package,
                Err(err) => {
                    return Some(ArtifactError::new(
                        name,
                        source_url,
                        ErrorDetails::Parse {
                            message: err.to_string(),
                        },
                    ))
                }
            };
            match package {
                Value::Object(mut object) if object.contains_key(&key) => {
                    let inner = object.remove(&key);
                    if accumulator.base.is_none() {
                        // Package-level metadata comes from the first
                        // package-shaped value encountered.
                        accumulator.base = Some(object);
                    }
                    if let Some(Value::Array(items)) = inner {
                        for item in items {
                            if !budget.try_take() {
                                break;
                            }
                            accumulator.items.push(item);
                        }
                    }
                }
                // A bare release or record where a package was expected.
                other => {
                    if budget.try_take() {
                        accumulator.items.push(other);
                    }
                }
            }
        }
        None
    }

    fn accumulator_for_fields(
        &mut self,
        name: String,
        source_url: Url,
        kind: DataKind,
    ) -> &mut Accumulator {
        self.accumulator.get_or_insert_with(|| Accumulator {
            name,
            source_url,
            kind: kind.packaged(),
            base: None,
            items: Vec::new(),
        })
    }
}

fn synthesize_package(accumulator: Accumulator, version: String) -> CrawlItem {
    let mut package = accumulator.base.unwrap_or_default();
    package
        .entry("version".to_string())
        .or_insert_with(|| Value::String(version));
    package.insert(
        accumulator.kind.array_key().to_string(),
        Value::Array(accumulator.items),
    );
    CrawlItem::Artifact(Artifact::new(
        accumulator.name,
        accumulator.source_url,
        accumulator.kind,
        Payload::Json(Value::Object(package)),
    ))
}

type BoxedItems = JsonItems<Box<dyn std::io::Read + Send>>;

fn open_items(
    payload: Payload,
    path: &str,
    skip_key: Option<&str>,
) -> Result<BoxedItems, String> {
    let reader = payload.into_reader().map_err(|err| err.to_string())?;
    JsonItems::new(reader, path, skip_key).map_err(|err| err.to_string())
}

fn payload_error(name: String, source_url: Url, message: String) -> ArtifactError {
    ArtifactError::new(name, source_url, ErrorDetails::Payload { message })
}

/// Non-`item` terminal: the single value at the path replaces the payload.
fn extract_single(config: &RootPathConfig, artifact: Artifact) -> ItemStream {
    let path = config.path();
    let name = artifact.name;
    let source_url = artifact.source_url;
    let kind = artifact.kind;
    let sequence_number = artifact.sequence_number;
    let mut values = match open_items(artifact.payload, &path, None) {
        Ok(values) => values,
        Err(error) => {
            return Box::new(std::iter::once(CrawlItem::Error(payload_error(
                name, source_url, error,
            ))))
        }
    };
    let item = match values.next() {
        None => None,
        Some(Ok(value)) => Some(CrawlItem::Artifact(Artifact {
            name,
            source_url,
            kind,
            payload: Payload::Json(value),
            sequence_number,
        })),
        Some(Err(err)) => Some(CrawlItem::Error(ArtifactError::new(
            name,
            source_url,
            ErrorDetails::Parse {
                message: err.to_string(),
            },
        ))),
    };
    Box::new(item.into_iter())
}

/// Terminal `item` over packages: one numbered artifact per value, capped
/// by the sample budget exactly like the splitting stage.
fn extract_per_value(config: &RootPathConfig, artifact: Artifact) -> ItemStream {
    let path = config.path();
    let budget = config.budget.clone();
    let name = artifact.name;
    let source_url = artifact.source_url;
    let kind = artifact.kind;
    let mut values = match open_items(artifact.payload, &path, None) {
        Ok(values) => values,
        Err(error) => {
            return Box::new(std::iter::once(CrawlItem::Error(payload_error(
                name, source_url, error,
            ))))
        }
    };
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
