//! Per-source response handling: the callback the external engine invokes
//! with each downloaded response.
//!
//! The handler is pure apart from the shared sample counters: it maps one
//! response to a list of effects (follow-up requests, artifacts, errors)
//! and never blocks. All configuration problems surface from
//! [`SourceHandler::new`], before any request is issued.

use collector_core::{
    file_safe_name, Artifact, ArtifactError, CrawlItem, DataKind, ErrorDetails, NameFormatter,
    Payload, SampleBudget,
};
use collector_logging::set_crawl_source;
use serde_json::Value;
use url::Url;

use crate::pagination::{
    ChronologicalOrder, FollowUp, PaginationError, PaginationPolicy, PlanOutcome, Planner,
};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineError};
use crate::{crawl_debug, crawl_warn};

/// What a source asks the engine to do next.
#[derive(Debug)]
pub enum CrawlEffect {
    Request(FollowUp),
    Emit(Artifact),
    Fail(ArtifactError),
}

/// One downloaded response plus the request metadata the engine carried.
#[derive(Debug)]
pub struct ResponseInput {
    pub url: Url,
    pub status: u16,
    pub body: Payload,
    /// 0 for the source's first page.
    pub depth: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Static crawl configuration of one publisher.
pub struct SourceConfig {
    pub source_id: String,
    pub kind: DataKind,
    pub formatter: NameFormatter,
    pub pagination: Option<PaginationPolicy>,
    pub order: ChronologicalOrder,
    pub pipeline: PipelineConfig,
    /// True when a date range, path or query override narrows the crawl;
    /// an empty link-following result is then plausible rather than fatal.
    pub filters_active: bool,
}

pub struct SourceHandler {
    source_id: String,
    kind: DataKind,
    formatter: NameFormatter,
    planner: Option<Planner>,
    follows_links: bool,
    pipeline: Pipeline,
    filters_active: bool,
}

impl SourceHandler {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        // Requests and leaf artifacts are capped at the same N but counted
        // separately; otherwise a sample of 1 would be spent on the first
        // request before any artifact could pass the pipeline.
        let request_budget = match config.pipeline.budget.cap() {
            Some(cap) => SampleBudget::capped(cap),
            None => SampleBudget::unlimited(),
        };
        let follows_links = matches!(config.pagination, Some(PaginationPolicy::NextLink { .. }));
        let planner = config
            .pagination
            .map(|policy| Planner::new(policy, config.order, request_budget.clone()))
            .transpose()?;
        // The first request is issued before any response arrives.
        request_budget.try_take();
        let pipeline = Pipeline::new(config.pipeline)?;
        Ok(Self {
            source_id: config.source_id,
            kind: config.kind,
            formatter: config.formatter,
            planner,
            follows_links,
            pipeline,
            filters_active: config.filters_active,
        })
    }

    /// Handles one response, returning follow-up requests and the
    /// transformed artifacts. A failed request yields exactly one error
    /// effect and nothing else.
    pub fn handle_response(&self, response: ResponseInput) -> Vec<CrawlEffect> {
        set_crawl_source(&self.source_id);
        let name = file_safe_name(&self.formatter, &response.url);

        if !(200..300).contains(&response.status) {
            crawl_warn!(
                "{}: {} answered {}",
                self.source_id,
                response.url,
                response.status
            );
            return vec![CrawlEffect::Fail(ArtifactError::new(
                name,
                response.url,
                ErrorDetails::HttpStatus {
                    code: response.status,
                },
            ))];
        }

        let bytes = match response.body.into_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                return vec![CrawlEffect::Fail(ArtifactError::new(
                    name,
                    response.url,
                    ErrorDetails::Payload {
                        message: err.to_string(),
                    },
                ))]
            }
        };

        let mut effects = Vec::new();
        if let Some(planner) = &self.planner {
            if self.follows_links {
                match planner.next_link(&response.url, &bytes, response.depth, self.filters_active)
                {
                    Ok(Some(follow_up)) => effects.push(CrawlEffect::Request(follow_up)),
                    Ok(None) => {}
                    Err(err) => {
                        let details = match &err {
                            PaginationError::MissingNextLink { .. } => ErrorDetails::Termination {
                                message: err.to_string(),
                            },
                            _ => ErrorDetails::Parse {
                                message: err.to_string(),
                            },
                        };
                        return vec![CrawlEffect::Fail(ArtifactError::new(
                            name,
                            response.url,
                            details,
                        ))]
                    }
                }
            } else if response.depth == 0 {
                let first_page: Value = match serde_json::from_slice(&bytes) {
                    Ok(value) => value,
                    Err(err) => {
                        return vec![CrawlEffect::Fail(ArtifactError::new(
                            name,
                            response.url,
                            ErrorDetails::Parse {
                                message: err.to_string(),
                            },
                        ))]
                    }
                };
                match planner.plan_from_first(&response.url, &first_page, &name) {
                    Ok(PlanOutcome::Requests(requests)) => {
                        crawl_debug!(
                            "{}: planned {} follow-up requests from {}",
                            self.source_id,
                            requests.len(),
                            response.url
                        );
                        effects.extend(requests.into_iter().map(CrawlEffect::Request));
                    }
                    Ok(PlanOutcome::UpstreamError(error)) => {
                        return vec![CrawlEffect::Fail(error)]
                    }
                    Err(err) => {
                        return vec![CrawlEffect::Fail(ArtifactError::new(
                            name,
                            response.url,
                            ErrorDetails::Parse {
                                message: err.to_string(),
                            },
                        ))]
                    }
                }
            }
        }

        let artifact = Artifact::new(name, response.url, self.kind, bytes);
        for item in self.pipeline.transform(artifact.into()) {
            effects.push(match item {
                CrawlItem::Artifact(artifact) => CrawlEffect::Emit(artifact),
                CrawlItem::Error(error) => CrawlEffect::Fail(error),
            });
        }
        effects
    }
}
