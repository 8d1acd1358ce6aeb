//! Planning of follow-up requests from a first page.
//!
//! Exactly one policy applies per source; the enum makes a doubly- or
//! un-configured source unrepresentable, and `Planner::new` validates the
//! remaining knobs (pointer syntax, parameter names, limits) before any
//! request is issued.

use std::fmt;

use collector_core::{ArtifactError, ErrorDetails, SampleBudget};
use serde_json::Value;
use url::Url;

use crate::crawl_debug;

/// Default JSON Pointer to the next-page link.
pub const DEFAULT_NEXT_POINTER: &str = "/links/next";
/// Default name of the page query parameter.
pub const DEFAULT_PAGE_PARAM: &str = "page";

/// One follow-up request descriptor for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub url: Url,
    pub priority: i64,
}

/// Direction in which a source publishes its pages. Descending (the
/// default) means page 1 holds the most recent data, so earlier pages are
/// serviced first via priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChronologicalOrder {
    #[default]
    Descending,
    Ascending,
}

/// How the per-request limit of a result-count source is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Limit {
    Fixed(u64),
    Pointer(String),
}

/// Sub-mode of the result-count policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCountMode {
    /// `limit=L&offset=kL` requests.
    LimitOffset,
    /// `page=n` requests for `ceil(count / limit)` pages.
    UsePage,
}

/// Escape hatch for APIs that fit none of the built-in policies: the
/// source supplies its own cursor sequence and URL builder.
pub trait CursorPlan: Send + Sync {
    fn cursors(&self, first_page: &Value) -> Vec<Value>;
    fn request(&self, first_url: &Url, cursor: &Value) -> Result<Url, PaginationError>;
}

pub enum PaginationPolicy {
    /// The first response exposes a pointer to a total page count.
    PageCount {
        pointer: String,
        page_param: String,
        start_page: u64,
        /// When set, pages are requested from this separate index URL,
        /// including the start page itself as request #1.
        base_url: Option<Url>,
    },
    /// The first response exposes a pointer to a total result count.
    ResultCount {
        count_pointer: String,
        limit: Limit,
        mode: ResultCountMode,
        page_param: String,
        start_page: u64,
        base_url: Option<Url>,
    },
    /// Each response exposes a pointer to the next link; followed until
    /// absent.
    NextLink { pointer: String },
    /// Source-supplied enumeration.
    Custom(Box<dyn CursorPlan>),
}

impl PaginationPolicy {
    pub fn page_count(pointer: impl Into<String>) -> Self {
        PaginationPolicy::PageCount {
            pointer: pointer.into(),
            page_param: DEFAULT_PAGE_PARAM.to_string(),
            start_page: 1,
            base_url: None,
        }
    }

    pub fn result_count(
        count_pointer: impl Into<String>,
        limit: Limit,
        mode: ResultCountMode,
    ) -> Self {
        PaginationPolicy::ResultCount {
            count_pointer: count_pointer.into(),
            limit,
            mode,
            page_param: DEFAULT_PAGE_PARAM.to_string(),
            start_page: 1,
            base_url: None,
        }
    }

    pub fn next_link() -> Self {
        PaginationPolicy::NextLink {
            pointer: DEFAULT_NEXT_POINTER.to_string(),
        }
    }

    fn validate(&self) -> Result<(), PaginationError> {
        let check_pointer = |pointer: &str| {
            if pointer.is_empty() || !pointer.starts_with('/') {
                return Err(PaginationError::Config {
                    message: format!("JSON Pointer {pointer:?} must start with '/'"),
                });
            }
            Ok(())
        };
        match self {
            PaginationPolicy::PageCount {
                pointer, page_param, ..
            } => {
                check_pointer(pointer)?;
                check_param(page_param)
            }
            PaginationPolicy::ResultCount {
                count_pointer,
                limit,
                page_param,
                ..
            } => {
                check_pointer(count_pointer)?;
                check_param(page_param)?;
                match limit {
                    Limit::Fixed(0) => Err(PaginationError::Config {
                        message: "limit must be positive".to_string(),
                    }),
                    Limit::Fixed(_) => Ok(()),
                    Limit::Pointer(pointer) => check_pointer(pointer),
                }
            }
            PaginationPolicy::NextLink { pointer } => check_pointer(pointer),
            PaginationPolicy::Custom(_) => Ok(()),
        }
    }
}

fn check_param(param: &str) -> Result<(), PaginationError> {
    if param.is_empty() {
        return Err(PaginationError::Config {
            message: "page parameter name must not be empty".to_string(),
        });
    }
    Ok(())
}

impl fmt::Debug for PaginationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaginationPolicy::PageCount { pointer, .. } => {
                f.debug_struct("PageCount").field("pointer", pointer).finish()
            }
            PaginationPolicy::ResultCount { count_pointer, .. } => f
                .debug_struct("ResultCount")
                .field("count_pointer", count_pointer)
                .finish(),
            PaginationPolicy::NextLink { pointer } => {
                f.debug_struct("NextLink").field("pointer", pointer).finish()
            }
            PaginationPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaginationError {
    /// Fatal to the whole source; detected before any request is issued.
    #[error("invalid pagination configuration: {message}")]
    Config { message: String },
    #[error("JSON Pointer {pointer:?} is missing or not a positive integer")]
    Pointer { pointer: String },
    #[error("first page of {url} has no next link and no filter explains an empty result")]
    MissingNextLink { url: Url },
    #[error("next link is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result of planning from a decoded first page.
#[derive(Debug)]
pub enum PlanOutcome {
    Requests(Vec<FollowUp>),
    /// The 2xx body itself was an upstream error envelope; no pages are
    /// enumerated.
    UpstreamError(ArtifactError),
}

pub struct Planner {
    policy: PaginationPolicy,
    order: ChronologicalOrder,
    budget: SampleBudget,
}

impl Planner {
    /// Validates the policy eagerly; a configuration error here is fatal to
    /// the source.
    pub fn new(
        policy: PaginationPolicy,
        order: ChronologicalOrder,
        budget: SampleBudget,
    ) -> Result<Self, PaginationError> {
        policy.validate()?;
        Ok(Self {
            policy,
            order,
            budget,
        })
    }

    /// Computes the full follow-up set from the decoded first page.
    ///
    /// The caller is expected to have claimed one budget unit for the first
    /// request itself; enumeration stops as soon as the budget's count of
    /// requests already issued would be exceeded.
    pub fn plan_from_first(
        &self,
        first_url: &Url,
        first_page: &Value,
        name: &str,
    ) -> Result<PlanOutcome, PaginationError> {
        if let Some(body) = upstream_error(first_page) {
            crawl_debug!("{name}: upstream error envelope on first page of {first_url}");
            return Ok(PlanOutcome::UpstreamError(ArtifactError::new(
                name,
                first_url.clone(),
                ErrorDetails::Upstream { body },
            )));
        }
        let requests = match &self.policy {
            PaginationPolicy::PageCount {
                pointer,
                page_param,
                start_page,
                base_url,
            } => {
                let pages = resolve_u64(first_page, pointer)?;
                let (template, first) = match base_url {
                    // Reuse the already-fetched first page's URL; it covers
                    // page `start_page`.
                    None => (first_url, start_page + 1),
                    // A separate index URL serves every page, the start
                    // page included.
                    Some(base) => (base, *start_page),
                };
                let last = start_page + pages.saturating_sub(1);
                self.collect(
                    (first..=last)
                        .take(pages as usize)
                        .map(|page| with_query_param(template, page_param, &page.to_string())),
                )
            }
            PaginationPolicy::ResultCount {
                count_pointer,
                limit,
                mode,
                page_param,
                start_page,
                base_url,
            } => {
                let count = resolve_u64(first_page, count_pointer)?;
                let limit = match limit {
                    Limit::Fixed(limit) => *limit,
                    Limit::Pointer(pointer) => resolve_u64(first_page, pointer)?,
                };
                if limit == 0 {
                    return Err(PaginationError::Pointer {
                        pointer: "limit".to_string(),
                    });
                }
                match mode {
                    ResultCountMode::LimitOffset => {
                        let template = base_url.as_ref().unwrap_or(first_url);
                        let start = if base_url.is_some() { 0 } else { limit };
                        self.collect((start..count).step_by(limit as usize).map(|offset| {
                            let url = with_query_param(template, "limit", &limit.to_string());
                            with_query_param(&url, "offset", &offset.to_string())
                        }))
                    }
                    ResultCountMode::UsePage => {
                        let template = base_url.as_ref().unwrap_or(first_url);
                        let pages = count.div_ceil(limit);
                        let first = start_page + 1;
                        let last = start_page + pages.saturating_sub(1);
                        self.collect((first..=last).map(|page| {
                            with_query_param(template, page_param, &page.to_string())
                        }))
                    }
                }
            }
            PaginationPolicy::NextLink { .. } => {
                // Link-following enumerates one response at a time.
                return Err(PaginationError::Config {
                    message: "link-following sources paginate via next_link, not a first-page plan"
                        .to_string(),
                });
            }
            PaginationPolicy::Custom(plan) => {
                let mut urls = Vec::new();
                for cursor in plan.cursors(first_page) {
                    urls.push(plan.request(first_url, &cursor)?);
                }
                self.collect(urls.into_iter())
            }
        };
        Ok(PlanOutcome::Requests(requests))
    }

    /// Resolves the next-link pointer of one response body, enforcing the
    /// termination rule: a missing link is only an error on the very first
    /// page when no active filter could explain an empty result set.
    ///
    /// With a sample budget of exactly 1 the body is never parsed at all.
    pub fn next_link(
        &self,
        url: &Url,
        body: &[u8],
        depth: u64,
        filters_active: bool,
    ) -> Result<Option<FollowUp>, PaginationError> {
        let pointer = match &self.policy {
            PaginationPolicy::NextLink { pointer } => pointer,
            other => {
                return Err(PaginationError::Config {
                    message: format!("next_link called on a {other:?} policy"),
                })
            }
        };
        if self.budget.cap() == Some(1) {
            return Ok(None);
        }
        if self.budget.is_exhausted() {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(body)?;
        match value.pointer(pointer).and_then(Value::as_str) {
            Some(link) => {
                if !self.budget.try_take() {
                    return Ok(None);
                }
                let next = url.join(link)?;
                Ok(Some(FollowUp {
                    url: next,
                    priority: 0,
                }))
            }
            None if depth == 0 && !filters_active => {
                Err(PaginationError::MissingNextLink { url: url.clone() })
            }
            None => Ok(None),
        }
    }

    /// Applies ordering priority and eager budget enforcement to a computed
    /// URL sequence.
    fn collect(&self, urls: impl Iterator<Item = Url>) -> Vec<FollowUp> {
        let mut requests = Vec::new();
        for (position, url) in urls.enumerate() {
            if !self.budget.try_take() {
                break;
            }
            let priority = match self.order {
                ChronologicalOrder::Descending => -(position as i64),
                ChronologicalOrder::Ascending => 0,
            };
            requests.push(FollowUp { url, priority });
        }
        requests
    }
}

/// A 2xx body whose top level carries an error member is an upstream error
/// envelope, not data.
fn upstream_error(value: &Value) -> Option<Value> {
    let object = value.as_object()?;
    if object.contains_key("error") || object.contains_key("errors") {
        Some(value.clone())
    } else {
        None
    }
}

fn resolve_u64(value: &Value, pointer: &str) -> Result<u64, PaginationError> {
    let resolved = value.pointer(pointer);
    // Some sources serve counts as JSON strings.
    resolved
        .and_then(Value::as_u64)
        .or_else(|| resolved.and_then(Value::as_str).and_then(|s| s.parse().ok()))
        .ok_or_else(|| PaginationError::Pointer {
            pointer: pointer.to_string(),
        })
}

/// Returns `url` with `key` set to `value`, replacing any existing
/// occurrence and preserving the other parameters.
pub(crate) fn with_query_param(url: &Url, key: &str, value: &str) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = url.clone();
    {
        let mut pairs = out.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(key, value);
    }
    out
}
