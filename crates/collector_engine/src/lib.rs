//! Collector engine: pagination planning, streaming transformation and the
//! fetch boundary.
mod engine;
mod fetch;
mod pagination;
mod periodic;
mod pipeline;
mod resize;
mod root_path;
mod source;
mod split;
mod stream_json;
mod types;

pub use collector_logging::{crawl_debug, crawl_error, crawl_info, crawl_trace, crawl_warn};

pub use engine::EngineHandle;
pub use fetch::{ChannelProgressSink, FetchSettings, Fetcher, ProgressSink, ReqwestFetcher};
pub use pagination::{
    ChronologicalOrder, CursorPlan, FollowUp, Limit, PaginationError, PaginationPolicy,
    PlanOutcome, Planner, ResultCountMode, DEFAULT_NEXT_POINTER, DEFAULT_PAGE_PARAM,
};
pub use periodic::{PeriodUnit, PeriodUrls, PeriodicRequests};
pub use pipeline::{
    ItemStream, Pipeline, PipelineConfig, PipelineError, DEFAULT_PACKAGE_VERSION,
};
pub use resize::DEFAULT_CHUNK_SIZE;
pub use source::{CrawlEffect, ResponseInput, SourceConfig, SourceError, SourceHandler};
pub use split::SplitMode;
pub use stream_json::{JsonItems, StreamError};
pub use types::{
    CrawlEvent, FailureKind, FetchError, FetchMetadata, FetchOutput, FetchProgress, RequestId,
    Stage,
};
