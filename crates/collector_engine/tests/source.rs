use collector_core::{DataKind, ErrorDetails, NameFormatter, Payload, SampleBudget};
use collector_engine::{
    ChronologicalOrder, CrawlEffect, PaginationPolicy, PipelineConfig, ResponseInput,
    SourceConfig, SourceHandler,
};
use pretty_assertions::assert_eq;
use url::Url;

fn config(pagination: Option<PaginationPolicy>, pipeline: PipelineConfig) -> SourceConfig {
    SourceConfig {
        source_id: "example_source".to_string(),
        kind: DataKind::ReleasePackage,
        formatter: NameFormatter::components(-1, None),
        pagination,
        order: ChronologicalOrder::Descending,
        pipeline,
        filters_active: false,
    }
}

fn response(url: &str, status: u16, body: &[u8], depth: u64) -> ResponseInput {
    ResponseInput {
        url: Url::parse(url).unwrap(),
        status,
        body: Payload::Bytes(body.to_vec()),
        depth,
    }
}

fn split(effects: Vec<CrawlEffect>) -> (Vec<Url>, usize, usize) {
    let mut requests = Vec::new();
    let mut emitted = 0;
    let mut failed = 0;
    for effect in effects {
        match effect {
            CrawlEffect::Request(follow_up) => requests.push(follow_up.url),
            CrawlEffect::Emit(_) => emitted += 1,
            CrawlEffect::Fail(_) => failed += 1,
        }
    }
    (requests, emitted, failed)
}

#[test]
fn a_first_page_plans_follow_ups_and_emits_its_artifact() {
    let handler = config(
        Some(PaginationPolicy::page_count("/pages")),
        PipelineConfig::default(),
    );
    let handler = SourceHandler::new(handler).unwrap();
    let body = br#"{"pages": 3, "releases": []}"#;
    let effects = handler.handle_response(response("http://x/list.json", 200, body, 0));
    let (requests, emitted, failed) = split(effects);
    assert_eq!(
        requests.iter().map(Url::as_str).collect::<Vec<_>>(),
        vec!["http://x/list.json?page=2", "http://x/list.json?page=3"]
    );
    assert_eq!(emitted, 1);
    assert_eq!(failed, 0);
}

#[test]
fn later_pages_plan_nothing_further() {
    let handler = SourceHandler::new(config(
        Some(PaginationPolicy::page_count("/pages")),
        PipelineConfig::default(),
    ))
    .unwrap();
    let body = br#"{"pages": 3, "releases": []}"#;
    let effects = handler.handle_response(response("http://x/list.json?page=2", 200, body, 1));
    let (requests, emitted, failed) = split(effects);
    assert!(requests.is_empty());
    assert_eq!((emitted, failed), (1, 0));
}

#[test]
fn an_http_failure_is_one_error_effect_and_nothing_else() {
    let handler = SourceHandler::new(config(
        Some(PaginationPolicy::page_count("/pages")),
        PipelineConfig::default(),
    ))
    .unwrap();
    let effects = handler.handle_response(response("http://x/list.json", 503, b"oops", 0));
    assert_eq!(effects.len(), 1);
    match &effects[0] {
        CrawlEffect::Fail(error) => {
            assert_eq!(error.details, ErrorDetails::HttpStatus { code: 503 });
        }
        other => panic!("expected a failure effect, got {other:?}"),
    }
}

#[test]
fn an_upstream_error_envelope_fails_the_request() {
    let handler = SourceHandler::new(config(
        Some(PaginationPolicy::page_count("/pages")),
        PipelineConfig::default(),
    ))
    .unwrap();
    let body = br#"{"error": "quota exceeded"}"#;
    let effects = handler.handle_response(response("http://x/list.json", 200, body, 0));
    assert_eq!(effects.len(), 1);
    match &effects[0] {
        CrawlEffect::Fail(error) => {
            assert!(matches!(error.details, ErrorDetails::Upstream { .. }));
        }
        other => panic!("expected a failure effect, got {other:?}"),
    }
}

#[test]
fn a_link_following_source_requests_the_next_page() {
    let handler = SourceHandler::new(config(
        Some(PaginationPolicy::next_link()),
        PipelineConfig::default(),
    ))
    .unwrap();
    let body = br#"{"links": {"next": "http://x/page2"}, "releases": []}"#;
    let effects = handler.handle_response(response("http://x/page1", 200, body, 0));
    let (requests, emitted, failed) = split(effects);
    assert_eq!(requests.iter().map(Url::as_str).collect::<Vec<_>>(), vec!["http://x/page2"]);
    assert_eq!((emitted, failed), (1, 0));
}

#[test]
fn a_missing_first_next_link_fails_without_emitting() {
    let handler = SourceHandler::new(config(
        Some(PaginationPolicy::next_link()),
        PipelineConfig::default(),
    ))
    .unwrap();
    let body = br#"{"links": {}, "releases": []}"#;
    let effects = handler.handle_response(response("http://x/page1", 200, body, 0));
    assert_eq!(effects.len(), 1);
    match &effects[0] {
        // The walk could not start; that is a termination condition, not a
        // parse failure.
        CrawlEffect::Fail(error) => {
            assert!(matches!(error.details, ErrorDetails::Termination { .. }));
        }
        other => panic!("expected a failure effect, got {other:?}"),
    }
}

#[test]
fn a_sample_of_one_emits_the_first_artifact_and_stops_requesting() {
    let pipeline = PipelineConfig {
        budget: SampleBudget::capped(1),
        ..PipelineConfig::default()
    };
    let handler =
        SourceHandler::new(config(Some(PaginationPolicy::page_count("/pages")), pipeline))
            .unwrap();
    let body = br#"{"pages": 100, "releases": []}"#;
    let effects = handler.handle_response(response("http://x/list.json", 200, body, 0));
    let (requests, emitted, failed) = split(effects);
    assert!(requests.is_empty());
    assert_eq!((emitted, failed), (1, 0));
}

#[test]
fn an_unpaginated_source_just_emits() {
    let handler = SourceHandler::new(config(None, PipelineConfig::default())).unwrap();
    let body = br#"{"releases": []}"#;
    let effects = handler.handle_response(response("http://x/all.json", 200, body, 0));
    let (requests, emitted, failed) = split(effects);
    assert!(requests.is_empty());
    assert_eq!((emitted, failed), (1, 0));
}

#[test]
fn invalid_source_configuration_fails_construction() {
    let bad = config(
        Some(PaginationPolicy::page_count("no-leading-slash")),
        PipelineConfig::default(),
    );
    assert!(SourceHandler::new(bad).is_err());
}
