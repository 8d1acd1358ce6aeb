use collector_core::{ErrorDetails, SampleBudget};
use collector_engine::{
    ChronologicalOrder, CursorPlan, FollowUp, Limit, PaginationError, PaginationPolicy,
    PlanOutcome, Planner, ResultCountMode,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use url::Url;

fn planner(policy: PaginationPolicy) -> Planner {
    Planner::new(policy, ChronologicalOrder::Descending, SampleBudget::unlimited())
        .expect("valid policy")
}

fn urls(requests: &[FollowUp]) -> Vec<String> {
    requests.iter().map(|r| r.url.to_string()).collect()
}

fn requests(outcome: PlanOutcome) -> Vec<FollowUp> {
    match outcome {
        PlanOutcome::Requests(requests) => requests,
        PlanOutcome::UpstreamError(error) => panic!("unexpected upstream error: {error:?}"),
    }
}

#[test]
fn page_count_enumerates_the_remaining_pages() {
    let planner = planner(PaginationPolicy::page_count("/pages"));
    let first = Url::parse("http://x/list").unwrap();
    let outcome = planner
        .plan_from_first(&first, &json!({"pages": 5}), "list")
        .unwrap();
    let got = requests(outcome);
    assert_eq!(
        urls(&got),
        vec![
            "http://x/list?page=2",
            "http://x/list?page=3",
            "http://x/list?page=4",
            "http://x/list?page=5",
        ]
    );
    // Earlier pages hold newer data; they are serviced first.
    let priorities: Vec<i64> = got.iter().map(|r| r.priority).collect();
    assert_eq!(priorities, vec![0, -1, -2, -3]);
}

#[test]
fn page_count_with_a_base_url_includes_the_start_page() {
    let policy = PaginationPolicy::PageCount {
        pointer: "/pages".to_string(),
        page_param: "page".to_string(),
        start_page: 1,
        base_url: Some(Url::parse("http://x/index").unwrap()),
    };
    let first = Url::parse("http://x/summary").unwrap();
    let outcome = planner(policy)
        .plan_from_first(&first, &json!({"pages": 3}), "summary")
        .unwrap();
    assert_eq!(
        urls(&requests(outcome)),
        vec![
            "http://x/index?page=1",
            "http://x/index?page=2",
            "http://x/index?page=3",
        ]
    );
}

#[test]
fn page_count_of_zero_plans_nothing() {
    let planner = planner(PaginationPolicy::page_count("/pages"));
    let first = Url::parse("http://x/list").unwrap();
    let outcome = planner
        .plan_from_first(&first, &json!({"pages": 0}), "list")
        .unwrap();
    assert!(requests(outcome).is_empty());
}

#[test]
fn limit_offset_covers_the_count_in_limit_steps() {
    let planner = planner(PaginationPolicy::result_count(
        "/total",
        Limit::Fixed(10),
        ResultCountMode::LimitOffset,
    ));
    let first = Url::parse("http://x/api").unwrap();
    let outcome = planner
        .plan_from_first(&first, &json!({"total": 50}), "api")
        .unwrap();
    assert_eq!(
        urls(&requests(outcome)),
        vec![
            "http://x/api?limit=10&offset=10",
            "http://x/api?limit=10&offset=20",
            "http://x/api?limit=10&offset=30",
            "http://x/api?limit=10&offset=40",
        ]
    );
}

#[test]
fn limit_offset_with_a_base_url_starts_at_offset_zero() {
    let policy = PaginationPolicy::ResultCount {
        count_pointer: "/total".to_string(),
        limit: Limit::Fixed(20),
        mode: ResultCountMode::LimitOffset,
        page_param: "page".to_string(),
        start_page: 1,
        base_url: Some(Url::parse("http://x/items").unwrap()),
    };
    let first = Url::parse("http://x/count").unwrap();
    let outcome = planner(policy)
        .plan_from_first(&first, &json!({"total": 45}), "count")
        .unwrap();
    assert_eq!(
        urls(&requests(outcome)),
        vec![
            "http://x/items?limit=20&offset=0",
            "http://x/items?limit=20&offset=20",
            "http://x/items?limit=20&offset=40",
        ]
    );
}

#[test]
fn result_count_can_page_instead_of_offsetting() {
    let planner = planner(PaginationPolicy::result_count(
        "/meta/total",
        Limit::Fixed(10),
        ResultCountMode::UsePage,
    ));
    let first = Url::parse("http://x/api").unwrap();
    let outcome = planner
        .plan_from_first(&first, &json!({"meta": {"total": 45}}), "api")
        .unwrap();
    assert_eq!(
        urls(&requests(outcome)),
        vec![
            "http://x/api?page=2",
            "http://x/api?page=3",
            "http://x/api?page=4",
            "http://x/api?page=5",
        ]
    );
}

#[test]
fn limit_can_come_from_the_first_page() {
    let planner = planner(PaginationPolicy::result_count(
        "/total",
        Limit::Pointer("/page_size".to_string()),
        ResultCountMode::LimitOffset,
    ));
    let first = Url::parse("http://x/api").unwrap();
    let outcome = planner
        .plan_from_first(&first, &json!({"total": 30, "page_size": 15}), "api")
        .unwrap();
    assert_eq!(urls(&requests(outcome)), vec!["http://x/api?limit=15&offset=15"]);
}

#[test]
fn enumeration_stops_at_the_sample_budget() {
    let budget = SampleBudget::capped(3);
    // The first request was already issued against the same budget.
    assert!(budget.try_take());
    let planner = Planner::new(
        PaginationPolicy::page_count("/pages"),
        ChronologicalOrder::Descending,
        budget,
    )
    .unwrap();
    let first = Url::parse("http://x/list").unwrap();
    let outcome = planner
        .plan_from_first(&first, &json!({"pages": 100}), "list")
        .unwrap();
    let got = requests(outcome);
    assert_eq!(
        urls(&got),
        vec!["http://x/list?page=2", "http://x/list?page=3"]
    );
}

#[test]
fn ascending_sources_get_flat_priorities() {
    let planner = Planner::new(
        PaginationPolicy::page_count("/pages"),
        ChronologicalOrder::Ascending,
        SampleBudget::unlimited(),
    )
    .unwrap();
    let first = Url::parse("http://x/list").unwrap();
    let outcome = planner
        .plan_from_first(&first, &json!({"pages": 4}), "list")
        .unwrap();
    assert!(requests(outcome).iter().all(|r| r.priority == 0));
}

#[test]
fn a_missing_count_pointer_is_an_error() {
    let planner = planner(PaginationPolicy::page_count("/pages"));
    let first = Url::parse("http://x/list").unwrap();
    let got = planner.plan_from_first(&first, &json!({"count": 5}), "list");
    assert!(matches!(got, Err(PaginationError::Pointer { .. })));
}

#[test]
fn an_upstream_error_envelope_preempts_planning() {
    let planner = planner(PaginationPolicy::page_count("/pages"));
    let first = Url::parse("http://x/list").unwrap();
    let body = json!({"error": "down for maintenance"});
    let outcome = planner.plan_from_first(&first, &body, "list").unwrap();
    match outcome {
        PlanOutcome::UpstreamError(error) => {
            assert_eq!(error.name, "list");
            assert_eq!(error.details, ErrorDetails::Upstream { body });
        }
        PlanOutcome::Requests(requests) => panic!("planned {requests:?} from an error body"),
    }
}

#[test]
fn invalid_configuration_fails_before_any_request() {
    let bad_pointer = Planner::new(
        PaginationPolicy::page_count("pages"),
        ChronologicalOrder::Descending,
        SampleBudget::unlimited(),
    );
    assert!(matches!(bad_pointer, Err(PaginationError::Config { .. })));

    let zero_limit = Planner::new(
        PaginationPolicy::result_count("/total", Limit::Fixed(0), ResultCountMode::LimitOffset),
        ChronologicalOrder::Descending,
        SampleBudget::unlimited(),
    );
    assert!(matches!(zero_limit, Err(PaginationError::Config { .. })));
}

#[test]
fn next_link_is_resolved_relative_to_the_current_page() {
    let planner = planner(PaginationPolicy::next_link());
    let url = Url::parse("http://x/a/page1").unwrap();
    let body = br#"{"links": {"next": "page2?since=9"}}"#;
    let got = planner.next_link(&url, body, 0, false).unwrap();
    assert_eq!(
        got,
        Some(FollowUp {
            url: Url::parse("http://x/a/page2?since=9").unwrap(),
            priority: 0,
        })
    );
}

#[test]
fn a_first_page_without_a_next_link_is_an_error() {
    let planner = planner(PaginationPolicy::next_link());
    let url = Url::parse("http://x/page1").unwrap();
    let got = planner.next_link(&url, br#"{"links": {}}"#, 0, false);
    assert!(matches!(got, Err(PaginationError::MissingNextLink { .. })));
}

#[test]
fn a_missing_link_ends_the_walk_quietly_on_later_pages() {
    let planner = planner(PaginationPolicy::next_link());
    let url = Url::parse("http://x/page7").unwrap();
    let got = planner.next_link(&url, br#"{"links": {}}"#, 6, false).unwrap();
    assert_eq!(got, None);
}

#[test]
fn active_filters_excuse_an_empty_first_page() {
    let planner = planner(PaginationPolicy::next_link());
    let url = Url::parse("http://x/page1?from=2030-01-01").unwrap();
    let got = planner.next_link(&url, br#"{"links": {}}"#, 0, true).unwrap();
    assert_eq!(got, None);
}

#[test]
fn a_sample_of_one_never_parses_the_body() {
    let planner = Planner::new(
        PaginationPolicy::next_link(),
        ChronologicalOrder::Descending,
        SampleBudget::capped(1),
    )
    .unwrap();
    let url = Url::parse("http://x/page1").unwrap();
    let got = planner.next_link(&url, b"not json at all", 0, false).unwrap();
    assert_eq!(got, None);
}

#[test]
fn an_exhausted_budget_stops_the_walk() {
    let budget = SampleBudget::capped(2);
    assert!(budget.try_take());
    assert!(budget.try_take());
    let planner = Planner::new(
        PaginationPolicy::next_link(),
        ChronologicalOrder::Descending,
        budget,
    )
    .unwrap();
    let url = Url::parse("http://x/page2").unwrap();
    let body = br#"{"links": {"next": "page3"}}"#;
    assert_eq!(planner.next_link(&url, body, 1, false).unwrap(), None);
}

struct LetterPlan;

impl CursorPlan for LetterPlan {
    fn cursors(&self, first_page: &Value) -> Vec<Value> {
        first_page["letters"]
            .as_array()
            .cloned()
            .unwrap_or_default()
    }

    fn request(&self, first_url: &Url, cursor: &Value) -> Result<Url, PaginationError> {
        let mut url = first_url.clone();
        url.query_pairs_mut()
            .append_pair("letter", cursor.as_str().unwrap_or(""));
        Ok(url)
    }
}

#[test]
fn a_custom_plan_supplies_its_own_cursors() {
    let planner = planner(PaginationPolicy::Custom(Box::new(LetterPlan)));
    let first = Url::parse("http://x/list").unwrap();
    let outcome = planner
        .plan_from_first(&first, &json!({"letters": ["a", "b"]}), "list")
        .unwrap();
    assert_eq!(
        urls(&requests(outcome)),
        vec!["http://x/list?letter=a", "http://x/list?letter=b"]
    );
}
