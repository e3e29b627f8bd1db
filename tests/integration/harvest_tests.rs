//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for employer sites, their robots.txt
//! and the render service, and run full harvests against a temporary
//! SQLite database.

use chrono::{Duration, Utc};
use job_harvest::config::parse_config;
use job_harvest::storage::{SourceRecord, Storage, TriggerType};
use job_harvest::{RunSummary, Runner};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SELECTORS: &str = r#"
[source.extraction]
kind = "selectors"
container = ".job"
title = ".title"
link = "a"
location = ".location"
next-page = "a.next"
"#;

/// Builds a config with one source named "Clinic" at the mock server
fn config_toml(server: &MockServer, db_path: &str, source_extra: &str, extra: &str) -> String {
    format!(
        r#"
[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[http]
default-crawl-delay-ms = 0
robots-timeout-secs = 5
request-timeout-secs = 5

[output]
database-path = "{db}"

{extra}

[[source]]
name = "Clinic"
base-url = "{uri}"
listing-url = "{uri}/jobs"
organization = "Yukon Clinic"
default-state = "AK"
{source_extra}
"#,
        db = db_path,
        uri = server.uri(),
        extra = extra,
        source_extra = source_extra,
    )
}

fn runner_for(toml: &str) -> Runner {
    let config = parse_config(toml).expect("valid test config");
    Runner::from_config(config, Some("test-hash".to_string())).expect("runner")
}

fn db_path(dir: &TempDir) -> String {
    dir.path().join("harvest.db").to_string_lossy().to_string()
}

/// A listing page with `count` jobs numbered from `first`
fn listing_page(first: usize, count: usize, next: Option<&str>) -> String {
    let jobs: String = (first..first + count)
        .map(|n| {
            format!(
                r#"<div class="job">
                     <h3 class="title">Position {n}</h3>
                     <a href="/jobs/{n}">Details</a>
                     <span class="location">Bethel, AK 99559</span>
                   </div>"#,
                n = n
            )
        })
        .collect();
    let next = next
        .map(|href| format!(r#"<a class="next" href="{}">Next</a>"#, href))
        .unwrap_or_default();
    format!("<html><body>{}{}</body></html>", jobs, next)
}

async fn mount_robots_404(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, page_path: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn clinic(runner: &Runner) -> SourceRecord {
    let storage = runner.storage();
    let storage = storage.lock().unwrap();
    let source = storage.get_source_by_name("Clinic").unwrap().unwrap();
    source
}

fn assert_single_success(summary: &RunSummary) {
    assert!(summary.error.is_none(), "run error: {:?}", summary.error);
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(summary.outcomes[0].error, None);
}

#[tokio::test]
async fn test_two_pages_of_new_jobs() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    mount_page(&server, "/jobs", listing_page(1, 3, Some("/jobs/page/2"))).await;
    mount_page(&server, "/jobs/page/2", listing_page(4, 3, None)).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!((summary.found, summary.added, summary.updated), (6, 6, 0));

    let source = clinic(&runner);
    assert_eq!(source.last_scrape_success, Some(true));

    let storage = runner.storage();
    let storage = storage.lock().unwrap();
    let postings = storage.list_postings(source.id).unwrap();
    assert_eq!(postings.len(), 6);

    let first = &postings[0];
    assert_eq!(first.title, "Position 1");
    assert_eq!(first.url, format!("{}/jobs/1", server.uri()));
    assert_eq!(first.organization.as_deref(), Some("Yukon Clinic"));
    assert_eq!(first.state.as_deref(), Some("AK"));
    assert_eq!(first.external_id.len(), 32);
    assert_eq!(first.first_seen_at, first.last_seen_at);
    assert!(!first.is_stale);
}

#[tokio::test]
async fn test_run_log_is_written() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    mount_page(&server, "/jobs", listing_page(1, 2, None)).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::Scheduled).await;

    let run_id = summary.run_log_id.expect("run log id");
    let storage = runner.storage();
    let storage = storage.lock().unwrap();

    let runs = storage.recent_runs(5).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, run_id);
    assert_eq!(runs[0].trigger, TriggerType::Scheduled);
    assert!(runs[0].success);
    assert_eq!(runs[0].jobs_added, 2);
    assert_eq!(runs[0].config_hash.as_deref(), Some("test-hash"));

    let lines = storage.run_sources(run_id).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].source_name, "Clinic");
    assert_eq!(lines[0].found, 2);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    mount_page(&server, "/jobs", listing_page(1, 3, None)).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    runner.run_all(TriggerType::ManualAll).await;
    let before = {
        let source = clinic(&runner);
        let storage = runner.storage();
        let storage = storage.lock().unwrap();
        let postings = storage.list_postings(source.id).unwrap();
        postings
    };

    let summary = runner.run_all(TriggerType::ManualAll).await;
    assert_single_success(&summary);
    assert_eq!((summary.found, summary.added, summary.updated), (3, 0, 0));

    let source = clinic(&runner);
    let storage = runner.storage();
    let storage = storage.lock().unwrap();
    let after = storage.list_postings(source.id).unwrap();

    assert_eq!(before.len(), after.len());
    for (old, new) in before.iter().zip(&after) {
        assert_eq!(old.id, new.id);
        assert_eq!(old.title, new.title);
        assert_eq!(old.first_seen_at, new.first_seen_at);
        assert_eq!(old.updated_at, new.updated_at);
        assert!(new.last_seen_at > old.last_seen_at);
    }
}

#[tokio::test]
async fn test_pagination_stops_at_max_pages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    mount_page(&server, "/jobs", listing_page(1, 1, Some("/jobs/page/2"))).await;
    mount_page(&server, "/jobs/page/2", listing_page(2, 1, Some("/jobs/page/3"))).await;
    Mock::given(method("GET"))
        .and(path("/jobs/page/3"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(3, 1, None)))
        .expect(0)
        .mount(&server)
        .await;

    let selectors = format!("{}max-pages = 2\n", SELECTORS);
    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), &selectors, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!(summary.found, 2);
}

#[tokio::test]
async fn test_pagination_cycle_guard() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(listing_page(1, 2, Some("/jobs/page/2"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/jobs/page/2", listing_page(3, 2, Some("/jobs/"))).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!(summary.found, 4);
}

#[tokio::test]
async fn test_robots_disallow_blocks_source() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nDisallow: /jobs\nAllow: /jobs/public\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(1, 3, None)))
        .expect(0)
        .mount(&server)
        .await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert!(summary.error.is_none());
    assert_eq!(summary.outcomes.len(), 1);
    let error = summary.outcomes[0].error.as_deref().unwrap();
    assert!(error.starts_with("Blocked by robots.txt"), "{}", error);

    let source = clinic(&runner);
    assert!(source.robots_blocked);
    assert!(source.robots_blocked_at.is_some());
    assert_eq!(source.last_scrape_success, Some(false));

    // Blocked sources are skipped until rechecked
    let second = runner.run_all(TriggerType::ManualAll).await;
    assert!(second.outcomes.is_empty());
    assert!(second.success());
}

#[tokio::test]
async fn test_robots_server_error_fails_closed() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(1, 3, None)))
        .expect(0)
        .mount(&server)
        .await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert!(!summary.success());
    assert_eq!(summary.found, 0);
    assert!(clinic(&runner).robots_blocked);
}

#[tokio::test]
async fn test_html_robots_is_treated_as_unavailable() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string("<html><body>Page not found</body></html>"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(1, 3, None)))
        .expect(0)
        .mount(&server)
        .await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert!(!summary.success());
    assert_eq!(summary.found, 0);
    assert!(clinic(&runner).robots_blocked);
}

#[tokio::test]
async fn test_robots_timeout_blocks_source() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("User-agent: *\nAllow: /\n")
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(1, 3, None)))
        .expect(0)
        .mount(&server)
        .await;

    let toml = config_toml(&server, &db_path(&dir), SELECTORS, "")
        .replace("robots-timeout-secs = 5", "robots-timeout-secs = 1");
    let mut runner = runner_for(&toml);
    let summary = runner.run_all(TriggerType::ManualAll).await;

    let error = summary.outcomes[0].error.as_deref().unwrap();
    assert!(error.starts_with("Blocked by robots.txt"), "{}", error);
    assert_eq!(summary.found, 0);
    assert!(clinic(&runner).robots_blocked);
}

#[tokio::test]
async fn test_unreachable_origin_blocks_source() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let dead_uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let toml = config_toml(&server, &db_path(&dir), SELECTORS, "").replace(&server.uri(), &dead_uri);
    let mut runner = runner_for(&toml);
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert!(summary.error.is_none());
    let error = summary.outcomes[0].error.as_deref().unwrap();
    assert!(error.starts_with("Blocked by robots.txt"), "{}", error);
    assert!(clinic(&runner).robots_blocked);
}

#[tokio::test]
async fn test_redirect_into_disallowed_path_is_not_followed() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/private/list"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(1, 3, None)))
        .expect(0)
        .mount(&server)
        .await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_eq!(
        summary.outcomes[0].error.as_deref(),
        Some(format!("Blocked by robots.txt: {}/private/list", server.uri()).as_str())
    );
    assert_eq!(summary.found, 0);
    // Only the entry URL being denied blocks the whole source
    assert!(!clinic(&runner).robots_blocked);
}

#[tokio::test]
async fn test_redirect_to_allowed_path_is_followed() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/careers"))
        .mount(&server)
        .await;
    mount_page(&server, "/careers", listing_page(1, 2, None)).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!(summary.added, 2);
}

#[tokio::test]
async fn test_robots_server_error_with_allow_policy() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_page(&server, "/jobs", listing_page(1, 3, None)).await;

    let toml = config_toml(
        &server,
        &db_path(&dir),
        SELECTORS,
        "[robots]\non-fetch-error = \"allow\"\n",
    );
    let mut runner = runner_for(&toml);
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!(summary.added, 3);
}

#[tokio::test]
async fn test_bypass_skips_robots() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/jobs", listing_page(1, 3, None)).await;

    let source_extra = format!("bypass-robots = true\n{}", SELECTORS);
    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), &source_extra, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!(summary.added, 3);
}

#[tokio::test]
async fn test_render_failure_falls_back_to_direct_fetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    Mock::given(method("POST"))
        .and(path("/fetch"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/jobs", listing_page(1, 3, None)).await;

    let render = format!("[render]\nservice-url = \"{}\"\ntimeout-secs = 5\n", server.uri());
    let source_extra = format!("use-render = true\n{}", SELECTORS);
    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), &source_extra, &render));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!(summary.added, 3);
}

#[tokio::test]
async fn test_render_timeout_falls_back_to_direct_fetch() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    Mock::given(method("POST"))
        .and(path("/fetch"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "success": true,
                    "url": format!("{}/jobs", server.uri()),
                    "html": listing_page(1, 5, None),
                }))
                // Past the one second page budget plus the grace the client allows
                .set_delay(std::time::Duration::from_secs(8)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(1, 2, None)))
        .expect(1)
        .mount(&server)
        .await;

    let render = format!("[render]\nservice-url = \"{}\"\ntimeout-secs = 1\n", server.uri());
    let source_extra = format!("use-render = true\n{}", SELECTORS);
    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), &source_extra, &render));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!(summary.added, 2);
}

#[tokio::test]
async fn test_rendered_page_is_extracted() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    Mock::given(method("POST"))
        .and(path("/fetch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "url": format!("{}/jobs", server.uri()),
            "html": listing_page(1, 2, None),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let render = format!("[render]\nservice-url = \"{}\"\ntimeout-secs = 5\n", server.uri());
    let source_extra = format!("use-render = true\n{}", SELECTORS);
    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), &source_extra, &render));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!(summary.added, 2);
}

#[tokio::test]
async fn test_direct_fetch_failure_is_source_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert!(summary.error.is_none());
    assert_eq!(
        summary.outcomes[0].error.as_deref(),
        Some(format!("Failed to fetch {}/jobs", server.uri()).as_str())
    );
    // Fetch failures do not block the source
    assert!(!clinic(&runner).robots_blocked);
}

#[tokio::test]
async fn test_empty_listing_is_not_a_failure() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    mount_page(&server, "/jobs", "<html><body>No openings</body></html>".to_string()).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert!(summary.success());
    assert_eq!((summary.found, summary.added, summary.updated), (0, 0, 0));
    assert_eq!(clinic(&runner).last_scrape_success, Some(true));
}

#[tokio::test]
async fn test_duplicate_links_on_listing_count_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    let job = r#"<div class="job"><h3 class="title">Nurse</h3><a href="/jobs/1">Details</a></div>"#;
    mount_page(&server, "/jobs", format!("<html><body>{job}{job}</body></html>", job = job)).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!((summary.found, summary.added, summary.updated), (1, 1, 0));
}

#[tokio::test]
async fn test_partial_failure_keeps_other_records() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;

    let long_title = "x".repeat(600);
    let jobs: String = (1..=5)
        .map(|n| {
            let title = if n == 3 {
                long_title.clone()
            } else {
                format!("Position {}", n)
            };
            format!(
                r#"<div class="job"><h3 class="title">{}</h3><a href="/jobs/{}">Details</a></div>"#,
                title, n
            )
        })
        .collect();
    mount_page(&server, "/jobs", format!("<html><body>{}</body></html>", jobs)).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_eq!((summary.found, summary.added, summary.updated), (4, 4, 0));
    let error = summary.outcomes[0].error.as_deref().unwrap();
    assert!(error.starts_with("Failed to save job"), "{}", error);

    let source = clinic(&runner);
    let storage = runner.storage();
    let storage = storage.lock().unwrap();
    assert_eq!(storage.list_postings(source.id).unwrap().len(), 4);
}

#[tokio::test]
async fn test_lifecycle_marks_stale_then_deletes() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    mount_page(&server, "/jobs", listing_page(1, 3, None)).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    runner.run_all(TriggerType::ManualAll).await;

    let source = clinic(&runner);
    {
        let storage = runner.storage();
        let mut storage = storage.lock().unwrap();
        let posting = &storage.list_postings(source.id).unwrap()[0];
        storage.save_job(42, posting.id, Utc::now()).unwrap();
        assert_eq!(storage.count_saved_jobs().unwrap(), 1);
    }

    let now = Utc::now();
    let report = runner.run_lifecycle(now + Duration::hours(1)).unwrap();
    assert_eq!((report.marked_stale, report.deleted), (0, 0));

    let report = runner.run_lifecycle(now + Duration::hours(25)).unwrap();
    assert_eq!((report.marked_stale, report.deleted), (3, 0));

    let report = runner
        .run_lifecycle(now + Duration::hours(25) + Duration::days(8))
        .unwrap();
    assert_eq!((report.marked_stale, report.deleted), (0, 3));

    let storage = runner.storage();
    let storage = storage.lock().unwrap();
    assert!(storage.list_postings(source.id).unwrap().is_empty());
    assert_eq!(storage.count_saved_jobs().unwrap(), 0);
}

#[tokio::test]
async fn test_seen_again_clears_stale() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    mount_page(&server, "/jobs", listing_page(1, 2, None)).await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    runner.run_all(TriggerType::ManualAll).await;

    // Stale relative to a clock one window behind the next run
    let report = runner
        .run_lifecycle(Utc::now() + Duration::hours(25))
        .unwrap();
    assert_eq!(report.marked_stale, 2);

    let summary = runner.run_all(TriggerType::ManualAll).await;
    assert_eq!((summary.found, summary.added, summary.updated), (2, 0, 2));

    let source = clinic(&runner);
    let storage = runner.storage();
    let storage = storage.lock().unwrap();
    assert!(storage
        .list_postings(source.id)
        .unwrap()
        .iter()
        .all(|p| !p.is_stale && p.stale_since.is_none()));
}

#[tokio::test]
async fn test_recheck_unblocks_source() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&server)
        .await;

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    runner.run_all(TriggerType::ManualAll).await;
    assert!(clinic(&runner).robots_blocked);

    // Cached policy is still the old one until rechecked
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: TestHarvester\nAllow: /\n"),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/jobs", listing_page(1, 2, None)).await;

    assert!(runner.recheck("Clinic").await.unwrap());
    let source = clinic(&runner);
    assert!(!source.robots_blocked);
    assert!(source.robots_blocked_at.is_none());

    let summary = runner.run_single("Clinic").await;
    assert_single_success(&summary);
    assert_eq!(summary.added, 2);
}

#[tokio::test]
async fn test_unknown_source_still_logs_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), SELECTORS, ""));
    let summary = runner.run_single("Nowhere").await;

    assert!(summary.outcomes.is_empty());
    assert_eq!(
        summary.error.as_deref(),
        Some("Unknown or inactive source: Nowhere")
    );

    let storage = runner.storage();
    let storage = storage.lock().unwrap();
    let runs = storage.recent_runs(1).unwrap();
    assert_eq!(runs.len(), 1);
    assert!(!runs[0].success);
    assert_eq!(runs[0].trigger, TriggerType::ManualSingle("Nowhere".to_string()));
    assert!(storage.run_sources(runs[0].id).unwrap().is_empty());
}

#[tokio::test]
async fn test_sitemap_strategy() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let uri = server.uri();
    mount_robots_404(&server).await;

    mount_page(
        &server,
        "/sitemap_index.xml",
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>{uri}/sitemap-jobs.xml</loc></sitemap>
  <sitemap><loc>{uri}/sitemap-missing.xml</loc></sitemap>
</sitemapindex>"#,
            uri = uri
        ),
    )
    .await;
    mount_page(
        &server,
        "/sitemap-jobs.xml",
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{uri}/kotzebue-ak/customer-service-agent/873E0B7E718D43CE8180C9246164D91E/job/</loc></url>
  <url><loc>{uri}/nome-ak/ramp-agent/0A1B2C3D4E5F60718293A4B5C6D7E8F9/job/</loc></url>
  <url><loc>{uri}/seattle-wa/pilot/FFEEDDCCBBAA99887766554433221100/job/</loc></url>
</urlset>"#,
            uri = uri
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/sitemap-missing.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source_extra = format!(
        r#"
[source.extraction]
kind = "custom"
name = "sitemap"

[source.extraction.options]
sitemap-url = "{}/sitemap_index.xml"
url-pattern = "-AK/"
"#,
        uri
    );
    let mut runner = runner_for(&config_toml(&server, &db_path(&dir), &source_extra, ""));
    let summary = runner.run_all(TriggerType::ManualAll).await;

    assert_single_success(&summary);
    assert_eq!(summary.added, 2);

    let source = clinic(&runner);
    let storage = runner.storage();
    let storage = storage.lock().unwrap();
    let posting = storage
        .get_posting(source.id, "873E0B7E718D43CE8180C9246164D91E")
        .unwrap()
        .unwrap();
    assert_eq!(posting.title, "Customer Service Agent");
    assert_eq!(posting.location.as_deref(), Some("Kotzebue, AK"));
    assert_eq!(posting.organization.as_deref(), Some("Yukon Clinic"));
}

#[tokio::test]
async fn test_sources_run_in_name_order() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    mount_robots_404(&server).await;
    mount_page(&server, "/jobs", listing_page(1, 1, None)).await;
    mount_page(&server, "/alpha", listing_page(10, 1, None)).await;

    let mut toml = config_toml(&server, &db_path(&dir), SELECTORS, "");
    toml.push_str(&format!(
        r#"
[[source]]
name = "Alpha Air"
base-url = "{uri}"
listing-url = "{uri}/alpha"
{selectors}
"#,
        uri = server.uri(),
        selectors = SELECTORS
    ));

    let mut runner = runner_for(&toml);
    let summary = runner.run_all(TriggerType::ManualAll).await;

    let names: Vec<&str> = summary
        .outcomes
        .iter()
        .map(|o| o.source_name.as_str())
        .collect();
    assert_eq!(names, vec!["Alpha Air", "Clinic"]);
    assert!(summary.success());
    assert_eq!(summary.added, 2);
}
