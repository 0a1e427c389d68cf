//! Integration tests for the archive drivers against mock services.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use eprints2archives_core::services::{ArchiveDriver, ServiceStatus};
use eprints2archives_core::{ArchiveToday, InternetArchive, InterruptToken, NetClient, NetError};
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn net() -> NetClient {
    NetClient::new(InterruptToken::new()).expect("client construction")
}

/// Collects driver status notifications for assertions.
fn status_recorder() -> (Arc<Mutex<Vec<ServiceStatus>>>, impl Fn(ServiceStatus) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = Arc::clone(&seen);
        move |status: ServiceStatus| seen.lock().expect("lock").push(status)
    };
    (seen, sink)
}

/// A one-memento TimeMap in link format.
fn timemap_with_memento(original: &str) -> String {
    format!(
        "<{original}>; rel=\"original\",\n\
         <https://archive.test/web/20200101000000/{original}>; \
         rel=\"first last memento\"; datetime=\"Wed, 01 Jan 2020 00:00:00 GMT\"\n"
    )
}

// ==================== Internet Archive ====================

#[tokio::test]
async fn test_ia_submits_when_no_mementos_exist() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/web/timemap/link/.*"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("^/save/.*"))
        .and(body_string_contains("url=https%3A%2F%2Fex.org%2Fpaper.pdf"))
        .and(body_string_contains("capture_all=on"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let interrupt = InterruptToken::new();
    let driver = InternetArchive::with_base_url(net(), interrupt, server.uri());
    let (_, sink) = status_recorder();
    let outcome = driver
        .save("https://ex.org/paper.pdf", &sink, false)
        .await
        .expect("save");
    assert!(outcome.added);
    assert_eq!(outcome.existing, 0);
}

#[tokio::test]
async fn test_ia_skips_when_memento_exists() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/web/timemap/link/.*"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(timemap_with_memento("https://ex.org/x")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let interrupt = InterruptToken::new();
    let driver = InternetArchive::with_base_url(net(), interrupt, server.uri());
    let (_, sink) = status_recorder();
    let outcome = driver
        .save("https://ex.org/x", &sink, false)
        .await
        .expect("save");
    assert!(!outcome.added);
    assert_eq!(outcome.existing, 1);
}

#[tokio::test]
async fn test_ia_force_skips_existence_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/web/timemap/link/.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("^/save/.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let interrupt = InterruptToken::new();
    let driver = InternetArchive::with_base_url(net(), interrupt, server.uri());
    let (_, sink) = status_recorder();
    let outcome = driver
        .save("https://ex.org/x", &sink, true)
        .await
        .expect("save");
    assert!(outcome.added);
    assert_eq!(outcome.existing, -1);
}

#[tokio::test]
async fn test_ia_spaces_normalised_before_submission() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/web/timemap/link/https://ex.org/a_b"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/save/https://ex.org/a_b"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let interrupt = InterruptToken::new();
    let driver = InternetArchive::with_base_url(net(), interrupt, server.uri());
    let (_, sink) = status_recorder();
    let outcome = driver
        .save("  https://ex.org/a b ", &sink, false)
        .await
        .expect("save");
    assert!(outcome.added);
}

#[tokio::test]
async fn test_ia_retries_immediately_after_first_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/web/timemap/link/.*"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    // First submit attempt fails with a server error, the second succeeds.
    Mock::given(method("POST"))
        .and(path_regex("^/save/.*"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("^/save/.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let interrupt = InterruptToken::new();
    let driver = InternetArchive::with_base_url(net(), interrupt, server.uri());
    let (seen, sink) = status_recorder();
    let start = Instant::now();
    let outcome = driver
        .save("https://ex.org/x", &sink, false)
        .await
        .expect("save");
    assert!(outcome.added);
    // No pause before the first retry.
    assert!(start.elapsed().as_secs() < 5);
    assert!(!seen.lock().expect("lock").contains(&ServiceStatus::PausedError));
}

// This test really sleeps through the 10 s rate-limit pause.
#[tokio::test]
async fn test_ia_rate_limit_pauses_and_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex("^/web/timemap/link/.*"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("^/save/.*"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex("^/save/.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let interrupt = InterruptToken::new();
    let driver = InternetArchive::with_base_url(net(), interrupt, server.uri());
    let (seen, sink) = status_recorder();
    let outcome = driver
        .save("https://ex.org/x", &sink, false)
        .await
        .expect("save");
    assert!(outcome.added);
    let statuses = seen.lock().expect("lock").clone();
    assert_eq!(
        statuses,
        vec![ServiceStatus::PausedRateLimit, ServiceStatus::Running]
    );
}

// ==================== Archive.today ====================

/// Mounts a working Archive.today mock: front page with a submitid, empty
/// TimeMap, and a submit endpoint answering with a Refresh header.
async fn mount_working_archive_today(server: &MockServer, submit_id: &str) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><form><input type=\"hidden\" name=\"submitid\" \
             value=\"{submit_id}\"/></form></html>"
        )))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/timemap/.*"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/submit/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Refresh", "0;url=https://archive.test/saved/abc"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_at_submits_via_adopted_host() {
    let server = MockServer::start().await;
    mount_working_archive_today(&server, "sid-1").await;

    let interrupt = InterruptToken::new();
    let driver = ArchiveToday::with_hosts(net(), interrupt, vec![server.uri()]);
    let (_, sink) = status_recorder();
    let outcome = driver
        .save("https://ex.org/x", &sink, false)
        .await
        .expect("save");
    assert!(outcome.added);
    assert_eq!(outcome.existing, 0);
}

#[tokio::test]
async fn test_at_submit_body_orders_submitid_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<input type=\"hidden\" name=\"submitid\" value=\"sid-9\"/>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/timemap/.*"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/submit/"))
        .and(body_string_contains("submitid=sid-9&url="))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Refresh", "0;url=https://a.test/s"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let interrupt = InterruptToken::new();
    let driver = ArchiveToday::with_hosts(net(), interrupt, vec![server.uri()]);
    let (_, sink) = status_recorder();
    let outcome = driver
        .save("https://ex.org/x", &sink, false)
        .await
        .expect("save");
    assert!(outcome.added);
}

#[tokio::test]
async fn test_at_host_failover_adopts_second_host() {
    let bad = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&bad)
        .await;
    // The first host must never see TimeMap or submit traffic.
    Mock::given(method("GET"))
        .and(path_regex("^/timemap/.*"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&bad)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&bad)
        .await;

    let good = MockServer::start().await;
    mount_working_archive_today(&good, "sid-2").await;

    let interrupt = InterruptToken::new();
    let driver = ArchiveToday::with_hosts(net(), interrupt, vec![bad.uri(), good.uri()]);
    let (_, sink) = status_recorder();

    let first = driver
        .save("https://ex.org/x", &sink, false)
        .await
        .expect("save");
    assert!(first.added);

    // The adopted host persists for subsequent saves.
    let second = driver
        .save("https://ex.org/y", &sink, false)
        .await
        .expect("save");
    assert!(second.added);
}

#[tokio::test]
async fn test_at_existing_memento_skips_submission() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<input type=\"hidden\" name=\"submitid\" value=\"sid-3\"/>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/timemap/.*"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(timemap_with_memento("https://ex.org/x")),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let interrupt = InterruptToken::new();
    let driver = ArchiveToday::with_hosts(net(), interrupt, vec![server.uri()]);
    let (_, sink) = status_recorder();
    let outcome = driver
        .save("https://ex.org/x", &sink, false)
        .await
        .expect("save");
    assert!(!outcome.added);
    assert_eq!(outcome.existing, 1);
}

#[tokio::test]
async fn test_at_unusable_front_page_is_internal_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>no form here</html>"))
        .mount(&server)
        .await;

    let interrupt = InterruptToken::new();
    let driver = ArchiveToday::with_hosts(net(), interrupt, vec![server.uri()]);
    let (_, sink) = status_recorder();
    let err = driver
        .save("https://ex.org/x", &sink, false)
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::Internal { .. }));
}

#[tokio::test]
async fn test_at_no_host_answering_marks_unavailable() {
    // A port with nothing listening: connections are refused outright.
    let dead = MockServer::start().await;
    let dead_uri = dead.uri();
    drop(dead);

    let interrupt = InterruptToken::new();
    let driver = ArchiveToday::with_hosts(net(), interrupt, vec![dead_uri]);
    let (seen, sink) = status_recorder();

    let outcome = driver
        .save("https://ex.org/x", &sink, false)
        .await
        .expect("an unavailable service is not an error");
    assert!(!outcome.added);
    assert_eq!(outcome.existing, -1);
    assert!(seen.lock().expect("lock").contains(&ServiceStatus::Unavailable));

    // Subsequent saves answer immediately without network traffic.
    let again = driver
        .save("https://ex.org/y", &sink, false)
        .await
        .expect("still not an error");
    assert_eq!(again.existing, -1);
}
