//! Whole-batch checks with the real HTTP fetcher and a stub browser

use crate::{temp_storage, test_config, StubBrowser};
use linkwatch::crawler::{HttpFetcher, LinkChecker, StartMode};
use linkwatch::dispatch::{Task, TaskQueue};
use linkwatch::proxy::ProxyRotator;
use linkwatch::storage::{CheckResult, SharedStorage, Storage};
use linkwatch::{CheckStatus, FetchMode};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GOOD: &str = r#"<html><body>
    <p>Partner: <a href="https://acceptor.example/">Expected Anchor</a></p>
</body></html>"#;

const NOFOLLOW: &str = r#"<html><head><meta name="robots" content="noindex"></head><body>
    <a href="https://acceptor.example/" rel="nofollow">Expected Anchor</a>
</body></html>"#;

async fn mount(server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn add_link(storage: &SharedStorage, page_url: &str) -> i64 {
    storage
        .lock()
        .unwrap()
        .insert_link(page_url, "https://acceptor.example", "Expected Anchor")
        .unwrap()
}

fn last_result(storage: &SharedStorage, link_id: i64) -> CheckResult {
    let storage = storage.lock().unwrap();
    let link = storage.get_link(link_id).unwrap();
    storage
        .get_check_result(link.last_result_id.unwrap())
        .unwrap()
        .result
}

#[tokio::test]
async fn test_mixed_batch() {
    let server = MockServer::start().await;
    mount(&server, "/good", 200, GOOD).await;
    mount(&server, "/nofollow", 200, NOFOLLOW).await;
    mount(&server, "/blocked", 403, "").await;
    mount(&server, "/spa", 200, "<html><body><div id=\"app\"></div></body></html>").await;

    let (_dir, storage) = temp_storage();
    let good = add_link(&storage, &format!("{}/good", server.uri()));
    let nofollow = add_link(&storage, &format!("{}/nofollow", server.uri()));
    let blocked = add_link(&storage, &format!("{}/blocked", server.uri()));
    let spa = add_link(&storage, &format!("{}/spa", server.uri()));

    let config = test_config("");
    let browser = Arc::new(StubBrowser::serving(GOOD));
    let checker = LinkChecker::new(
        config.checker.clone(),
        ProxyRotator::default(),
        Arc::new(HttpFetcher::new("test", 20)),
        browser.clone(),
        storage.clone(),
    );

    let links = storage.lock().unwrap().get_all_links().unwrap();
    let report = checker.check_batch(&links, StartMode::Escalating).await.unwrap();

    assert_eq!(report.result_ids.len(), 4);
    assert_eq!(report.green, 3);
    assert_eq!(report.red, 1);

    let result = last_result(&storage, good);
    assert_eq!(result.status, CheckStatus::Green);
    assert_eq!(result.mode, FetchMode::Direct);
    assert_eq!(result.status_codes, vec![200]);
    assert_eq!(result.anchor_text_found.as_deref(), Some("Expected Anchor"));

    let result = last_result(&storage, nofollow);
    assert_eq!(result.status, CheckStatus::Red);
    assert_eq!(result.message, "rel has nofollow;\nrobots has noindex;");
    assert!(result.robots_noindex);

    let result = last_result(&storage, blocked);
    assert_eq!(result.mode, FetchMode::Browser);
    assert_eq!(result.status, CheckStatus::Green);

    let result = last_result(&storage, spa);
    assert_eq!(result.mode, FetchMode::Browser);

    let mut rendered = browser.calls();
    rendered.sort();
    let mut expected = vec![
        format!("{}/blocked", server.uri()),
        format!("{}/spa", server.uri()),
    ];
    expected.sort();
    assert_eq!(rendered, expected);
}

#[tokio::test]
async fn test_batch_queues_follow_up_tasks() {
    let server = MockServer::start().await;
    mount(&server, "/good", 200, GOOD).await;

    let (_dir, storage) = temp_storage();
    add_link(&storage, &format!("{}/good", server.uri()));

    let config = test_config("");
    let checker = LinkChecker::new(
        config.checker.clone(),
        ProxyRotator::default(),
        Arc::new(HttpFetcher::new("test", 20)),
        Arc::new(StubBrowser::failing()),
        storage.clone(),
    );

    let links = storage.lock().unwrap().get_all_links().unwrap();
    let report = checker.check_batch(&links, StartMode::Escalating).await.unwrap();
    assert_eq!(report.new_donor_domains.len(), 1);

    let mut storage = storage.lock().unwrap();
    let tagging = storage.claim().unwrap().unwrap();
    assert!(matches!(tagging.task, Task::CheckDonorDomainsWithTagger { .. }));
    let probing = storage.claim().unwrap().unwrap();
    assert_eq!(
        probing.task,
        Task::ProbeSsl {
            result_ids: report.result_ids.clone()
        }
    );
    assert!(storage.claim().unwrap().is_none());

    drop(storage);

    let again = checker.check_batch(&links, StartMode::Escalating).await.unwrap();
    assert!(again.new_donor_domains.is_empty());
}

#[tokio::test]
async fn test_browser_only_batch_skips_http() {
    let server = MockServer::start().await;

    let (_dir, storage) = temp_storage();
    let id = add_link(&storage, &format!("{}/never-requested", server.uri()));

    let config = test_config("");
    let checker = LinkChecker::new(
        config.checker.clone(),
        ProxyRotator::default(),
        Arc::new(HttpFetcher::new("test", 20)),
        Arc::new(StubBrowser::serving(GOOD)),
        storage.clone(),
    );

    let links = storage.lock().unwrap().get_all_links().unwrap();
    checker.check_batch(&links, StartMode::BrowserOnly).await.unwrap();

    assert!(server.received_requests().await.unwrap_or_default().is_empty());
    let result = last_result(&storage, id);
    assert_eq!(result.mode, FetchMode::Browser);
    assert_eq!(result.message, "ok;\nmode: browser;");
}
