//! Worker loop tests: tasks flow from the queue through the checker, the
//! tagger and the certificate probe

use crate::{temp_storage, test_config, StubBrowser};
use linkwatch::crawler::{HttpFetcher, LinkChecker};
use linkwatch::dispatch::{Task, TaskQueue, Worker, WorkerReport};
use linkwatch::proxy::ProxyRotator;
use linkwatch::ssl::SslProbe;
use linkwatch::storage::{SharedStorage, Storage, TagProperty, TaskStatus};
use linkwatch::tagger::DomainTagger;
use linkwatch::CheckStatus;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = r#"<html><body>
    <p>The quick brown fox jumps over the lazy dog while we write a few plain
    English sentences around the partner link so detection has enough text.</p>
    <a href="https://acceptor.example/">Expected Anchor</a>
</body></html>"#;

fn worker(storage: &SharedStorage, browser: Arc<StubBrowser>) -> Worker {
    let config = test_config("");
    let http = Arc::new(HttpFetcher::new("test", 20));
    let checker = LinkChecker::new(
        config.checker.clone(),
        ProxyRotator::default(),
        http.clone(),
        browser.clone(),
        storage.clone(),
    );
    let tagger = DomainTagger::new(
        config.tagger.clone(),
        ProxyRotator::default(),
        http,
        browser,
        storage.clone(),
    );
    let ssl = SslProbe::new(config.ssl.clone(), storage.clone());
    Worker::with_parts(&config, storage.clone(), checker, tagger, ssl)
}

#[tokio::test]
async fn test_check_task_runs_follow_ups() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/post"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .mount(&server)
        .await;

    let (_dir, storage) = temp_storage();
    let link_id = storage
        .lock()
        .unwrap()
        .insert_link(
            &format!("{}/post", server.uri()),
            "https://acceptor.example",
            "Expected Anchor",
        )
        .unwrap();
    let task_id = storage
        .lock()
        .unwrap()
        .push(&Task::CheckLinksByIdList { ids: vec![link_id] })
        .unwrap();

    let browser = Arc::new(StubBrowser::serving(PAGE));
    let report = worker(&storage, browser).run(true).await.unwrap();

    // The check itself, then tagging of the new donor domain, then SSL probes.
    assert_eq!(report, WorkerReport { completed: 3, failed: 0 });

    let storage = storage.lock().unwrap();
    assert_eq!(
        storage.get_task(task_id).unwrap().unwrap().status,
        TaskStatus::Done
    );

    let link = storage.get_link(link_id).unwrap();
    assert_eq!(link.last_status, Some(CheckStatus::Green));

    let donor_id = link.donor_domain_id.unwrap();
    let languages = storage.get_domain_tags(donor_id, TagProperty::Language).unwrap();
    assert_eq!(languages.len(), 1);
    assert_eq!(languages[0].name, "eng");
    assert!(storage.pending_domains().unwrap().is_empty());

    // curl is not available at the configured path, so the expiry stays unset.
    let result = storage.get_check_result(link.last_result_id.unwrap()).unwrap();
    assert_eq!(result.ssl_expires_at, None);
    assert_eq!(result.ssl_days_left, None);
}

#[tokio::test]
async fn test_failing_task_is_retried_then_parked() {
    let (_dir, storage) = temp_storage();
    let task_id = storage
        .lock()
        .unwrap()
        .push(&Task::CheckLinkById { id: 404 })
        .unwrap();

    let report = worker(&storage, Arc::new(StubBrowser::failing()))
        .run(true)
        .await
        .unwrap();

    assert_eq!(report, WorkerReport { completed: 0, failed: 2 });
    let task = storage.lock().unwrap().get_task(task_id).unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 2);
    assert!(task.error.is_some());
}

#[tokio::test]
async fn test_undecodable_task_is_skipped() {
    let (_dir, storage) = temp_storage();
    storage
        .lock()
        .unwrap()
        .push_task("check_everything", "{\"kind\":\"check_everything\"}")
        .unwrap();
    storage.lock().unwrap().push(&Task::CheckAllLinks).unwrap();

    let report = worker(&storage, Arc::new(StubBrowser::failing()))
        .run(true)
        .await
        .unwrap();

    assert_eq!(report, WorkerReport { completed: 1, failed: 1 });
}

#[tokio::test]
async fn test_tag_domains_task_with_held_lock_leaves_queue() {
    let (_dir, storage) = temp_storage();
    let domain_id = {
        let mut guard = storage.lock().unwrap();
        let (domain, _) = guard.get_or_create_donor_domain("donor.example").unwrap();
        guard.try_acquire_drain_lock("other-process", 3_600).unwrap();
        guard
            .push(&Task::CheckDonorDomainsWithTagger {
                domain_ids: vec![domain.id, domain.id],
            })
            .unwrap();
        domain.id
    };

    let report = worker(&storage, Arc::new(StubBrowser::failing()))
        .run(true)
        .await
        .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(storage.lock().unwrap().pending_domains().unwrap(), vec![domain_id]);
}
