use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use uuid::Uuid;

mod common;
use common::*;

use surface_backend::error::ApiError;
use surface_backend::models::{Scan, ScanStartRequest, ScanStatus};
use surface_backend::services::pipeline::status::INTERRUPTED_SUMMARY;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_crawl_only_template_scans_apex_and_rejects_foreign_hosts() {
    let harness = Harness::new(Fakes {
        crawler: FakeCrawler::with(vec![
            (
                "http://example.com",
                vec![
                    crawl_result("http://example.com/login?next=1&lang=en", 200),
                    crawl_result("http://other.com/admin", 200),
                ],
            ),
            ("https://example.com", vec![crawl_result("https://example.com/login?next=2", 200)]),
        ]),
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_OFF), Some(CRAWL_ON), false, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.results_summary.as_deref(), Some("Scan completed successfully"));
    assert!(scan.completed_at.is_some());

    let mut seeds = harness.crawler.seen_seeds();
    seeds.sort();
    assert_eq!(seeds, strings(&["http://example.com", "https://example.com"]));

    assert_eq!(harness.store.hostnames(&root.id), strings(&["example.com"]));
    assert_eq!(harness.store.endpoint_paths("example.com"), strings(&["/login"]));
    assert_eq!(harness.store.endpoints().len(), 1);

    let params: BTreeSet<String> = harness.store.parameters().into_iter().map(|p| p.name).collect();
    assert_eq!(params, BTreeSet::from(["lang".to_string(), "next".to_string()]));
    assert!(harness.store.root_domain(&root.id).last_scanned_at.is_some());
}

#[tokio::test]
async fn test_apex_is_kept_when_providers_find_nothing() {
    let harness = Harness::new(Fakes {
        prober: FakeProber {
            unresponsive: HashSet::from(["example.com".to_string()]),
            ..FakeProber::default()
        },
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_ON), Some(CRAWL_OFF), false, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(harness.store.hostnames(&root.id), strings(&["example.com"]));
}

#[tokio::test]
async fn test_ip_addresses_are_never_saved_as_subdomains() {
    let harness = Harness::new(Fakes {
        enumerator: FakeEnumerator {
            hosts: strings(&["www.example.com", "10.0.0.1", "2001:db8::1", "[::1]", "192.168.1.1:8080"]),
            ..FakeEnumerator::default()
        },
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_ON), Some(CRAWL_OFF), false, false);
    harness.store.add_template(tpl.clone());

    harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(
        harness.store.hostnames(&root.id),
        strings(&["example.com", "www.example.com"])
    );
}

#[tokio::test]
async fn test_rediscovery_is_idempotent() {
    let harness = Harness::new(Fakes {
        enumerator: FakeEnumerator {
            hosts: strings(&["www.example.com", "api.example.com"]),
            ..FakeEnumerator::default()
        },
        crawler: FakeCrawler::with(vec![(
            "http://www.example.com",
            vec![crawl_result("http://www.example.com/search?q=test", 200)],
        )]),
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_ON), Some(CRAWL_ON), false, false);
    harness.store.add_template(tpl.clone());

    let first = harness.run(root.id, None, Some(tpl.id)).await;
    let hosts_after_first = harness.store.hostnames(&root.id);
    let endpoints_after_first = harness.store.endpoints().len();
    let params_after_first = harness.store.parameters().len();

    let second = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(first.status, ScanStatus::Completed);
    assert_eq!(second.status, ScanStatus::Completed);
    assert_eq!(
        hosts_after_first,
        strings(&["api.example.com", "example.com", "www.example.com"])
    );
    assert_eq!(harness.store.hostnames(&root.id), hosts_after_first);
    assert_eq!(endpoints_after_first, 1);
    assert_eq!(harness.store.endpoints().len(), 1);
    assert_eq!(params_after_first, 1);
    assert_eq!(harness.store.parameters().len(), 1);
}

#[tokio::test]
async fn test_crawl_registers_new_in_scope_hosts() {
    let harness = Harness::new(Fakes {
        crawler: FakeCrawler::with(vec![(
            "http://example.com",
            vec![
                crawl_result("http://cdn.example.com/lib/app", 200),
                crawl_result("http://example.com/broken", 500),
                crawl_result("http://example.com/moved", 301),
            ],
        )]),
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_OFF), Some(CRAWL_ON), false, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(
        harness.store.hostnames(&root.id),
        strings(&["cdn.example.com", "example.com"])
    );
    assert_eq!(harness.store.endpoint_paths("cdn.example.com"), strings(&["/lib/app"]));
    assert_eq!(harness.store.endpoint_paths("example.com"), strings(&["/moved"]));
}

#[tokio::test]
async fn test_unresolved_crawl_hosts_are_dropped() {
    let harness = Harness::new(Fakes {
        crawler: FakeCrawler::with(vec![(
            "http://example.com",
            vec![
                crawl_result("http://ghost.example.com/x", 200),
                crawl_result("http://example.com/ok", 200),
            ],
        )]),
        ..Fakes::default()
    });
    harness.store.hide_host("ghost.example.com");
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_OFF), Some(CRAWL_ON), false, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    let endpoints = harness.store.endpoints();
    assert_eq!(endpoints.len(), 1);
    assert_eq!(endpoints[0].path, "/ok");
    assert!(endpoints.iter().all(|e| !e.subdomain_id.is_nil()));
    assert!(harness.store.parameters().iter().all(|p| !p.endpoint_id.is_nil()));
}

#[tokio::test]
async fn test_enumeration_failure_fails_scan_but_keeps_results() {
    let harness = Harness::new(Fakes {
        enumerator: FakeEnumerator {
            hosts: strings(&["www.example.com"]),
            error: Some("crt.sh unavailable".to_string()),
            ..FakeEnumerator::default()
        },
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_ON), Some(CRAWL_OFF), false, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(scan.status, ScanStatus::Failed);
    let summary = scan.results_summary.unwrap();
    assert!(summary.starts_with("Subdomain enumeration: "), "{}", summary);
    assert!(summary.contains("crt.sh unavailable"));
    assert_eq!(
        harness.store.hostnames(&root.id),
        strings(&["example.com", "www.example.com"])
    );
}

#[tokio::test]
async fn test_discovery_timeout_is_recorded() {
    let harness = Harness::new(Fakes {
        enumerator: FakeEnumerator {
            hosts: strings(&["slow.example.com"]),
            hang: true,
            ..FakeEnumerator::default()
        },
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_ON), Some(CRAWL_OFF), false, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(scan.status, ScanStatus::Failed);
    let summary = scan.results_summary.unwrap();
    assert!(summary.starts_with("Subdomain verification: discovery stage timed out"), "{}", summary);
    assert!(harness.store.hostnames(&root.id).contains(&"example.com".to_string()));
}

#[tokio::test]
async fn test_fingerprint_continues_past_failed_fetches() {
    let harness = Harness::new(Fakes {
        fetcher: FakeFetcher::with(vec![
            ("http://app.example.com", &["nginx", "PHP"]),
            ("http://app.example.com/login", &["wordpress"]),
        ]),
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let app = harness.store.add_subdomain(root.id, "app.example.com");
    harness.store.add_endpoint(app.id, "/login");
    let tpl = template(None, Some(CRAWL_OFF), true, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, Some(app.id), Some(tpl.id)).await;

    assert_eq!(
        harness.store.technologies_for("app.example.com"),
        BTreeSet::from(["nginx".to_string(), "php".to_string(), "wordpress".to_string()])
    );
    assert_eq!(harness.store.endpoint_technology_count(), 1);

    assert_eq!(scan.status, ScanStatus::Failed);
    let summary = scan.results_summary.unwrap();
    assert!(summary.starts_with("Tech Detect: technology detection encountered 2 error(s)"), "{}", summary);
    assert!(summary.contains("https://app.example.com"));
}

#[tokio::test]
async fn test_failed_technology_batch_persists_nothing() {
    let harness = Harness::new(Fakes {
        fetcher: FakeFetcher::with(vec![
            ("http://example.com", &["nginx"]),
            ("https://example.com", &["cloudflare"]),
        ]),
        ..Fakes::default()
    });
    harness.store.fail_technology_saves();
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_OFF), Some(CRAWL_OFF), true, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(scan.status, ScanStatus::Failed);
    let summary = scan.results_summary.unwrap();
    assert!(summary.contains("Tech Detect: "));
    assert!(summary.contains("failed to save technologies"));
    assert_eq!(harness.store.technology_row_count(), 0);
}

#[tokio::test]
async fn test_default_configuration_without_template() {
    let harness = Harness::new(Fakes {
        fetcher: FakeFetcher::with(vec![
            ("http://example.com", &["nginx"]),
            ("https://example.com", &["nginx", "cloudflare"]),
        ]),
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");

    let scan = harness.run(root.id, None, None).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.scan_type, "root_domain");
    assert_eq!(
        harness.store.technologies_for("example.com"),
        BTreeSet::from(["cloudflare".to_string(), "nginx".to_string()])
    );
    assert!(harness.store.screenshots().is_empty());
    assert!(harness.capture.captured_urls().is_empty());
    // Crawling is on by default.
    assert!(!harness.crawler.seen_seeds().is_empty());
}

#[tokio::test]
async fn test_screenshots_cover_existing_and_saved_hosts() {
    let harness = Harness::new(Fakes::default());
    let root = harness.store.add_root_domain("example.com");
    let www = harness.store.add_subdomain(root.id, "www.example.com");
    harness.store.add_endpoint(www.id, "/login");
    harness.store.add_endpoint(www.id, "/static/app.js");
    let tpl = template(Some(ENUMERATION_OFF), Some(CRAWL_OFF), false, true);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    let expected: BTreeSet<String> = [
        "http://example.com",
        "https://example.com",
        "http://www.example.com",
        "https://www.example.com",
        "http://www.example.com/login",
        "https://www.example.com/login",
    ]
    .iter()
    .map(|u| u.to_string())
    .collect();
    assert_eq!(harness.capture.captured_urls(), expected);

    let screenshots = harness.store.screenshots();
    assert!(!screenshots.is_empty());
    let scan_dir = harness.dir.path().join("screenshots").join(format!("scan_{}", scan.id));
    for screenshot in &screenshots {
        assert_eq!(screenshot.scan_id, scan.id);
        assert!(screenshot.subdomain_id.is_some() != screenshot.endpoint_id.is_some());
        let path = std::path::Path::new(&screenshot.file_path);
        assert!(path.starts_with(&scan_dir), "{}", screenshot.file_path);
        assert!(path.exists());
        assert!(screenshot.file_path.ends_with(".png"));
    }
}

#[tokio::test]
async fn test_capture_failures_do_not_fail_scan() {
    let harness = Harness::new(Fakes {
        capture: FakeCapture {
            fail: true,
            ..FakeCapture::default()
        },
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_OFF), Some(CRAWL_OFF), false, true);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert!(!harness.capture.captured_urls().is_empty());
    assert!(harness.store.screenshots().is_empty());
}

#[tokio::test]
async fn test_subdomain_scan_crawls_only_the_target() {
    let harness = Harness::new(Fakes::default());
    let root = harness.store.add_root_domain("example.com");
    harness.store.add_subdomain(root.id, "www.example.com");
    let app = harness.store.add_subdomain(root.id, "app.example.com");
    let tpl = template(Some(ENUMERATION_ON), Some(CRAWL_ON), false, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, Some(app.id), Some(tpl.id)).await;

    assert_eq!(scan.scan_type, "subdomain");
    assert_eq!(scan.subdomain_id, Some(app.id));
    let mut seeds = harness.crawler.seen_seeds();
    seeds.sort();
    assert_eq!(seeds, strings(&["http://app.example.com", "https://app.example.com"]));
    // Subdomain scans never enumerate or probe.
    assert!(harness.prober.probed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_crawl_output_file_lists_accepted_results() {
    let harness = Harness::new(Fakes {
        crawler: FakeCrawler::with(vec![(
            "http://example.com",
            vec![
                crawl_result("http://example.com/a", 200),
                crawl_result("http://other.com/b", 200),
            ],
        )]),
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let url_config =
        r#"{"enabled": true, "tools": {"crawler": {"enabled": true, "options": ["--outputFile=crawl.txt"]}}}"#;
    let tpl = template(Some(ENUMERATION_OFF), Some(url_config), false, false);
    harness.store.add_template(tpl.clone());

    let scan = harness.run(root.id, None, Some(tpl.id)).await;

    let path = harness.dir.path().join(format!("scan_{}_crawl_results.txt", scan.id));
    let contents = std::fs::read_to_string(path).unwrap();
    assert_eq!(contents.lines().collect::<Vec<_>>(), vec!["http://example.com/a"]);
}

fn raw_scan(root_domain_id: Uuid, scan_type: &str, template_id: Option<Uuid>) -> Scan {
    Scan {
        id: Uuid::new_v4(),
        root_domain_id,
        subdomain_id: None,
        scan_type: scan_type.to_string(),
        status: ScanStatus::Pending,
        started_at: Utc::now(),
        completed_at: None,
        results_summary: None,
        scan_template_id: template_id,
    }
}

#[tokio::test]
async fn test_unknown_scan_type_is_fatal() {
    let harness = Harness::new(Fakes::default());
    let root = harness.store.add_root_domain("example.com");
    let scan = raw_scan(root.id, "bogus", None);
    harness.store.insert_scan(scan.clone());

    let status = harness.service.run_scan(&scan.id, None).await.unwrap();

    assert_eq!(status, ScanStatus::Failed);
    let stored = harness.store.scan(&scan.id);
    assert_eq!(stored.status, ScanStatus::Failed);
    assert_eq!(
        stored.results_summary.as_deref(),
        Some("Internal error: Unknown scanType 'bogus'")
    );
    assert!(harness.prober.probed.lock().unwrap().is_empty());
    assert!(harness.store.hostnames(&root.id).is_empty());
}

#[tokio::test]
async fn test_missing_template_is_fatal() {
    let harness = Harness::new(Fakes::default());
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(None, None, true, false);
    harness.store.add_template(tpl.clone());
    let scan = raw_scan(root.id, "root_domain", Some(tpl.id));
    harness.store.insert_scan(scan.clone());
    harness.store.remove_template(&tpl.id);

    let status = harness.service.run_scan(&scan.id, None).await.unwrap();

    assert_eq!(status, ScanStatus::Failed);
    assert_eq!(
        harness.store.scan(&scan.id).results_summary.as_deref(),
        Some("Internal error: Scan template missing")
    );
    assert!(harness.crawler.seen_seeds().is_empty());
}

#[tokio::test]
async fn test_start_scan_validates_references() {
    let harness = Harness::new(Fakes::default());
    let root = harness.store.add_root_domain("example.com");
    let other = harness.store.add_root_domain("other.com");
    let foreign = harness.store.add_subdomain(other.id, "www.other.com");

    let unknown_root = harness
        .service
        .start_scan(ScanStartRequest {
            root_domain_id: Uuid::new_v4(),
            subdomain_id: None,
            scan_template_id: None,
        })
        .await;
    assert!(matches!(unknown_root, Err(ApiError::NotFound(_))));

    let wrong_parent = harness
        .service
        .start_scan(ScanStartRequest {
            root_domain_id: root.id,
            subdomain_id: Some(foreign.id),
            scan_template_id: None,
        })
        .await;
    assert!(matches!(wrong_parent, Err(ApiError::NotFound(_))));

    let unknown_template = harness
        .service
        .start_scan(ScanStartRequest {
            root_domain_id: root.id,
            subdomain_id: None,
            scan_template_id: Some(Uuid::new_v4()),
        })
        .await;
    assert!(matches!(unknown_template, Err(ApiError::NotFound(_))));
    assert!(harness.service.list_scans(&root.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_scan_reports_target_and_template() {
    let harness = Harness::new(Fakes::default());
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_OFF), Some(CRAWL_OFF), false, false);
    harness.store.add_template(tpl.clone());

    let started = harness
        .service
        .start_scan(ScanStartRequest {
            root_domain_id: root.id,
            subdomain_id: None,
            scan_template_id: Some(tpl.id),
        })
        .await
        .unwrap();

    assert_eq!(
        started.message,
        format!("Scan started for example.com using template ID {}", tpl.id)
    );
    harness.task_manager.wait_for_all_tasks().await;

    let scans = harness.service.list_scans(&root.id).await.unwrap();
    assert_eq!(scans.len(), 1);
    assert_eq!(scans[0].id, started.scan_id);
    assert_eq!(scans[0].status, ScanStatus::Completed);
}

#[tokio::test]
async fn test_extreme_enumeration_options_still_finish_the_scan() {
    let harness = Harness::new(Fakes {
        enumerator: FakeEnumerator {
            hosts: strings(&["www.example.com"]),
            ..FakeEnumerator::default()
        },
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let config = r#"{"enabled": true, "tools": {"enumerator": {"enabled": true, "options": [
        "--maxEnumerationTime=9223372036854775807",
        "--timeout=307445734561825860",
        "--threads=4294967296"
    ]}}}"#;
    let tpl = template(Some(config), Some(CRAWL_OFF), false, false);
    harness.store.add_template(tpl.clone());

    let scan = tokio::time::timeout(Duration::from_secs(10), harness.run(root.id, None, Some(tpl.id)))
        .await
        .expect("scan never finished");

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(
        harness.store.hostnames(&root.id),
        strings(&["example.com", "www.example.com"])
    );
}

#[tokio::test]
async fn test_panicking_provider_fails_the_scan() {
    let harness = Harness::new(Fakes {
        enumerator: FakeEnumerator {
            hosts: strings(&["www.example.com"]),
            panic: Some("enumerator blew up".to_string()),
            ..FakeEnumerator::default()
        },
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_ON), Some(CRAWL_OFF), false, false);
    harness.store.add_template(tpl.clone());

    let scan = tokio::time::timeout(Duration::from_secs(10), harness.run(root.id, None, Some(tpl.id)))
        .await
        .expect("task manager never released the scan");

    assert_eq!(scan.status, ScanStatus::Failed);
    let summary = scan.results_summary.unwrap();
    assert!(summary.starts_with("Internal error: scan task panicked"), "{}", summary);
    assert!(summary.contains("enumerator blew up"));
    assert!(scan.completed_at.is_some());
    assert!(harness.task_manager.get_active_tasks().await.is_empty());
}

#[tokio::test]
async fn test_store_error_before_running_fails_the_scan() {
    let harness = Harness::new(Fakes::default());
    let root = harness.store.add_root_domain("example.com");
    let scan = raw_scan(root.id, "root_domain", None);
    harness.store.insert_scan(scan.clone());
    harness.store.fail_mark_running();

    let result = harness.service.run_scan(&scan.id, None).await;

    assert!(result.is_err());
    let stored = harness.store.scan(&scan.id);
    assert_eq!(stored.status, ScanStatus::Failed);
    let summary = stored.results_summary.unwrap();
    assert!(summary.starts_with("Internal error: "), "{}", summary);
    assert!(summary.contains("connection reset"));
    assert!(harness.prober.probed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_shutdown_fails_interrupted_scans() {
    let harness = Harness::new(Fakes {
        enumerator: FakeEnumerator {
            hang: true,
            ..FakeEnumerator::default()
        },
        ..Fakes::default()
    });
    let root = harness.store.add_root_domain("example.com");
    let tpl = template(Some(ENUMERATION_ON), Some(CRAWL_OFF), false, false);
    harness.store.add_template(tpl.clone());

    let started = harness
        .service
        .start_scan(ScanStartRequest {
            root_domain_id: root.id,
            subdomain_id: None,
            scan_template_id: Some(tpl.id),
        })
        .await
        .unwrap();

    for _ in 0..100 {
        if harness.store.scan(&started.scan_id).status == ScanStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(harness.store.scan(&started.scan_id).status, ScanStatus::Running);

    harness.service.shutdown().await;

    let scan = harness.store.scan(&started.scan_id);
    assert_eq!(scan.status, ScanStatus::Failed);
    assert_eq!(scan.results_summary.as_deref(), Some(INTERRUPTED_SUMMARY));
    assert!(harness.store.root_domain(&root.id).last_scanned_at.is_some());

    // The aborted run must not overwrite the terminal status later.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    let later = harness.store.scan(&started.scan_id);
    assert_eq!(later.status, ScanStatus::Failed);
    assert_eq!(later.results_summary.as_deref(), Some(INTERRUPTED_SUMMARY));
}
