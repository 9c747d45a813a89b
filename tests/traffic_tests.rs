// Loading captured traffic and feeding it to the hunter

mod common;

use common::ScriptedSender;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use version_hunter::traffic::{HarParser, RawRequestParser, TrafficParser};
use version_hunter::{HttpService, HunterConfig, Method, Observation, VersionHunter};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("version_hunter_{}_{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

const HAR: &str = r#"{
  "log": {
    "version": "1.2",
    "entries": [
      {
        "request": {
          "method": "GET",
          "url": "https://api.example.com/api/v2/users?page=1",
          "headers": [
            {"name": ":authority", "value": "api.example.com"},
            {"name": "Authorization", "value": "Bearer abc"}
          ]
        }
      },
      {
        "request": {
          "method": "post",
          "url": "http://legacy.example.com:8080/v3/orders",
          "headers": [],
          "postData": {"mimeType": "application/json", "text": "{\"id\":7}"}
        }
      },
      {
        "request": {
          "method": "GET",
          "url": "https://api.example.com/api/v3/users",
          "headers": []
        }
      },
      {
        "request": {"method": "GET", "url": "ftp://files.example.com/v1/x"}
      }
    ]
  }
}"#;

#[test]
fn har_entries_become_requests() {
    let dir = scratch_dir("har");
    let file = dir.join("session.har");
    fs::write(&file, HAR).unwrap();

    let requests = HarParser.parse(file.to_str().unwrap()).unwrap();
    assert_eq!(requests.len(), 3);

    assert_eq!(requests[0].service, HttpService::new("api.example.com", 443, true));
    assert_eq!(requests[0].path, "/api/v2/users?page=1");
    assert_eq!(requests[0].header("authorization"), Some("Bearer abc"));
    assert!(requests[0].header(":authority").is_none());

    assert_eq!(requests[1].method, Method::POST);
    assert_eq!(requests[1].service, HttpService::new("legacy.example.com", 8080, false));
    assert_eq!(requests[1].body, "{\"id\":7}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn har_without_entries_is_rejected() {
    let dir = scratch_dir("bad_har");
    let file = dir.join("empty.har");
    fs::write(&file, r#"{"log": {}}"#).unwrap();
    assert!(HarParser.parse(file.to_str().unwrap()).is_err());
    assert!(HarParser.parse(dir.join("missing.har").to_str().unwrap()).is_err());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn raw_directory_is_read_in_name_order() {
    let dir = scratch_dir("raw");
    fs::write(
        dir.join("b.http"),
        "GET http://api.example.com/api/v1/users HTTP/1.1\r\n\r\n",
    )
    .unwrap();
    fs::write(
        dir.join("a.req"),
        "POST /api/v2/items HTTP/1.1\nHost: shop.example.com\nContent-Type: application/json\n\n{}",
    )
    .unwrap();
    fs::write(dir.join("notes.txt"), "GET /v1/ignored HTTP/1.1\r\n\r\n").unwrap();
    fs::write(dir.join("c.http"), "GET /v1/nohost HTTP/1.1\r\n\r\n").unwrap();

    let requests = RawRequestParser { secure: true }
        .parse(dir.to_str().unwrap())
        .unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].service, HttpService::new("shop.example.com", 443, true));
    assert_eq!(requests[0].body, "{}");
    assert_eq!(requests[1].service, HttpService::new("api.example.com", 80, false));
    assert_eq!(requests[1].path, "/api/v1/users");

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn captured_traffic_dispatches_one_sweep_per_endpoint() {
    let dir = scratch_dir("har_hunt");
    let file = dir.join("session.har");
    fs::write(&file, HAR).unwrap();
    let requests = HarParser.parse(file.to_str().unwrap()).unwrap();

    let sender = Arc::new(ScriptedSender::new());
    let hunter = VersionHunter::new(HunterConfig::default(), sender.clone());
    let observations: Vec<_> = requests.iter().map(|r| hunter.observe(r)).collect();

    assert!(matches!(observations[0], Observation::Dispatched(_)));
    assert!(matches!(observations[1], Observation::Dispatched(_)));
    assert!(matches!(observations[2], Observation::AlreadyClaimed(_)));

    let summaries = hunter.wait_idle().await;
    assert_eq!(summaries.len(), 2);
    assert_eq!(sender.sent_count(), 42);

    let mut hosts = hunter.list_hosts();
    hosts.sort();
    assert_eq!(hosts, vec!["api.example.com", "legacy.example.com"]);

    let _ = fs::remove_dir_all(&dir);
}
