use std::fs;
use version_hunter::aggregator::{AggregatorSnapshot, HostResults};
use version_hunter::reporting::{export_csv, export_markdown};
use version_hunter::{HttpRequest, HttpResponse, HttpService, Method, ProbeKind, ProbeOutcome};

fn outcome(kind: ProbeKind, version: &str, method: Method, path: &str, status: u16, body: &str) -> ProbeOutcome {
    let request = HttpRequest::new(HttpService::new("api.example.com", 443, true), method, path);
    ProbeOutcome::new(kind, version, request, HttpResponse::new(status, body))
}

fn snapshot() -> AggregatorSnapshot {
    AggregatorSnapshot {
        hosts: vec![HostResults {
            host: "api.example.com".to_string(),
            outcomes: vec![
                outcome(ProbeKind::Original, "v2", Method::GET, "/api/v2/users", 200, "[]"),
                outcome(ProbeKind::Fuzz, "v1", Method::GET, "/api/v1/users", 200, "[{\"id\":1}]"),
                outcome(ProbeKind::Fuzz, "v1", Method::PUT, "/api/v1/a|b,c", 405, ""),
            ],
        }],
    }
}

#[test]
fn reporting_exports_create_files() {
    let dir = std::env::temp_dir().join(format!("version_hunter_reports_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();

    let csv_path = export_csv(&snapshot(), &dir).expect("CSV export should succeed");
    let md_path = export_markdown(&snapshot(), &dir).expect("Markdown export should succeed");

    // Filenames carry a timestamp
    let csv_name = csv_path.file_name().unwrap().to_str().unwrap();
    let md_name = md_path.file_name().unwrap().to_str().unwrap();
    assert!(csv_name.starts_with("version_hunter_report_"));
    assert!(csv_name.ends_with(".csv"));
    assert!(md_name.starts_with("version_hunter_report_"));
    assert!(md_name.ends_with(".md"));

    let csv = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Host,Type,Version,Method,Path,Status,Length");
    assert_eq!(lines[1], "api.example.com,Original,v2,GET,/api/v2/users,200,2");
    assert_eq!(lines[2], "api.example.com,Fuzz,v1,GET,/api/v1/users,200,10");
    assert_eq!(lines[3], "api.example.com,Fuzz,v1,PUT,\"/api/v1/a|b,c\",405,0");

    let md = fs::read_to_string(&md_path).unwrap();
    assert!(md.contains("# API Version Sweep Report"));
    assert!(md.contains("## api.example.com"));
    assert!(md.contains("| Original | v2 | GET | `/api/v2/users` | 200 | 2 |"));
    assert!(md.contains("`/api/v1/a\\|b,c`"));

    // Clean up
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn empty_snapshot_still_produces_a_report() {
    let dir = std::env::temp_dir().join(format!("version_hunter_empty_report_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();

    let md_path = export_markdown(&AggregatorSnapshot::default(), &dir).unwrap();
    let md = fs::read_to_string(&md_path).unwrap();
    assert!(md.contains("No versioned endpoints were probed."));

    let csv_path = export_csv(&AggregatorSnapshot::default(), &dir).unwrap();
    assert_eq!(fs::read_to_string(&csv_path).unwrap().lines().count(), 1);

    let _ = fs::remove_dir_all(&dir);
}
