//! # Extraction Pipeline Integration Test
//!
//! Drives the full pipeline (fetch, raw archive, cache, flatten,
//! variation, CSV export) against a local HTTP stub that serves a canned
//! JSON-stat payload. Runs the same extraction twice to verify the second
//! pass is served entirely from the cache.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use lib_common::configs::config_app::AppConfig;
use lib_common::statistics::camcom::apicall::RequestParams;
use lib_common::statistics::camcom::extractor::Extractor;
use lib_common::statistics::camcom::processor::StatisticsSummary;

fn stub_payload() -> Vec<u8> {
    serde_json::json!({
        "version": "2.0",
        "class": "dataset",
        "label": "Imprese attive - Venezia",
        "id": ["tempo", "settore_ateco", "forma_giuridica"],
        "size": [3, 2, 2],
        "dimension": {
            "tempo": {
                "label": "Periodo",
                "category": {"index": ["2020-09-30", "2021-09-30", "2022-09-30"]}
            },
            "settore_ateco": {"label": "Settore", "category": {"index": ["C", "F"]}},
            "forma_giuridica": {"label": "Forma giuridica", "category": {"index": ["SRL", "DI"]}}
        },
        "value": [
            100.0, 40.0, 60.0, 30.0,
            110.0, 44.0, 63.0, 33.0,
            121.0, null, 63.0, 36.0
        ]
    })
    .to_string()
    .into_bytes()
}

/// Serves every request with the canned payload and counts the hits.
async fn spawn_stub() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        loop {
            let (mut sock, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => break,
            };
            counter.fetch_add(1, Ordering::SeqCst);

            let mut buf = [0u8; 8192];
            let _ = sock.read(&mut buf).await;

            let body = stub_payload();
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            let _ = sock.write_all(head.as_bytes()).await;
            let _ = sock.write_all(&body).await;
        }
    });

    (format!("http://{addr}/"), hits)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("--- Starting Extraction Pipeline Test ---");

    let (base_url, hits) = spawn_stub().await;
    let workdir = tempfile::tempdir()?;
    let root = workdir.path().display();

    let yaml = format!(
        "api:\n  base_url: \"{base_url}\"\n  timeout_secs: 5\n  max_retries: 3\n  retry_delay_ms: 100\nextraction:\n  batch_size: 100\noutput:\n  csv_directory: \"{root}/processed\"\n  raw_directory: \"{root}/raw\"\n  cache_directory: \"{root}/cache\"\nlogging:\n  directory: \"{root}/logs\"\n"
    );
    let config: AppConfig = serde_yml::from_str(&yaml)?;

    let extractor = Extractor::new(config)?;
    let params = RequestParams::resolve("Venezia", "2020-01-01", "2022-12-31", None)
        .expect("Venezia is a known province");

    // --- PASS 1: network fetch ---
    println!("\n[Pass 1] Fetching through the stub...");
    let report = extractor.run(&params, None).await?;
    assert_eq!(report.windows, 1);
    assert_eq!(report.cache_hits, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    // 12 cells, one null.
    assert_eq!(report.rows_written, 11);
    println!(
        "✅ {} rows written to {}",
        report.rows_written,
        report.output_path.display()
    );

    let csv = std::fs::read_to_string(&report.output_path)?;
    assert!(csv.starts_with(
        "provincia,anno,trimestre,settore_ateco,forma_giuridica,num_imprese_attive,variazione_annuale"
    ));
    // 2021 C/SRL grew from 100 to 110.
    assert!(csv.contains("Venezia,2021,3,C,SRL,110,10.00"));
    // 2022 F/SRL is flat against 2021.
    assert!(csv.contains("Venezia,2022,3,F,SRL,63,0.00"));
    // First year has no prior-year counterpart: empty variation column.
    assert!(csv.contains("Venezia,2020,3,C,SRL,100,"));
    println!("✅ CSV header, ordering and variation verified");

    let stats = StatisticsSummary::from_records(&report.records);
    assert_eq!(stats.totale_record, 11);
    assert_eq!(stats.anni, Some((2020, 2022)));
    println!("✅ Statistics: {}", serde_json::to_string(&stats)?);

    // --- PASS 2: cache hit, byte-identical payload ---
    println!("\n[Pass 2] Re-running the same extraction...");
    let report2 = extractor.run(&params, None).await?;
    assert_eq!(report2.cache_hits, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1, "stub must not be hit again");
    assert_eq!(report2.rows_written, report.rows_written);
    println!("✅ Second pass served from cache, no network activity");

    // The cached entry is the payload exactly as the stub produced it.
    let cache_file = workdir
        .path()
        .join("cache")
        .join(format!("{}.json", params.cache_key()));
    assert_eq!(std::fs::read(cache_file)?, stub_payload());
    println!("✅ Cached payload is byte-identical to the fetched one");

    println!("\n--- All Tests Passed Successfully ---");
    Ok(())
}
