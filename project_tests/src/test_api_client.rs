//! # `ky_http` Client Integration Tests
//!
//! Integration tests for `lib_common::retrieve::ky_http::ApiClient`, using
//! the `httpbin.org` service as a public, well-behaved endpoint. Verifies
//! URL joining, query-string construction, non-throwing 4xx handling and
//! raw body retrieval.
//!
//! These tests are executed asynchronously using `tokio::main`.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};

use lib_common::retrieve::ky_http::ApiClient;

/// A utility struct to deserialize responses from `httpbin.org`, which
/// echoes back parts of the request (args, headers, URL).
#[derive(Debug, Deserialize, Serialize)]
struct HttpbinResponse {
    /// Echoed query arguments.
    args: Option<HashMap<String, String>>,
    /// The URL that was hit, as seen by httpbin.org.
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = "https://httpbin.org/";
    let api = ApiClient::new(base_url, Duration::from_secs(30), 3, Duration::from_millis(500))?;

    println!("--- Starting API Module Tests ---");

    // --- TEST 1: URL Joining & Success Response ---
    println!("\n[Test 1] Testing URL Joining & Success...");
    let res1 = api
        .request::<HttpbinResponse>(Method::GET, "get", &[], None)
        .await?;
    assert!(res1.success);
    println!("✅ URL Joined: {:?}", res1.data.as_ref().unwrap().url);

    // --- TEST 2: Query-String Construction ---
    // The dataset endpoint is driven entirely by query parameters, so the
    // client must encode them exactly as given.
    println!("\n[Test 2] Testing query-string construction...");
    let query = [
        ("provincia", "VE".to_string()),
        ("inizio", "2020-03-31".to_string()),
    ];
    let res2 = api
        .request::<HttpbinResponse>(Method::GET, "get", &query, None)
        .await?;
    let args = res2.data.unwrap().args.unwrap();
    assert_eq!(args.get("provincia").map(String::as_str), Some("VE"));
    assert_eq!(args.get("inizio").map(String::as_str), Some("2020-03-31"));
    println!("✅ Query echoed: {:?}", args);

    // --- TEST 3: Failures (Non-throwing 404) ---
    println!("\n[Test 3] Testing 404 handling (Should return Result::Ok with success: false)...");
    let res3 = api
        .request::<serde_json::Value>(Method::GET, "status/404", &[], None)
        .await?;
    assert!(!res3.success);
    assert_eq!(res3.status, 404);
    println!("✅ Non-throwing failure handled. Status: {}", res3.status);

    // --- TEST 4: Raw Body Retrieval ---
    // The cache persists payloads verbatim, so get_bytes must hand back
    // exactly what the server produced.
    println!("\n[Test 4] Testing raw body retrieval...");
    let res4 = api.get_bytes("get", &[], None).await?;
    assert!(res4.success);
    assert!(!res4.body.is_empty());
    // The body is the JSON document httpbin always returns.
    serde_json::from_slice::<serde_json::Value>(&res4.body)?;
    println!("✅ Raw body retrieved: {} bytes", res4.body.len());

    println!("\n--- All Tests Passed Successfully ---");
    Ok(())
}
