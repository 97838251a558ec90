use std::time::Duration;

use edgepurge::infra::backend::HttpPurgeBackend;
use edgepurge::purge::{BackendError, Credentials, PurgeBackend, ZoneAccess};
use httpmock::MockServer;
use serde_json::json;
use url::Url;

fn backend(server: &MockServer, batch_size: usize) -> HttpPurgeBackend {
    let base = Url::parse(&server.url("/client/v4")).expect("mock url");
    HttpPurgeBackend::new(base, Duration::from_secs(5), batch_size).expect("client builds")
}

fn token_access() -> ZoneAccess {
    ZoneAccess {
        credentials: Credentials::ApiToken {
            token: "tok-123".to_string(),
        },
        zone_id: "zone-1".to_string(),
    }
}

fn ok_envelope() -> serde_json::Value {
    json!({ "success": true, "errors": [], "messages": [], "result": { "id": "purge-1" } })
}

#[tokio::test]
async fn url_purges_are_split_into_batches() {
    let server = MockServer::start_async().await;
    let first = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/client/v4/zones/zone-1/purge_cache")
                .header("authorization", "Bearer tok-123")
                .json_body(json!({ "files": ["https://x/a/", "https://x/b/"] }));
            then.status(200).json_body(ok_envelope());
        })
        .await;
    let second = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/client/v4/zones/zone-1/purge_cache")
                .json_body(json!({ "files": ["https://x/c/"] }));
            then.status(200).json_body(ok_envelope());
        })
        .await;

    let urls = vec![
        "https://x/a/".to_string(),
        "https://x/b/".to_string(),
        "https://x/c/".to_string(),
    ];
    backend(&server, 2)
        .purge_urls(&token_access(), &urls)
        .await
        .expect("purge succeeds");

    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn global_key_sends_header_pair() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method("POST")
                .path("/client/v4/zones/zone-9/purge_cache")
                .header("x-auth-email", "ops@example.com")
                .header("x-auth-key", "global-key")
                .json_body(json!({ "purge_everything": true }));
            then.status(200).json_body(ok_envelope());
        })
        .await;

    let access = ZoneAccess {
        credentials: Credentials::GlobalKey {
            email: "ops@example.com".to_string(),
            key: "global-key".to_string(),
        },
        zone_id: "zone-9".to_string(),
    };
    backend(&server, 30)
        .purge_all(&access)
        .await
        .expect("purge succeeds");

    mock.assert_async().await;
}

#[tokio::test]
async fn failures_are_classified() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/client/v4/zones/denied/purge_cache");
            then.status(403).json_body(json!({
                "success": false,
                "errors": [{ "code": 10000, "message": "Authentication error" }],
                "result": null
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/client/v4/zones/busy/purge_cache");
            then.status(429).header("retry-after", "30").body("slow down");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("POST").path("/client/v4/zones/refused/purge_cache");
            then.status(200).json_body(json!({
                "success": false,
                "errors": [{ "code": 1012, "message": "Request must contain one of files" }],
                "result": null
            }));
        })
        .await;

    let client = backend(&server, 30);
    let with_zone = |zone: &str| ZoneAccess {
        zone_id: zone.to_string(),
        ..token_access()
    };

    let err = client.purge_all(&with_zone("denied")).await.expect_err("403");
    assert!(matches!(err, BackendError::Authentication(ref message) if message.contains("10000")));

    let err = client.purge_all(&with_zone("busy")).await.expect_err("429");
    assert_eq!(
        err,
        BackendError::RateLimited {
            retry_after_seconds: Some(30)
        }
    );

    let err = client.purge_all(&with_zone("refused")).await.expect_err("rejected");
    assert!(matches!(err, BackendError::Rejected { status: 200, .. }));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let base = Url::parse("http://127.0.0.1:9/").expect("url");
    let client = HttpPurgeBackend::new(base, Duration::from_secs(2), 30).expect("client builds");

    let err = client
        .purge_all(&token_access())
        .await
        .expect_err("nothing listens on the discard port");
    assert_eq!(err.kind(), "network");
}

#[tokio::test]
async fn zones_are_listed_and_looked_up() {
    let server = MockServer::start_async().await;
    let list = server
        .mock_async(|when, then| {
            when.method("GET")
                .path("/client/v4/zones")
                .query_param("per_page", "50");
            then.status(200).json_body(json!({
                "success": true,
                "errors": [],
                "result": [
                    { "id": "zone-1", "name": "example.com", "status": "active" },
                    { "id": "zone-2", "name": "example.org", "status": "active" }
                ]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/client/v4/zones/zone-2");
            then.status(200).json_body(json!({
                "success": true,
                "errors": [],
                "result": { "id": "zone-2", "name": "example.org" }
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method("GET").path("/client/v4/zones/missing");
            then.status(404).json_body(json!({
                "success": false,
                "errors": [{ "code": 1001, "message": "Invalid zone identifier" }],
                "result": null
            }));
        })
        .await;

    let client = backend(&server, 30);
    let credentials = token_access().credentials;

    let zones = client.list_zones(&credentials).await.expect("zones");
    assert_eq!(zones.len(), 2);
    assert_eq!(zones[1].name, "example.org");
    list.assert_async().await;

    let zone = client
        .zone_by_id(&credentials, "zone-2")
        .await
        .expect("lookup");
    assert_eq!(zone.map(|zone| zone.id), Some("zone-2".to_string()));

    let missing = client
        .zone_by_id(&credentials, "missing")
        .await
        .expect("lookup");
    assert_eq!(missing, None);
}
