//! Radarr adapter tests against a mock HTTP server

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use upgradarr::config::{ProviderConfig, ProviderKind};
use upgradarr::db::Database;
use upgradarr::error::ProviderErrorKind;
use upgradarr::providers::{ListedItem, ProfileCutoffs, Provider, RadarrProvider};
use upgradarr::services::UpgradeService;

const API_KEY: &str = "test-key";

fn radarr(server: &MockServer) -> RadarrProvider {
    RadarrProvider::new(Url::parse(&server.uri()).unwrap(), API_KEY, Duration::from_secs(5)).unwrap()
}

async fn mount_get(server: &MockServer, route: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(header("X-Api-Key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_quality_profiles() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/api/v3/qualityprofile",
        json!([
            {"id": 1, "name": "HD-1080p", "cutoffFormatScore": 100},
            {"id": 4, "name": "Any"}
        ]),
    )
    .await;

    let profiles = radarr(&server).list_quality_profiles().await.unwrap();

    assert_eq!(profiles, ProfileCutoffs::from([(1, 100), (4, 0)]));
}

#[tokio::test]
async fn test_list_items() {
    let server = MockServer::start().await;
    mount_get(
        &server,
        "/api/v3/movie",
        json!([
            {"id": 3, "title": "A", "monitored": true, "hasFile": true, "qualityProfileId": 1},
            {"id": 1, "title": "B", "monitored": false, "hasFile": false, "qualityProfileId": 2}
        ]),
    )
    .await;

    let items = radarr(&server).list_items().await.unwrap();

    assert_eq!(
        items,
        vec![
            ListedItem { id: 3, monitored: true, has_file: true, quality_profile_id: 1 },
            ListedItem { id: 1, monitored: false, has_file: false, quality_profile_id: 2 },
        ]
    );
}

#[tokio::test]
async fn test_item_score_uses_first_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/moviefile"))
        .and(query_param("movieId", "42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 9, "customFormatScore": 35},
            {"id": 10, "customFormatScore": 900}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/moviefile"))
        .and(query_param("movieId", "43"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let provider = radarr(&server);

    assert_eq!(provider.get_item_score(42).await.unwrap(), 35);
    assert_eq!(provider.get_item_score(43).await.unwrap(), 0);
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_dispatch_search_posts_command() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/command"))
        .and(header("X-Api-Key", API_KEY))
        .and(body_json(json!({"name": "MoviesSearch", "movieIds": [1, 5]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 77})))
        .expect(1)
        .mount(&server)
        .await;

    radarr(&server).dispatch_search(&[1, 5]).await.unwrap();
}

// ============================================================================
// Error Mapping
// ============================================================================

#[tokio::test]
async fn test_unauthorized_is_configuration_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = radarr(&server).list_items().await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Configuration);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = radarr(&server).dispatch_search(&[1]).await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::Transient);
    assert!(err.message.contains("maintenance"));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = radarr(&server).list_quality_profiles().await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::InvalidResponse);
}

#[tokio::test]
async fn test_unreachable_is_transient() {
    let server = MockServer::start().await;
    let url = Url::parse(&server.uri()).unwrap();
    drop(server);

    let provider = RadarrProvider::new(url, API_KEY, Duration::from_secs(2)).unwrap();
    let err = provider.list_items().await.unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::Transient);
}

// ============================================================================
// End to End
// ============================================================================

#[tokio::test]
async fn test_service_cycle_against_radarr() {
    let server = MockServer::start().await;
    mount_get(&server, "/api/v3/qualityprofile", json!([{"id": 1, "cutoffFormatScore": 100}])).await;
    mount_get(
        &server,
        "/api/v3/movie",
        json!([
            {"id": 1, "monitored": true, "hasFile": true, "qualityProfileId": 1},
            {"id": 2, "monitored": true, "hasFile": true, "qualityProfileId": 1},
            {"id": 3, "monitored": true, "hasFile": false, "qualityProfileId": 1}
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/moviefile"))
        .and(query_param("movieId", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"customFormatScore": 20}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/moviefile"))
        .and(query_param("movieId", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"customFormatScore": 150}])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v3/command"))
        .and(body_json(json!({"name": "MoviesSearch", "movieIds": [1]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let db = Database::in_memory().await.unwrap();
    let service = UpgradeService::new(db.clone(), Duration::from_secs(5)).unwrap();
    let providers = vec![ProviderConfig {
        name: "radarr".to_string(),
        kind: ProviderKind::Radarr,
        enabled: true,
        url: Some(server.uri()),
        api_key: Some(API_KEY.to_string()),
        batch_size: 10,
    }];

    let summary = service.run_cycle(&providers).await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.dispatched, 1);
    assert_eq!(db.queue("radarr").await.unwrap().count().await.unwrap(), 0);
}
