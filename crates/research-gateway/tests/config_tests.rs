//! Building the gateway from configuration.

use gateway_config::{ConfigLoader, ConfigSource, GatewayConfig, TAVILY_API_KEY_ENV};
use gateway_core::{CallerContext, GatewayError, SearchRequest};
use research_gateway::ResearchGateway;
use secrecy::SecretString;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn test_missing_api_key_is_a_configuration_error() {
    std::env::remove_var(TAVILY_API_KEY_ENV);

    let err = ResearchGateway::from_config(&GatewayConfig::default()).expect_err("no key");
    assert!(matches!(err, GatewayError::Configuration { .. }));
    assert!(err.to_string().contains("TAVILY_API_KEY"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_configured_gateway_talks_to_upstream() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("Authorization", "Bearer tvly-config-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": "tokio",
            "results": [{ "title": "Tokio", "url": "https://tokio.rs", "content": "runtime", "score": 1.0 }],
            "response_time": 0.2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let yaml = format!(
        "rate_limit:\n  requests_per_minute: 5\ntavily:\n  base_url: {}\n  timeout: 5s\nobservability:\n  metrics:\n    enabled: true\n",
        server.uri()
    );
    let mut config = ConfigLoader::new()
        .with_source(ConfigSource::Yaml(yaml))
        .load()
        .await
        .expect("config");
    config.tavily.api_key = Some(SecretString::new("tvly-config-key".to_string()));

    // The Tavily client is blocking and must be built off the async workers
    let gateway = tokio::task::spawn_blocking(move || ResearchGateway::from_config(&config))
        .await
        .expect("join")
        .expect("gateway");

    let caller = CallerContext::new("u1", "s1");
    let first = gateway
        .search(SearchRequest::new("tokio"), &caller)
        .await
        .expect("search");
    let second = gateway
        .search(SearchRequest::new("tokio"), &caller)
        .await
        .expect("cached search");

    assert_eq!(first.results[0].url, "https://tokio.rs");
    assert!(second.cached);
    assert_eq!(gateway.limiter_remaining("u1").await, 3);
    assert!(gateway
        .metrics()
        .expect("metrics enabled")
        .gather()
        .contains("research_gateway_requests_total"));

    tokio::time::timeout(Duration::from_secs(5), tokio::task::spawn_blocking(move || drop(gateway)))
        .await
        .expect("drop in time")
        .expect("join");
}
