//! E2E tests wiring HTTP weather/traffic providers from a TOML config
//! through a full publish run.

mod helpers;

use std::sync::Arc;

use ff_collectors::FixedClock;
use ff_publisher::RunError;
use ff_publisher::config::PublisherConfig;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpers::{TestHarness, fixed_instant};

fn config_for(server: &MockServer) -> PublisherConfig {
    let toml = format!(
        r#"
people_count = 7

[endpoint]
host = "h"
root_ca_path = "r"
certificate_path = "c"
private_key_path = "k"

[weather]
url = "{uri}/weather"
timeout_secs = 2

[traffic]
url = "{uri}/traffic"
timeout_secs = 2
"#,
        uri = server.uri()
    );
    toml::from_str(&toml).unwrap()
}

/// Readings fetched over HTTP land in the published snapshot unchanged.
#[tokio::test]
async fn e2e_http_providers_feed_the_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"temp_c": 11.5, "wind_kph": 20})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/traffic"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"congestion": "heavy"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let mut collaborators = config.collaborators().unwrap();
    collaborators.clock = Arc::new(FixedClock(fixed_instant()));

    let h = TestHarness::new();
    let outcome = h.run(config.session_settings(), collaborators).await;
    assert!(outcome.is_success(), "{:?}", outcome.result);

    let payload: serde_json::Value =
        serde_json::from_slice(&h.mqtt.delivered()[0].payload).unwrap();
    assert_eq!(payload["pi"]["people_count"], 7);
    assert_eq!(payload["weather"], json!({"temp_c": 11.5, "wind_kph": 20}));
    assert_eq!(payload["traffic"], json!({"congestion": "heavy"}));
}

/// A failing provider aborts the run; nothing reaches the broker.
#[tokio::test]
async fn e2e_provider_outage_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp_c": 11.5})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/traffic"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let h = TestHarness::new();
    let outcome = h
        .run(config.session_settings(), config.collaborators().unwrap())
        .await;

    match outcome.result {
        Err(RunError::Collaborator(e)) => assert!(e.to_string().contains("traffic")),
        other => panic!("expected collaborator error, got {other:?}"),
    }
    assert!(h.mqtt.delivered().is_empty());
    assert_eq!(h.mqtt.disconnect_calls(), 1);
}
