use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use entrascope::auth::{AccessToken, Audience};
use entrascope::http::{HttpClient, Outcome, RequestHeader};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn header_for(token: &str, eventual: bool) -> RequestHeader {
    let token = AccessToken {
        access_token: token.to_string(),
        expires_at: Utc::now() + ChronoDuration::hours(1),
        account: None,
        audience: Audience::Graph,
    };
    RequestHeader::new(&token, eventual)
}

async fn outcome_for(status: u16, body: Option<serde_json::Value>) -> Result<Outcome> {
    let server = MockServer::start().await;
    let mut response = ResponseTemplate::new(status);
    if let Some(body) = body {
        response = response.set_body_json(body);
    }
    Mock::given(method("GET"))
        .and(path("/v1.0/domains"))
        .respond_with(response)
        .mount(&server)
        .await;

    let client = HttpClient::new(Duration::from_secs(5))?;
    let url = format!("{}/v1.0/domains", server.uri());
    Ok(client.get(&header_for("token-1", false), &url).await)
}

#[tokio::test]
async fn test_success_carries_body() -> Result<()> {
    let body = json!({"value": [{"id": "contoso.com"}]});
    assert_eq!(outcome_for(200, Some(body.clone())).await?, Outcome::Success(body));
    Ok(())
}

#[tokio::test]
async fn test_throttling_statuses() -> Result<()> {
    for status in [429, 503, 504] {
        assert_eq!(outcome_for(status, None).await?, Outcome::Throttled { status });
    }
    Ok(())
}

#[tokio::test]
async fn test_auth_statuses() -> Result<()> {
    assert_eq!(outcome_for(401, None).await?, Outcome::Unauthorized);
    assert_eq!(outcome_for(403, None).await?, Outcome::Forbidden);
    Ok(())
}

#[tokio::test]
async fn test_bad_request_message() -> Result<()> {
    let body = json!({
        "error": {"code": "BadRequest", "message": "Invalid filter clause"}
    });
    assert_eq!(
        outcome_for(400, Some(body)).await?,
        Outcome::BadRequest {
            message: "BadRequest: Invalid filter clause".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_unclassified_statuses_are_transient() -> Result<()> {
    for status in [500, 502, 404] {
        assert!(matches!(outcome_for(status, None).await?, Outcome::Transient { .. }));
    }
    Ok(())
}

#[tokio::test]
async fn test_undecodable_success_body_is_transient() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let client = HttpClient::new(Duration::from_secs(5))?;
    let outcome = client.get(&header_for("token-1", false), &server.uri()).await;
    assert!(matches!(outcome, Outcome::Transient { .. }));
    Ok(())
}

#[tokio::test]
async fn test_connection_failure_is_transient() -> Result<()> {
    let client = HttpClient::new(Duration::from_millis(500))?;
    // Nothing listens on port 9 locally
    let outcome = client
        .get(&header_for("token-1", false), "http://127.0.0.1:9/v1.0/domains")
        .await;
    assert!(matches!(outcome, Outcome::Transient { .. }));
    Ok(())
}

#[tokio::test]
async fn test_headers_sent() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("authorization", "Bearer token-7"))
        .and(header("ConsistencyLevel", "eventual"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(Duration::from_secs(5))?;
    let outcome = client.get(&header_for("token-7", true), &server.uri()).await;
    assert!(matches!(outcome, Outcome::Success(_)));
    Ok(())
}

#[test]
fn test_header_debug_redacts_token() {
    let header = header_for("super-secret-token", false);
    let rendered = format!("{:?}", header);
    assert!(!rendered.contains("super-secret-token"));
    assert!(rendered.contains("redacted"));
}
