mod common;

use common::{Reply, StubServer, TEST_TOKEN, fast_retry};
use dbperms_integrations::{
    ApiRequest, DatabricksConfig, DatabricksRestClient, ErrorKind, ObjectType, PermissionsApi,
    RetryPolicy, Transport,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_get_503_is_retried_with_growing_backoff() {
    let server = StubServer::start(vec![Reply::json(
        503,
        json!({"error_code": "TEMPORARILY_UNAVAILABLE", "message": "try later"}),
    )])
    .await;
    let client = server.client(fast_retry(), TIMEOUT);

    let err = client
        .send(ApiRequest::get("/api/2.0/permissions/clusters/c1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(err.message, "TEMPORARILY_UNAVAILABLE: try later");

    let requests = server.requests();
    assert_eq!(requests.len(), 3);
    let first_gap = requests[1].received_at - requests[0].received_at;
    let second_gap = requests[2].received_at - requests[1].received_at;
    assert!(first_gap >= Duration::from_millis(20), "{:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(40), "{:?}", second_gap);
}

#[tokio::test]
async fn test_get_recovers_after_transient_failure() {
    let server = StubServer::start(vec![
        Reply::raw(502, "<html>bad gateway</html>"),
        Reply::json(200, json!({"access_control_list": []})),
    ])
    .await;
    let client = server.client(fast_retry(), TIMEOUT);

    let value = client
        .send(ApiRequest::get("/api/2.0/permissions/jobs/1"))
        .await
        .unwrap();
    assert_eq!(value, json!({"access_control_list": []}));
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn test_post_after_response_is_not_retried() {
    let server = StubServer::start(vec![Reply::json(503, json!({"message": "overloaded"}))]).await;
    let client = server.client(fast_retry(), TIMEOUT);

    let err = client
        .send(ApiRequest::post("/api/2.0/git-credentials").json(json!({"git_provider": "gitHub"})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(err.message, "overloaded");
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_put_timeout_is_not_retried() {
    let server = StubServer::start(vec![
        Reply::json(200, json!({})).delayed(Duration::from_millis(1500)),
    ])
    .await;
    let client = server.client(fast_retry(), Duration::from_millis(200));

    let err = client
        .send(ApiRequest::put("/api/2.0/permissions/clusters/c1").json(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(server.requests().len(), 1);
}

fn refused_client(max_attempts: u32) -> DatabricksRestClient {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let config = DatabricksConfig::new(format!("http://{}", address), TEST_TOKEN)
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts,
            base_delay_ms: 150,
            factor: 2,
            max_delay_ms: 1000,
        });
    DatabricksRestClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let client = refused_client(1);

    let started = Instant::now();
    let err = client
        .send(ApiRequest::get("/api/2.0/permissions/clusters/c1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::TransportError);
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[tokio::test]
async fn test_unsent_requests_are_retried_for_every_method() {
    let client = refused_client(3);

    // three attempts sleep 150 ms then 300 ms between them
    for request in [
        ApiRequest::delete("/api/2.0/git-credentials/1"),
        ApiRequest::post("/api/2.0/git-credentials").json(json!({"git_provider": "gitHub"})),
    ] {
        let method = request.method.clone();
        let started = Instant::now();
        let err = client.send(request).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(450), "{} took {:?}", method, elapsed);
    }
}

#[tokio::test]
async fn test_get_429_is_retried() {
    let server = StubServer::start(vec![
        Reply::json(
            429,
            json!({"error_code": "REQUEST_LIMIT_EXCEEDED", "message": "slow down"}),
        ),
        Reply::json(200, json!({"access_control_list": []})),
    ])
    .await;
    let client = server.client(fast_retry(), TIMEOUT);

    let value = client
        .send(ApiRequest::get("/api/2.0/permissions/clusters/c1"))
        .await
        .unwrap();
    assert_eq!(value, json!({"access_control_list": []}));

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].received_at - requests[0].received_at >= Duration::from_millis(20));
}

#[tokio::test]
async fn test_delete_429_is_not_retried() {
    let server = StubServer::start(vec![Reply::json(429, json!({"message": "slow down"}))]).await;
    let client = server.client(fast_retry(), TIMEOUT);

    let err = client
        .send(ApiRequest::delete("/api/2.0/git-credentials/1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ClientError);
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_status_kinds_and_scim_detail() {
    let server = StubServer::start(vec![Reply::json(
        404,
        json!({"schemas": ["urn:ietf:params:scim:api:messages:2.0:Error"], "detail": "User not found", "status": "404"}),
    )])
    .await;
    let client = server.client(fast_retry(), TIMEOUT);

    let err = client
        .send(ApiRequest::get("/api/2.0/account/scim/v2/ServicePrincipals/9"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.message, "User not found");
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_request_carries_auth_and_query() {
    let server = StubServer::start(vec![Reply::raw(200, "")]).await;
    let client = server.client(fast_retry(), TIMEOUT);

    let value = client
        .send(
            ApiRequest::get("/api/2.0/workspace/get-status").query("path", "/Users/a@x.com/etl"),
        )
        .await
        .unwrap();
    assert_eq!(value, json!({}));

    let request = &server.requests()[0];
    assert_eq!(request.method, "GET");
    assert!(request.target.starts_with("/api/2.0/workspace/get-status?path="));
    assert_eq!(
        request.header("authorization"),
        Some(format!("Bearer {}", TEST_TOKEN).as_str())
    );
    assert_eq!(request.header("accept"), Some("application/json"));
    assert!(request.header("user-agent").unwrap().starts_with("dbperms/"));
}

#[tokio::test]
async fn test_permissions_adapter_over_http() {
    let server = StubServer::start(vec![Reply::json(
        200,
        json!({"access_control_list": [{"user_name": "a@x.com", "permission_level": "CAN_MANAGE"}]}),
    )])
    .await;
    let api = PermissionsApi::new(Arc::new(server.client(fast_retry(), TIMEOUT)));

    let acl = api.get(ObjectType::Clusters, "123456789").await.unwrap();
    assert_eq!(
        serde_json::to_value(&acl).unwrap(),
        json!({"access_control_list": [{"principal": "a@x.com", "permission_level": "CAN_MANAGE"}]})
    );
    assert_eq!(
        server.requests()[0].target,
        "/api/2.0/permissions/clusters/123456789"
    );
}
