//! Integration tests for the REST collaborators and the HTTP board against a
//! mock HTTP server

use kiosk_gateway::domain::{AuditEntry, CardId, SkuDelta, User};
use kiosk_gateway::error::CollaboratorError;
use kiosk_gateway::infra::{BoardMode, Config};
use kiosk_gateway::io::RestClient;
use kiosk_gateway::services::collaborators::{
    AuditLog, AuthService, InferenceHeartbeat, InventoryService, LedgerService,
};
use kiosk_gateway::services::{ControllerBoard, HttpBoard};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CARD: &str = "0004277716";

fn sample_user() -> serde_json::Value {
    json!({ "accountID": 7, "personID": 11, "roleID": 1, "cardID": CARD })
}

fn take_two_x() -> Vec<SkuDelta> {
    vec![SkuDelta { sku: "X".to_string(), delta: -2 }]
}

async fn setup() -> (MockServer, RestClient) {
    let server = MockServer::start().await;
    let config = Config::default().with_service_base(&server.uri());
    let client = RestClient::new(&config).unwrap();
    (server, client)
}

#[tokio::test]
async fn test_auth_lookup_returns_user() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path(format!("/authentication/{CARD}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_user()))
        .expect(1)
        .mount(&server)
        .await;

    let user = client.lookup(&CardId::parse(CARD).unwrap()).await.unwrap();

    assert_eq!(
        user,
        Some(User { account_id: 7, person_id: 11, role_id: 1, card_id: CARD.to_string() })
    );
}

#[tokio::test]
async fn test_auth_rejections_mean_unauthorized() {
    for status in [401u16, 403, 404] {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let user = client.lookup(&CardId::parse(CARD).unwrap()).await.unwrap();
        assert!(user.is_none(), "status {status} should mean unauthorized");
    }
}

#[tokio::test]
async fn test_auth_server_error_is_failure() {
    let (server, client) = setup().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(500)).mount(&server).await;

    let result = client.lookup(&CardId::parse(CARD).unwrap()).await;

    assert!(matches!(result, Err(CollaboratorError::Status { status: 500, .. })));
}

#[tokio::test]
async fn test_auth_garbage_body_is_decode_error() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = client.lookup(&CardId::parse(CARD).unwrap()).await;

    assert!(matches!(result, Err(CollaboratorError::Decode { service: "authentication", .. })));
}

#[tokio::test]
async fn test_heartbeat_probe() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/heartbeat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.probe().await.is_ok());
}

#[tokio::test]
async fn test_heartbeat_unreachable() {
    // Nothing listens on port 1
    let config = Config::default().with_service_base("http://127.0.0.1:1");
    let client = RestClient::new(&config).unwrap();

    let result = client.probe().await;

    assert!(matches!(result, Err(CollaboratorError::Transport { .. })));
}

#[tokio::test]
async fn test_ledger_posts_deltas_for_account() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/ledger/7"))
        .and(body_json(json!([{ "SKU": "X", "delta": -2 }])))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accountID": 7,
            "balance": 12.5,
            "transactionAmount": 2.5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ledger = client.record_purchase(7, &take_two_x()).await.unwrap();

    assert_eq!(ledger.account_id, 7);
    assert_eq!(ledger.balance, 12.5);
    assert_eq!(ledger.transaction_amount, Some(2.5));
}

#[tokio::test]
async fn test_inventory_posts_deltas() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/inventory"))
        .and(body_json(json!([{ "SKU": "X", "delta": -2 }])))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.apply_deltas(&take_two_x()).await.is_ok());
}

#[tokio::test]
async fn test_audit_log_posts_entry() {
    let (server, client) = setup().await;
    let user = User { account_id: 7, person_id: 11, role_id: 1, card_id: CARD.to_string() };
    let entry = AuditEntry::new(Some(&user), take_two_x(), chrono::Utc::now());
    Mock::given(method("POST"))
        .and(path("/auditlog"))
        .and(body_json(serde_json::to_value(&entry).unwrap()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.append(&entry).await.is_ok());
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;
    let config =
        Config::default().with_service_base(&server.uri()).with_services_timeout_ms(200);
    let client = RestClient::new(&config).unwrap();

    let result = client.apply_deltas(&take_two_x()).await;

    assert!(matches!(result, Err(CollaboratorError::Transport { service: "inventory", .. })));
}

#[tokio::test]
async fn test_http_board_commands() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/board/unlock"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/board/display"))
        .and(body_json(json!({ "rows": ["Hello", CARD] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let config = Config::default().with_board(BoardMode::Http, &format!("{}/board", server.uri()));
    let board = HttpBoard::new(&config).unwrap();

    board.unlock().await.unwrap();
    board.display(&["Hello", CARD]).await.unwrap();
}

#[tokio::test]
async fn test_http_board_basic_auth_and_failure() {
    let server = MockServer::start().await;
    // admin:secret
    Mock::given(method("POST"))
        .and(path("/board/lock"))
        .and(header("Authorization", "Basic YWRtaW46c2VjcmV0"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    let url = server.uri().replacen("http://", "http://admin:secret@", 1);
    let config = Config::default().with_board(BoardMode::Http, &format!("{url}/board"));
    let board = HttpBoard::new(&config).unwrap();

    let result = board.lock().await;

    assert!(matches!(result, Err(CollaboratorError::Status { status: 503, .. })));
}
