use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use sea_orm::Database;
use serde_json::{Value, json};
use tower::util::ServiceExt;

use engine::Engine;
use migration::MigratorTrait;
use server::{Hub, SIGNATURE_HEADER, ServerState, router, sign_webhook};

async fn app_with_secret(secret: Option<&str>) -> (Router, Arc<Engine>) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let hub = Hub::default();
    let engine = Arc::new(
        Engine::builder()
            .database(db.clone())
            .broadcast(Arc::new(hub.clone()))
            .build()
            .await
            .unwrap(),
    );
    for name in ["alice", "bob", "mallory"] {
        engine.create_user(name, "secret", None).await.unwrap();
    }
    let state = ServerState::new(Arc::clone(&engine), db, hub)
        .webhook_secret(secret.map(str::to_string));
    (router(state), engine)
}

fn basic(username: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:secret")))
}

fn request(method: &str, uri: &str, username: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, basic(username));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_group(app: &Router) -> String {
    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/groups",
            "alice",
            Some(json!({"name": "Dinner club", "kind": "friends"})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let group_id = json_body(res).await["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/groups/{group_id}/members"),
            "alice",
            Some(json!({"username": "bob", "role": "member"})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/groups/{group_id}/members/accept"),
            "bob",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    group_id
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let (app, _engine) = app_with_secret(None).await;
    let res = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn wrong_credentials_are_rejected() {
    let (app, _engine) = app_with_secret(None).await;
    let res = app
        .clone()
        .oneshot(Request::get("/groups").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let wrong = format!("Basic {}", STANDARD.encode("alice:nope"));
    let res = app
        .oneshot(
            Request::get("/groups")
                .header(header::AUTHORIZATION, wrong)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bill_is_split_and_readable_by_members_only() {
    let (app, _engine) = app_with_secret(None).await;
    let group_id = create_group(&app).await;

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/bills",
            "alice",
            Some(json!({
                "group_id": group_id,
                "merchant": "Trattoria",
                "items": [
                    {"id": 1, "name": "Pizza", "price_minor": 2000},
                    {"id": 2, "name": "Pasta", "price_minor": 1000}
                ],
                "tax_minor": 300,
                "claims": [
                    {"username": "alice", "item_ids": [1]},
                    {"username": "bob", "item_ids": [2]}
                ]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let bill_id = json_body(res).await["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(request("GET", &format!("/bills/{bill_id}"), "bob", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail = json_body(res).await;
    assert_eq!(detail["bill"]["total_minor"], 3300);
    assert_eq!(detail["settlement"]["state"], "not_started");
    let owed: Vec<i64> = detail["participants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["owed_minor"].as_i64().unwrap())
        .collect();
    assert_eq!(owed.iter().sum::<i64>(), 3300);

    let res = app
        .clone()
        .oneshot(request("GET", &format!("/bills/{bill_id}"), "mallory", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .oneshot(request(
            "GET",
            &format!("/groups/{group_id}/bills?status=pending"),
            "alice",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_bills_map_to_422() {
    let (app, _engine) = app_with_secret(None).await;
    let group_id = create_group(&app).await;

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/bills",
            "alice",
            Some(json!({
                "group_id": group_id,
                "items": [{"id": 1, "name": "Pizza", "price_minor": 2000}],
                "claims": [{"username": "alice", "item_ids": [7]}]
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json_body(res).await["error"].is_string());

    let res = app
        .oneshot(request(
            "POST",
            "/bills",
            "alice",
            Some(json!({
                "group_id": group_id,
                "claims": [{"username": "alice", "item_ids": []}],
                "receipt_image": "%%% not base64 %%%"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proposals_are_voted_over_http() {
    let (app, _engine) = app_with_secret(None).await;
    let group_id = create_group(&app).await;

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/investments/propose",
            "alice",
            Some(json!({
                "group_id": group_id,
                "action": "buy",
                "symbol": "vti",
                "amount_minor": 10000,
                "shares_micros": 1000000,
                "reasoning": "index fund"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let vote_id = json_body(res).await["vote_id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/investments/vote",
            "mallory",
            Some(json!({"vote_id": vote_id, "decision": "yes"})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/investments/vote",
            "bob",
            Some(json!({"vote_id": vote_id, "decision": "yes"})),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["status"], "approved");

    let res = app
        .oneshot(request(
            "GET",
            &format!("/investments/votes/{vote_id}"),
            "bob",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail = json_body(res).await;
    assert_eq!(detail["vote"]["symbol"], "VTI");
    assert_eq!(detail["tally"]["yes"], 2);
}

#[tokio::test]
async fn signed_webhooks_are_verified() {
    let (app, _engine) = app_with_secret(Some("whsec_test")).await;
    let body = json!({
        "bill_id": "00000000-0000-0000-0000-000000000000",
        "username": "alice",
        "status": "succeeded",
        "charge_ref": "ch_1"
    })
    .to_string();

    let res = app
        .clone()
        .oneshot(
            Request::post("/webhooks/payments")
                .header(SIGNATURE_HEADER, "deadbeef")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let signature = sign_webhook("whsec_test", body.as_bytes()).unwrap_or_default();
    let res = app
        .oneshot(
            Request::post("/webhooks/payments")
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    // Signature accepted; the bill itself does not exist.
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn virtual_card_is_issued_and_authorizations_answered() {
    let (app, _engine) = app_with_secret(None).await;
    let group_id = create_group(&app).await;
    let res = app
        .clone()
        .oneshot(request(
            "POST",
            "/bills",
            "alice",
            Some(json!({
                "group_id": group_id,
                "items": [{"id": 1, "name": "Groceries", "price_minor": 4250}],
                "claims": [{"username": "bob", "item_ids": [1]}],
                "draft": true
            })),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let bill_id = json_body(res).await["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(request("POST", &format!("/bills/{bill_id}/card"), "bob", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let card = json_body(res).await;
    assert_eq!(card["last4"], "0000");
    assert_eq!(card["spending_limit_minor"], 4250);
    assert_eq!(card["status"], "active");

    let res = app
        .clone()
        .oneshot(request("GET", &format!("/bills/{bill_id}/cards"), "mallory", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body = json!({
        "type": "issuing_authorization.created",
        "data": {"authorization_ref": "iauth_1", "card_ref": "card_unknown", "amount_minor": 100}
    });
    let res = app
        .clone()
        .oneshot(
            Request::post("/webhooks/issuing")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["approved"], false);

    let body = json!({"type": "issuing_card.created", "data": {"card_ref": "card_1"}});
    let res = app
        .oneshot(
            Request::post("/webhooks/issuing")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(json_body(res).await["approved"].is_null());
}

#[tokio::test]
async fn dashboard_starts_empty() {
    let (app, _engine) = app_with_secret(None).await;
    let res = app
        .oneshot(request("GET", "/dashboard", "alice", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let dashboard = json_body(res).await;
    assert_eq!(dashboard["total_paid_minor"], 0);
    assert_eq!(dashboard["bills_last_30_days"], 0);
}
