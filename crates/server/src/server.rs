use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use std::sync::Arc;

use crate::{bills, groups, hub, investments, user, webhook};
use engine::{Engine, users};

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub db: DatabaseConnection,
    pub hub: hub::Hub,
    /// Shared secret of the payment and issuing webhooks. `None` accepts
    /// unsigned deliveries.
    pub webhook_secret: Option<String>,
}

impl ServerState {
    pub fn new(engine: Arc<Engine>, db: DatabaseConnection, hub: hub::Hub) -> Self {
        Self {
            engine,
            db,
            hub,
            webhook_secret: None,
        }
    }

    #[must_use]
    pub fn webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }
}

async fn auth(
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(TypedHeader(auth_header)) = auth_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if auth_header.username().is_empty() || auth_header.password().is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user: Option<users::Model> = users::Entity::find()
        .filter(users::Column::Username.eq(auth_header.username()))
        .filter(users::Column::Password.eq(auth_header.password()))
        .one(&state.db)
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let Some(user) = user else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(state: ServerState) -> Router {
    let authenticated = Router::new()
        .route("/groups", post(groups::create).get(groups::list))
        .route("/groups/{id}", get(groups::get))
        .route(
            "/groups/{id}/members",
            get(groups::members).post(groups::invite),
        )
        .route("/groups/{id}/members/accept", post(groups::accept))
        .route("/groups/{id}/members/{username}", patch(groups::set_status))
        .route("/groups/{id}/threshold", patch(groups::set_threshold))
        .route("/groups/{id}/bills", get(bills::list))
        .route("/groups/{id}/votes", get(investments::list_votes))
        .route("/groups/{id}/investments", get(investments::positions))
        .route("/groups/{id}/transactions", get(groups::transactions))
        .route("/bills", post(bills::create))
        .route("/bills/{id}", get(bills::get))
        .route("/bills/{id}/submit", post(bills::submit))
        .route("/bills/{id}/cancel", post(bills::cancel))
        .route("/bills/{id}/card", post(bills::create_card))
        .route("/bills/{id}/cards", get(bills::cards))
        .route(
            "/bills/{id}/participants/{username}/retry",
            post(bills::retry),
        )
        .route("/investments/propose", post(investments::propose))
        .route("/investments/vote", post(investments::vote))
        .route("/investments/votes/{id}", get(investments::get_vote))
        .route("/investments/votes/{id}/cancel", post(investments::cancel))
        .route("/user/payment-method", post(user::link_payment_method))
        .route("/user/bank/exchange", post(user::bank_exchange))
        .route("/notifications", get(user::notifications))
        .route("/notifications/{id}/read", post(user::mark_read))
        .route("/dashboard", get(user::dashboard))
        .route("/transactions", get(user::transactions))
        .route("/ws", get(hub::ws_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .merge(authenticated)
        .route("/health", get(health))
        .route("/webhooks/payments", post(webhook::payment))
        .route("/webhooks/issuing", post(webhook::issuing))
        .with_state(state)
}

pub async fn run(state: ServerState, addr: &str) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind server listener on {addr}: {err}");
            return;
        }
    };
    if let Err(err) = run_with_listener(state, listener).await {
        tracing::error!("server failed: {err}");
    }
}

pub async fn run_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(state)).await
}

pub fn spawn_with_listener(
    state: ServerState,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(state, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}
