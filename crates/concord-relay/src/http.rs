//! The relay's HTTP API: `/info`, `/register`, `/lookup`, `/send`, `/poll`,
//! `/health`. Every response carries `Access-Control-Allow-Origin: *` via a
//! permissive `CorsLayer` — this service has no session/cookie state for a
//! same-origin policy to protect, unlike the rest of this workspace's HTTP
//! surfaces.

use std::{
    sync::{atomic::{AtomicUsize, Ordering}, Arc},
    time::Instant,
};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::{queue::MessageQueue, registry::InviteRegistry};

pub struct RelayState {
    pub relay_peer_id: String,
    pub relay_addr: String,
    pub external_relay_addr: String,
    pub registry: InviteRegistry,
    pub queue: MessageQueue,
    pub started_at: Instant,
    pub connected_peers: AtomicUsize,
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/info", get(info))
        .route("/register", get(register))
        .route("/lookup", get(lookup))
        .route("/send", post(send))
        .route("/poll", get(poll))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct InfoResponse {
    #[serde(rename = "relayPeerId")]
    relay_peer_id: String,
    #[serde(rename = "relayAddrs")]
    relay_addrs: Vec<String>,
    #[serde(rename = "externalRelayAddr")]
    external_relay_addr: String,
}

async fn info(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(InfoResponse {
        relay_peer_id: state.relay_peer_id.clone(),
        relay_addrs: vec![state.relay_addr.clone()],
        external_relay_addr: state.external_relay_addr.clone(),
    })
}

#[derive(Deserialize)]
struct PeerIdQuery {
    #[serde(rename = "peerId")]
    peer_id: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    code: String,
    #[serde(rename = "relayPeerId")]
    relay_peer_id: String,
    #[serde(rename = "relayAddr")]
    relay_addr: String,
    #[serde(rename = "circuitAddr")]
    circuit_addr: String,
}

async fn register(
    State(state): State<Arc<RelayState>>,
    Query(q): Query<PeerIdQuery>,
) -> impl IntoResponse {
    if q.peer_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "missing peerId"})))
            .into_response();
    }

    let code = state.registry.register(&q.peer_id);
    let circuit_addr = circuit_addr(&state.external_relay_addr, &q.peer_id);
    (
        StatusCode::OK,
        Json(RegisterResponse {
            code,
            relay_peer_id: state.relay_peer_id.clone(),
            relay_addr: state.relay_addr.clone(),
            circuit_addr,
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
struct CodeQuery {
    code: String,
}

#[derive(Serialize)]
struct LookupResponse {
    #[serde(rename = "peerId")]
    peer_id: String,
    #[serde(rename = "relayAddr")]
    relay_addr: String,
    #[serde(rename = "circuitAddr")]
    circuit_addr: String,
}

async fn lookup(
    State(state): State<Arc<RelayState>>,
    Query(q): Query<CodeQuery>,
) -> impl IntoResponse {
    match state.registry.lookup(&q.code) {
        Some(entry) => {
            let circuit_addr = circuit_addr(&state.external_relay_addr, &entry.peer_id);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "peerId": entry.peer_id,
                    "relayAddr": state.relay_addr,
                    "circuitAddr": circuit_addr,
                })),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "unknown invite code"})),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct SendBody {
    to: String,
    from: String,
    #[serde(rename = "channelId")]
    channel_id: String,
    data: String,
}

async fn send(
    State(state): State<Arc<RelayState>>,
    body: Result<Json<SendBody>, axum::extract::rejection::JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(body)) = body else {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "invalid body"})))
            .into_response();
    };
    if body.to.trim().is_empty() || body.from.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "missing to/from"})),
        )
            .into_response();
    }

    state.queue.enqueue(&body.to, &body.from, &body.channel_id, &body.data);
    (StatusCode::OK, Json(serde_json::json!({"ok": true}))).into_response()
}

#[derive(Deserialize)]
struct PollQuery {
    #[serde(rename = "peerId")]
    peer_id: String,
    since: Option<u64>,
}

async fn poll(
    State(state): State<Arc<RelayState>>,
    Query(q): Query<PollQuery>,
) -> impl IntoResponse {
    let messages = state.queue.drain(&q.peer_id, q.since.unwrap_or(0));
    (StatusCode::OK, Json(serde_json::json!({"messages": messages}))).into_response()
}

async fn health(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "relayPeerId": state.relay_peer_id,
        "peers": state.connected_peers.load(Ordering::Relaxed),
        "codes": state.registry.code_count(),
        "uptime": state.started_at.elapsed().as_secs(),
    }))
}

fn circuit_addr(external_relay_addr: &str, peer_id: &str) -> String {
    format!("{external_relay_addr}/p2p-circuit/p2p/{peer_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> Arc<RelayState> {
        Arc::new(RelayState {
            relay_peer_id: "12D3KooWRelay".into(),
            relay_addr: "/ip4/127.0.0.1/tcp/9090/ws/p2p/12D3KooWRelay".into(),
            external_relay_addr: "/dns4/relay.example.com/tcp/9090/ws/p2p/12D3KooWRelay".into(),
            registry: InviteRegistry::new(),
            queue: MessageQueue::new(),
            started_at: Instant::now(),
            connected_peers: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn info_reports_relay_identity() {
        let app = router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_then_lookup_round_trips() {
        let state = test_state();
        let app = router(state.clone());

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/register?peerId=alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let code = json["code"].as_str().unwrap().to_string();

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/lookup?code={code}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["peerId"], "alice");
    }

    #[tokio::test]
    async fn lookup_unknown_code_is_404() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/lookup?code=ZZZZ-ZZZZ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn send_then_poll_delivers_message() {
        let state = test_state();
        let app = router(state.clone());

        let body = serde_json::json!({"to": "bob", "from": "alice", "channelId": "general", "data": "hi"});
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/send")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/poll?peerId=bob&since=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn health_reports_peer_and_code_counts() {
        let state = test_state();
        state.connected_peers.store(3, Ordering::Relaxed);
        state.registry.register("peer-a");
        let app = router(state);

        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["peers"], 3);
        assert_eq!(json["codes"], 1);
    }

    #[tokio::test]
    async fn responses_carry_permissive_cors_header() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "https://anything.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            resp.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }
}
