//! HTTP control API.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use meshsim_engine::{
    DefaultsPatch, LinkDefaults, LinkField, LinkOverride, MeshEngine, NodeId, TopologyView,
};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::traffic::{LogQuery, TrafficEvent};
use crate::ws;

/// Shared application state.
pub struct AppState {
    pub engine: MeshEngine,
    pub traffic: broadcast::Sender<TrafficEvent>,
}

impl AppState {
    pub fn new(engine: MeshEngine) -> Arc<Self> {
        let (traffic, _) = broadcast::channel(1024);
        Arc::new(Self { engine, traffic })
    }
}

/// Build the router for the control API.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/server", post(add_server_handler))
        .route("/server/{id}", axum::routing::delete(remove_server_handler))
        .route("/server/{id}/position", put(move_server_handler))
        .route("/data", get(data_handler))
        .route("/costs", get(costs_handler))
        .route("/path/{a}/{b}", get(path_handler))
        .route("/defaults", get(get_defaults_handler).put(put_defaults_handler))
        .route(
            "/link/{a}/{b}/{field}",
            put(put_link_handler).delete(delete_link_handler),
        )
        .route("/messages", post(send_messages_handler))
        .route("/messages/bootstrap", post(bootstrap_handler))
        .route("/log", get(log_handler))
        .route("/event_notifs", get(ws::event_notifs_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    nodes: usize,
    generation: u64,
    rewire: String,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        nodes: state.engine.nodes().len(),
        generation: state.engine.state().generation,
        rewire: state.engine.rewire_state().to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct PositionRequest {
    x: f64,
    y: f64,
}

#[derive(Serialize)]
struct AddServerResponse {
    id: NodeId,
}

async fn add_server_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PositionRequest>,
) -> ApiResult<(StatusCode, Json<AddServerResponse>)> {
    let id = state.engine.add_node(req.x, req.y).await?;
    Ok((StatusCode::CREATED, Json(AddServerResponse { id })))
}

async fn move_server_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NodeId>,
    Json(req): Json<PositionRequest>,
) -> ApiResult<StatusCode> {
    state.engine.move_node(id, req.x, req.y).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_server_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<NodeId>,
) -> ApiResult<StatusCode> {
    state.engine.remove_node(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn data_handler(State(state): State<Arc<AppState>>) -> Json<TopologyView> {
    Json(state.engine.topology_view())
}

async fn costs_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<BTreeMap<NodeId, BTreeMap<NodeId, f64>>>> {
    state.engine.costs().map(Json).ok_or(ApiError::NotReady)
}

#[derive(Serialize)]
struct PathResponse {
    path: Option<Vec<NodeId>>,
}

async fn path_handler(
    State(state): State<Arc<AppState>>,
    Path((a, b)): Path<(NodeId, NodeId)>,
) -> ApiResult<Json<PathResponse>> {
    let path = state.engine.path(a, b)?;
    Ok(Json(PathResponse { path }))
}

async fn get_defaults_handler(State(state): State<Arc<AppState>>) -> Json<LinkDefaults> {
    Json(state.engine.defaults().as_ref().clone())
}

async fn put_defaults_handler(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<DefaultsPatch>,
) -> ApiResult<Json<LinkDefaults>> {
    let defaults = state.engine.set_defaults(&patch).await?;
    Ok(Json(defaults.as_ref().clone()))
}

fn parse_field(field: &str) -> ApiResult<LinkField> {
    field.parse().map_err(ApiError::Unprocessable)
}

async fn put_link_handler(
    State(state): State<Arc<AppState>>,
    Path((a, b, field)): Path<(NodeId, NodeId, String)>,
    Json(patch): Json<LinkOverride>,
) -> ApiResult<StatusCode> {
    let field = parse_field(&field)?;
    if patch.get(field).is_none() {
        return Err(ApiError::Unprocessable(format!("body does not set {field}")));
    }
    state.engine.set_link_override(a, b, &patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_link_handler(
    State(state): State<Arc<AppState>>,
    Path((a, b, field)): Path<(NodeId, NodeId, String)>,
) -> ApiResult<StatusCode> {
    let field = parse_field(&field)?;
    state.engine.clear_link_override(a, b, field).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SendMessagesRequest {
    #[serde(default)]
    node_ids: Vec<NodeId>,
    #[serde(default = "default_message_size")]
    message_size: usize,
}

fn default_message_size() -> usize {
    64
}

fn random_message(size: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect()
}

async fn send_messages_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendMessagesRequest>,
) -> ApiResult<StatusCode> {
    if req.node_ids.is_empty() {
        return Err(ApiError::Unprocessable("no node ids provided".to_string()));
    }
    if let Some(id) = req.node_ids.iter().find(|id| state.engine.node(**id).is_none()) {
        return Err(ApiError::Unprocessable(format!("invalid node id {id}")));
    }

    let message = random_message(req.message_size);
    for id in req.node_ids {
        state.engine.send_message(id, &message).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn bootstrap_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    state.engine.bootstrap().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn log_handler(State(state): State<Arc<AppState>>, Query(query): Query<LogQuery>) -> StatusCode {
    debug!(server = %query.server, msg = %query.msg, "Node log");
    for event in query.into_events(&state.engine) {
        // No viewers is fine.
        let _ = state.traffic.send(event);
    }
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use meshsim_engine::{EngineConfig, MemoryProvider};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<AppState>, Arc<MemoryProvider>) {
        let provider = Arc::new(MemoryProvider::new());
        let engine = MeshEngine::new(provider.clone(), EngineConfig::fast());
        let state = AppState::new(engine);
        (router(state.clone()), state, provider)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn add(app: &Router, x: f64, y: f64) -> u64 {
        let (status, body) = call(app, "POST", "/server", Some(json!({"x": x, "y": y}))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn costs_are_unavailable_before_first_rewire() {
        let (app, _, _) = app();
        let (status, _) = call(&app, "GET", "/costs", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn add_nodes_and_query_paths() {
        let (app, _, _) = app();
        let a = add(&app, 0.0, 0.0).await;
        let b = add(&app, 50.0, 0.0).await;
        let c = add(&app, 200.0, 0.0).await;

        let (status, body) = call(&app, "GET", &format!("/path/{a}/{c}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"], json!([a, c]));

        let (status, costs) = call(&app, "GET", "/costs", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(costs[a.to_string()][b.to_string()], json!(50.0));

        let (_, data) = call(&app, "GET", "/data", None).await;
        assert_eq!(data["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(data["links"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_node_is_not_found() {
        let (app, _, _) = app();
        let a = add(&app, 0.0, 0.0).await;
        let (status, body) = call(&app, "GET", &format!("/path/{a}/42"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("42"));

        let (status, _) = call(&app, "DELETE", "/server/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn link_override_round_trip() {
        let (app, state, _) = app();
        let a = add(&app, 0.0, 0.0).await;
        let b = add(&app, 100.0, 0.0).await;

        let uri = format!("/link/{a}/{b}/bandwidth");
        let (status, _) = call(&app, "PUT", &uri, Some(json!({"bandwidth": 0}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = call(&app, "GET", &format!("/path/{a}/{b}"), None).await;
        assert_eq!(body["path"], Value::Null);

        let (status, _) = call(&app, "DELETE", &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.engine.state().overrides.is_empty());
        let (_, body) = call(&app, "GET", &format!("/path/{a}/{b}"), None).await;
        assert_eq!(body["path"], json!([a, b]));
    }

    #[tokio::test]
    async fn malformed_link_requests_are_rejected() {
        let (app, _, _) = app();
        let a = add(&app, 0.0, 0.0).await;
        let b = add(&app, 100.0, 0.0).await;

        let (status, _) = call(&app, "PUT", &format!("/link/{a}/{b}/colour"), Some(json!({}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/link/{a}/{b}/latency"),
            Some(json!({"jitter": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/link/{a}/{b}/packet_loss"),
            Some(json!({"packet_loss": 150})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn defaults_can_be_patched() {
        let (app, _, _) = app();
        let (status, body) = call(&app, "GET", "/defaults", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["max_latency"], 300);
        assert_eq!(body["cost_function"], "cost_min_latency");

        let (status, body) = call(
            &app,
            "PUT",
            "/defaults",
            Some(json!({"cost_function": "cost_max_bandwidth", "jitter": 5})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cost_function"], "cost_max_bandwidth");
        assert_eq!(body["jitter"], 5);
        assert_eq!(body["max_latency"], 300);

        let (status, _) = call(&app, "PUT", "/defaults", Some(json!({"max_latency": 0}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn messages_are_sent_from_each_node() {
        let (app, _, provider) = app();
        let a = add(&app, 0.0, 0.0).await;
        let b = add(&app, 100.0, 0.0).await;

        let (status, _) = call(&app, "POST", "/messages", Some(json!({"node_ids": []}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = call(&app, "POST", "/messages", Some(json!({"node_ids": [a, 9]}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(provider.messages().is_empty());

        let (status, _) = call(
            &app,
            "POST",
            "/messages",
            Some(json!({"node_ids": [a, b], "message_size": 16})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let messages = provider.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].1.len(), 16);
        assert_eq!(messages[0].1, messages[1].1);
    }

    #[tokio::test]
    async fn bootstrap_passes_started_nodes() {
        let (app, _, provider) = app();
        let a = add(&app, 0.0, 0.0).await;
        let (status, _) = call(&app, "POST", "/messages/bootstrap", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(provider.bootstraps(), vec![vec![NodeId(a)]]);
    }

    #[tokio::test]
    async fn move_and_remove_nodes() {
        let (app, state, provider) = app();
        let a = add(&app, 0.0, 0.0).await;
        let b = add(&app, 100.0, 0.0).await;

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/server/{b}/position"),
            Some(json!({"x": 1000.0, "y": 0.0})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.engine.path(NodeId(a), NodeId(b)).unwrap(), None);

        let (status, _) = call(&app, "DELETE", &format!("/server/{b}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(provider.stopped(), vec![NodeId(b)]);

        let (_, health) = call(&app, "GET", "/health", None).await;
        assert_eq!(health["nodes"], 1);
        assert_eq!(health["rewire"], "Idle");
    }

    #[tokio::test]
    async fn log_lines_become_traffic_events() {
        let (app, state, _) = app();
        let mut traffic = state.traffic.subscribe();

        let (status, _) = call(
            &app,
            "GET",
            "/log?server=synapse1&msg=ReceivedPDU&event_id=e1&origin=synapse0",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(
            traffic.try_recv().unwrap(),
            TrafficEvent::Receive {
                source: "synapse0".into(),
                target: "synapse1".into(),
                event: "e1".into(),
            }
        );
    }
}
