//! The local onboarding HTTP control surface.
//!
//! Mirrors the teacher's `AppState`/`ApiError`/`create_router` layout.
//! Handlers never touch the scheduler directly: reads go through blackboard
//! accessor methods and writes go through the submission port, so the HTTP
//! server and the scheduler share no mutable state except the blackboard's
//! own synchronization.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gwcore::{Blackboard, CommandWriteTask, OpenDeviceTask, SecureElement, WifiScanner};
use shared::api::{
    DeviceSetupRequest, HealthResponse, MessageIdsResponse, ModbusCommand, ModbusRequest,
    NetworkAddressResponse, NetworkConnection, NetworkConnectionsResponse, StatusResponse,
    UptimeResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const SERVICE_NAME: &str = "energy-gateway";

#[derive(Clone)]
pub struct AppState {
    pub blackboard: Arc<Blackboard>,
    pub wifi_scanner: Arc<dyn WifiScanner>,
    pub retry_delay_ms: u64,
    pub initial_harvest_delay_ms: u64,
    pub batch_size: usize,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/uptime", get(get_uptime))
        .route("/api/network/address", get(get_network_address))
        .route("/api/network/connections", get(get_network_connections))
        .route("/api/message", get(get_message))
        .route("/api/device", post(post_device))
        .route("/api/modbus", post(post_modbus))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_uptime(State(state): State<AppState>) -> Json<UptimeResponse> {
    Json(UptimeResponse {
        msek: state.blackboard.time_ms(),
    })
}

async fn get_network_address(State(state): State<AppState>) -> Json<NetworkAddressResponse> {
    Json(NetworkAddressResponse {
        ip: crate::network::local_ipv4().unwrap_or_else(|| "no network".to_string()),
        port: state.blackboard.rest_port(),
    })
}

async fn get_network_connections(
    State(state): State<AppState>,
) -> Result<Json<NetworkConnectionsResponse>, ApiError> {
    let networks = state
        .wifi_scanner
        .scan()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(NetworkConnectionsResponse {
        connections: networks
            .into_iter()
            .map(|n| NetworkConnection {
                ssid: n.ssid,
                known: n.known,
            })
            .collect(),
    }))
}

async fn get_message(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    match params.get("id") {
        None => {
            let ids = state.blackboard.message_ids().await;
            Ok(Json(MessageIdsResponse { ids }).into_response())
        }
        Some(raw_id) => {
            let id: u64 = raw_id
                .parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid message id '{raw_id}'")))?;
            match state.blackboard.message(id).await {
                Some(message) => Ok(Json(message).into_response()),
                None => Ok((StatusCode::NOT_FOUND, Json(StatusResponse::error("no such message"))).into_response()),
            }
        }
    }
}

async fn post_device(
    State(state): State<AppState>,
    Json(request): Json<DeviceSetupRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let session = match request.kind {
        shared::api::DeviceKind::Tcp => {
            crate::modbus::ModbusSession::tcp(request.ip.clone(), request.port, request.address)
                .map_err(|e| ApiError::BadRequest(format!("invalid device setup: {e}")))?
        }
        // RTU devices address a serial path rather than a host:port pair;
        // the onboarding schema reuses the `ip` field to carry it.
        shared::api::DeviceKind::Rtu => {
            crate::modbus::ModbusSession::rtu(request.ip.clone(), 9600, request.address)
        }
    };
    let device_id =
        crate::bootstrap_io::encode_device_id(request.kind, &request.ip, request.port, request.address);
    let now = state.blackboard.time_ms();
    let task = Box::new(OpenDeviceTask::new(
        now,
        state.blackboard.clone(),
        device_id,
        request.kind,
        Arc::new(session),
        state.retry_delay_ms,
        state.initial_harvest_delay_ms,
        state.batch_size,
        state.backoff_min_ms,
        state.backoff_max_ms,
    ));
    state
        .blackboard
        .submission_port()
        .submit(task)
        .await
        .map_err(|_| ApiError::Internal("scheduler is shutting down".to_string()))?;
    Ok(Json(StatusResponse::ok()))
}

async fn post_modbus(
    State(state): State<AppState>,
    Json(request): Json<ModbusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    if request.commands.is_empty() {
        return Err(ApiError::BadRequest("commands must not be empty".to_string()));
    }
    if state.blackboard.current_device().await.is_none() {
        return Err(ApiError::BadRequest("no device registered".to_string()));
    }

    let mut commands = Vec::with_capacity(request.commands.len());
    for raw in &request.commands {
        let command = ModbusCommand::from_value(raw).map_err(|e| {
            warn!(error = %e, "post_modbus: malformed command");
            ApiError::Internal(e)
        })?;
        commands.push(command);
    }

    let now = state.blackboard.time_ms();
    let task = Box::new(CommandWriteTask::new(now, state.blackboard.clone(), commands));
    state
        .blackboard
        .submission_port()
        .submit(task)
        .await
        .map_err(|_| ApiError::Internal("scheduler is shutting down".to_string()))?;
    Ok(Json(StatusResponse::ok()))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(StatusResponse::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwcore::{HttpClient, HttpReply};

    struct NullSecureElement;
    #[async_trait::async_trait]
    impl SecureElement for NullSecureElement {
        async fn serial_number(&self) -> anyhow::Result<String> {
            Ok("SN".into())
        }
        async fn sign(&self, _payload: &serde_json::Value) -> anyhow::Result<String> {
            Ok("token".into())
        }
    }

    struct OkHttpClient;
    #[async_trait::async_trait]
    impl HttpClient for OkHttpClient {
        async fn post_json(&self, _url: &str, _body: serde_json::Value) -> anyhow::Result<HttpReply> {
            Ok(HttpReply {
                status: 200,
                body: serde_json::json!({}),
            })
        }
    }

    fn test_state() -> AppState {
        let (bb, _rx) = Blackboard::new(
            5000,
            "https://backend.example/upload".into(),
            "https://backend.example/settings".into(),
            Arc::new(NullSecureElement),
            Arc::new(OkHttpClient),
            16,
        );
        AppState {
            blackboard: Arc::new(bb),
            wifi_scanner: Arc::new(crate::wifi_scanner_stub::NullWifiScanner),
            retry_delay_ms: 10_000,
            initial_harvest_delay_ms: 10_000,
            batch_size: 10,
            backoff_min_ms: 1_000,
            backoff_max_ms: 256_000,
        }
    }

    #[tokio::test]
    async fn test_get_uptime() {
        let state = test_state();
        let response = get_uptime(State(state)).await;
        let _ = response.0.msek;
    }

    #[tokio::test]
    async fn test_get_message_unknown_id_returns_404() {
        let state = test_state();
        let mut params = HashMap::new();
        params.insert("id".to_string(), "42".to_string());
        let response = get_message(State(state), Query(params)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_modbus_without_device_is_bad_request() {
        let state = test_state();
        let request = ModbusRequest {
            commands: vec![serde_json::json!({"type": "pause", "duration": 1000})],
        };
        let result = post_modbus(State(state), Json(request)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_post_modbus_empty_commands_is_bad_request() {
        let state = test_state();
        let request = ModbusRequest { commands: vec![] };
        let result = post_modbus(State(state), Json(request)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
