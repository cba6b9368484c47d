//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the registry over HTTP. All
//! endpoints share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                      | Description                           |
//! |--------|---------------------------|---------------------------------------|
//! | GET    | `/health`                 | Liveness probe                        |
//! | GET    | `/status`                 | Registry status summary               |
//! | POST   | `/rpc`                    | JSON-RPC 2.0 gateway                  |
//! | GET    | `/ws`                     | WebSocket for live registry events    |
//! | GET    | `/payment-methods`        | Approved payment methods, in order    |
//! | GET    | `/properties/:id`         | Property record by id                 |
//! | GET    | `/tokenizations/:handle`  | Tokenization instance by handle       |
//!
//! ## JSON-RPC methods
//!
//! | Method                      | Params                     | Result            |
//! |-----------------------------|----------------------------|-------------------|
//! | `parcel_addPaymentMethods`  | `["0xA1", "0xB2", …]`      | new ledger length |
//! | `parcel_paymentMethodCount` | —                          | integer           |
//! | `parcel_listProperty`       | `{listing}` or `[{listing}]` | property id     |
//! | `parcel_getProperty`        | `[id]`                     | property record   |
//! | `parcel_currentPropertyId`  | —                          | integer (0: none) |
//! | `parcel_instanceSymbol`     | `["0x<handle>"]`           | symbol            |
//! | `parcel_version`            | —                          | version string    |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use parcel_contracts::{
    PaymentMethod, ParcelError, ParcelResult, PropertyId, PropertyListing, PropertyMarket,
    TokenizationHandle,
};

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone: the market and metrics sit behind `Arc`s.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// The registry itself.
    pub market: Arc<PropertyMarket>,
    /// Broadcast channel for live event notifications.
    pub event_tx: broadcast::Sender<MarketEvent>,
    /// Reference to Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MarketEvent {
    /// A batch of payment methods was approved.
    #[serde(rename = "payment_methods_added")]
    PaymentMethodsAdded { added: usize, total: usize },
    /// A property was listed and its tokenization instance provisioned.
    #[serde(rename = "property_listed")]
    PropertyListed {
        id: PropertyId,
        symbol: String,
        tokenization: String,
        owner: String,
    },
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/rpc", post(rpc_handler))
        .route("/ws", get(ws_handler))
        .route("/payment-methods", get(payment_methods_handler))
        .route("/properties/:id", get(property_handler))
        .route("/tokenizations/:handle", get(tokenization_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// JSON-RPC Types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version. Must be "2.0".
    pub jsonrpc: String,
    /// The method to invoke.
    pub method: String,
    /// Method parameters (positional or named).
    pub params: Option<Value>,
    /// Request identifier. Echoed back in the response.
    pub id: Value,
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version. Always "2.0".
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Request identifier, echoed from the request.
    pub id: Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code.
    pub code: i32,
    /// Short human-readable error description.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const RPC_INVALID_REQUEST: i32 = -32600;
pub const RPC_METHOD_NOT_FOUND: i32 = -32601;
pub const RPC_INVALID_PARAMS: i32 = -32602;
pub const RPC_INTERNAL_ERROR: i32 = -32603;
pub const RPC_NOT_FOUND: i32 = -32001;
pub const RPC_PROVISION_FAILURE: i32 = -32010;

impl JsonRpcError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: RPC_INVALID_PARAMS,
            message: message.into(),
            data: None,
        }
    }
}

impl From<ParcelError> for JsonRpcError {
    fn from(err: ParcelError) -> Self {
        let code = match &err {
            ParcelError::InvalidInput { .. } => RPC_INVALID_PARAMS,
            ParcelError::NotFound(_) => RPC_NOT_FOUND,
            ParcelError::ProvisionFailure(_) => RPC_PROVISION_FAILURE,
            ParcelError::Storage(_) => RPC_INTERNAL_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
            data: Some(serde_json::json!({ "kind": err.kind() })),
        }
    }
}

type RpcOutcome = Result<Value, JsonRpcError>;

/// Every method [`dispatch`] understands.
pub const RPC_METHODS: &[&str] = &[
    "parcel_addPaymentMethods",
    "parcel_paymentMethodCount",
    "parcel_listProperty",
    "parcel_getProperty",
    "parcel_currentPropertyId",
    "parcel_instanceSymbol",
    "parcel_version",
];

/// Metric label for a requested method. Anything outside [`RPC_METHODS`]
/// shares the `unknown` label so callers cannot mint new series.
fn method_label(method: &str) -> &'static str {
    RPC_METHODS
        .iter()
        .copied()
        .find(|known| *known == method)
        .unwrap_or("unknown")
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Node software version.
    pub version: String,
    /// Whether registry state survives a restart.
    pub durable: bool,
    /// Length of the payment-method ledger.
    pub payment_method_count: usize,
    /// Most recently assigned property id (0 if none).
    pub current_property_id: PropertyId,
    /// Number of listed properties.
    pub property_count: usize,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `GET /payment-methods`.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentMethodsResponse {
    pub count: usize,
    pub methods: Vec<PaymentMethod>,
}

/// Generic error body returned by REST endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

/// Maps a registry error onto an HTTP status and [`ErrorResponse`] body.
pub struct ApiError(ParcelError);

impl From<ParcelError> for ApiError {
    fn from(err: ParcelError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ParcelError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            ParcelError::NotFound(_) => StatusCode::NOT_FOUND,
            ParcelError::ProvisionFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ParcelError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Registry operations
// ---------------------------------------------------------------------------

/// Approves payment methods, then updates metrics and notifies subscribers.
fn add_payment_methods(state: &AppState, methods: Vec<PaymentMethod>) -> ParcelResult<usize> {
    let added = methods.len();
    match state.market.add_payment_methods(methods) {
        Ok(total) => {
            // No subscribers is fine.
            let _ = state
                .event_tx
                .send(MarketEvent::PaymentMethodsAdded { added, total });
            Ok(total)
        }
        Err(err) => {
            state
                .metrics
                .record_rejection("add_payment_methods", err.kind());
            Err(err)
        }
    }
}

/// Lists a property, then updates metrics and notifies subscribers.
fn list_property(state: &AppState, listing: PropertyListing) -> ParcelResult<PropertyId> {
    let timer = state.metrics.listing_latency_seconds.start_timer();
    let result = state.market.list_property(listing);
    timer.observe_duration();

    match result {
        Ok(id) => {
            state.metrics.properties_listed_total.inc();
            if let Ok(record) = state.market.get_property(id) {
                let _ = state.event_tx.send(MarketEvent::PropertyListed {
                    id,
                    symbol: record.symbol,
                    tokenization: record.tokenization.to_hex(),
                    owner: record.owner.to_string(),
                });
            }
            Ok(id)
        }
        Err(err) => {
            state.metrics.record_rejection("list_property", err.kind());
            Err(err)
        }
    }
}

/// Looks up a property by a possibly non-positive id. Anything below 1 is
/// simply not found.
fn get_property(state: &AppState, id: i64) -> ParcelResult<parcel_contracts::PropertyRecord> {
    let id = PropertyId::try_from(id)
        .map_err(|_| ParcelError::NotFound(format!("property {id}")))?;
    state.market.get_property(id)
}

/// Same as [`get_property`] for a JSON number of any integer range.
fn get_property_json(state: &AppState, id: &Value) -> RpcOutcome {
    let record = match (id.as_u64(), id.as_i64()) {
        (Some(id), _) => state.market.get_property(id)?,
        (None, Some(id)) => get_property(state, id)?,
        (None, None) => return Err(JsonRpcError::invalid_params("Invalid params: expected [id]")),
    };
    serialize(&record)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status` — returns a registry status summary.
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = StatusResponse {
        version: state.version.clone(),
        durable: state.market.is_durable(),
        payment_method_count: state.market.payment_method_count(),
        current_property_id: state.market.current_property_id(),
        property_count: state.market.property_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    Json(resp)
}

/// `GET /payment-methods` — returns the ledger in approval order.
async fn payment_methods_handler(State(state): State<AppState>) -> impl IntoResponse {
    let methods = state.market.payment_methods();
    Json(PaymentMethodsResponse {
        count: methods.len(),
        methods,
    })
}

/// `GET /properties/:id` — returns a property record. 404 for id ≤ 0 or
/// any id not yet issued.
async fn property_handler(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(get_property(&state, id)?))
}

/// `GET /tokenizations/:handle` — returns a tokenization instance. 400 for a
/// malformed handle, 404 for an unknown one.
async fn tokenization_handler(
    Path(handle): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let handle: TokenizationHandle = handle.parse()?;
    Ok(Json(state.market.tokenization(&handle)?))
}

/// `POST /rpc` — JSON-RPC 2.0 gateway.
///
/// Routes method calls to the registry. Unknown methods return error code
/// -32601 (Method not found).
async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    if req.jsonrpc != "2.0" {
        return Json(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError {
                code: RPC_INVALID_REQUEST,
                message: "Invalid Request: jsonrpc must be \"2.0\"".into(),
                data: None,
            }),
            id: req.id,
        });
    }

    state
        .metrics
        .rpc_requests_total
        .with_label_values(&[method_label(&req.method)])
        .inc();

    let (result, error) = match dispatch(&state, &req.method, req.params) {
        Ok(value) => (Some(value), None),
        Err(err) => (None, Some(err)),
    };

    Json(JsonRpcResponse {
        jsonrpc: "2.0".into(),
        result,
        error,
        id: req.id,
    })
}

fn dispatch(state: &AppState, method: &str, params: Option<Value>) -> RpcOutcome {
    match method {
        "parcel_addPaymentMethods" => {
            let methods: Vec<PaymentMethod> = params
                .and_then(|p| serde_json::from_value(p).ok())
                .ok_or_else(|| {
                    JsonRpcError::invalid_params("Invalid params: expected [identifier, ...]")
                })?;
            Ok(Value::from(add_payment_methods(state, methods)?))
        }
        "parcel_paymentMethodCount" => Ok(Value::from(state.market.payment_method_count())),
        "parcel_listProperty" => {
            let listing = match params {
                Some(Value::Array(mut items)) if items.len() == 1 => items.pop(),
                other => other,
            }
            .ok_or_else(|| JsonRpcError::invalid_params("Invalid params: expected {listing}"))?;
            let listing: PropertyListing = serde_json::from_value(listing)
                .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {e}")))?;
            Ok(Value::from(list_property(state, listing)?))
        }
        "parcel_getProperty" => {
            let id = first_param(params.as_ref())
                .ok_or_else(|| JsonRpcError::invalid_params("Invalid params: expected [id]"))?;
            get_property_json(state, id)
        }
        "parcel_currentPropertyId" => Ok(Value::from(state.market.current_property_id())),
        "parcel_instanceSymbol" => {
            let handle: TokenizationHandle = first_param(params.as_ref())
                .and_then(Value::as_str)
                .ok_or_else(|| JsonRpcError::invalid_params("Invalid params: expected [handle]"))?
                .parse()?;
            Ok(Value::from(state.market.instance_symbol(&handle)?))
        }
        "parcel_version" => Ok(Value::from(state.version.clone())),
        _ => Err(JsonRpcError {
            code: RPC_METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method),
            data: None,
        }),
    }
}

fn first_param(params: Option<&Value>) -> Option<&Value> {
    params.and_then(Value::as_array).and_then(|arr| arr.first())
}

fn serialize<T: Serialize>(value: &T) -> RpcOutcome {
    serde_json::to_value(value).map_err(|e| JsonRpcError {
        code: RPC_INTERNAL_ERROR,
        message: format!("Internal error: {}", e),
        data: None,
    })
}

/// `GET /ws` — WebSocket upgrade for live event streaming.
///
/// Clients receive JSON-encoded [`MarketEvent`] messages. The connection is
/// read-only from the server's perspective; client messages are ignored.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

/// Drives a single WebSocket connection, forwarding broadcast events
/// until the client disconnects or the channel is closed.
async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.event_tx.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use parcel_contracts::PropertyRecord;
    use tower::ServiceExt;

    fn test_app_state() -> AppState {
        let (event_tx, _) = broadcast::channel(16);
        AppState {
            version: "0.1.0-test".into(),
            market: Arc::new(PropertyMarket::new()),
            event_tx,
            metrics: Arc::new(crate::metrics::NodeMetrics::new()),
        }
    }

    fn listing_json(symbol: &str) -> Value {
        serde_json::json!({
            "registrationNumber": 69,
            "registrationCode": "AQR696969HEY",
            "name": "The 69 View",
            "symbol": symbol,
            "metadataUri": "ipfs://...",
            "owner": "0xOwner",
            "verified": true
        })
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a JSON-RPC call and returns the decoded envelope.
    async fn rpc(router: &Router, method: &str, params: Value) -> JsonRpcResponse {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });
        let req = Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // -- REST -----------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn status_reflects_registry_state() {
        let state = test_app_state();
        state
            .market
            .add_payment_methods(vec!["0xA1".into(), "0xB2".into()])
            .unwrap();
        let router = create_router(state);

        let (status, body) = get(&router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.payment_method_count, 2);
        assert_eq!(resp.current_property_id, 0);
        assert!(!resp.durable);
    }

    #[tokio::test]
    async fn property_endpoint_returns_record() {
        let router = create_router(test_app_state());
        rpc(&router, "parcel_listProperty", listing_json("TV69")).await;

        let (status, body) = get(&router, "/properties/1").await;
        assert_eq!(status, StatusCode::OK);
        let record: PropertyRecord = serde_json::from_slice(&body).unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.symbol, "TV69");

        let path = format!("/tokenizations/{}", record.tokenization);
        let (status, body) = get(&router, &path).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["symbol"], "TV69");
    }

    #[tokio::test]
    async fn property_endpoint_404_for_zero_negative_and_unissued() {
        let router = create_router(test_app_state());
        for path in ["/properties/0", "/properties/-3", "/properties/42"] {
            let (status, body) = get(&router, path).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
            let err: ErrorResponse = serde_json::from_slice(&body).unwrap();
            assert_eq!(err.kind, "not_found");
        }
    }

    #[tokio::test]
    async fn tokenization_endpoint_distinguishes_malformed_and_unknown() {
        let router = create_router(test_app_state());
        let (status, _) = get(&router, "/tokenizations/0xnothex").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = format!("/tokenizations/0x{}", "11".repeat(20));
        let (status, _) = get(&router, &unknown).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn payment_methods_endpoint_lists_in_order() {
        let router = create_router(test_app_state());
        rpc(&router, "parcel_addPaymentMethods", serde_json::json!(["0xB2", "0xA1"])).await;

        let (status, body) = get(&router, "/payment-methods").await;
        assert_eq!(status, StatusCode::OK);
        let resp: PaymentMethodsResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(resp.count, 2);
        assert_eq!(resp.methods[0].as_str(), "0xB2");
    }

    // -- JSON-RPC -------------------------------------------------------------

    #[tokio::test]
    async fn rpc_listing_walkthrough() {
        let router = create_router(test_app_state());

        let methods = serde_json::json!(["0xA1", "0xB2"]);
        let resp = rpc(&router, "parcel_addPaymentMethods", methods).await;
        assert_eq!(resp.result, Some(serde_json::json!(2)));
        let resp = rpc(&router, "parcel_paymentMethodCount", Value::Null).await;
        assert_eq!(resp.result, Some(serde_json::json!(2)));

        let resp = rpc(&router, "parcel_listProperty", listing_json("TV69")).await;
        assert!(resp.error.is_none());
        assert_eq!(resp.result, Some(serde_json::json!(1)));

        let resp = rpc(&router, "parcel_getProperty", serde_json::json!([1])).await;
        let record: PropertyRecord = serde_json::from_value(resp.result.unwrap()).unwrap();
        assert_eq!(record.symbol, "TV69");

        let resp = rpc(
            &router,
            "parcel_instanceSymbol",
            serde_json::json!([record.tokenization.to_hex()]),
        )
        .await;
        assert_eq!(resp.result, Some(serde_json::json!("TV69")));

        let wrapped = serde_json::json!([listing_json("TV70")]);
        let resp = rpc(&router, "parcel_listProperty", wrapped).await;
        assert_eq!(resp.result, Some(serde_json::json!(2)));
        let resp = rpc(&router, "parcel_currentPropertyId", Value::Null).await;
        assert_eq!(resp.result, Some(serde_json::json!(2)));
    }

    #[tokio::test]
    async fn rpc_empty_payment_batch_is_invalid_params() {
        let router = create_router(test_app_state());
        let resp = rpc(&router, "parcel_addPaymentMethods", serde_json::json!([])).await;
        assert_eq!(resp.error.unwrap().code, RPC_INVALID_PARAMS);
        let resp = rpc(&router, "parcel_paymentMethodCount", Value::Null).await;
        assert_eq!(resp.result, Some(serde_json::json!(0)));
    }

    #[tokio::test]
    async fn rpc_invalid_listing_does_not_advance_id() {
        let state = test_app_state();
        let metrics = Arc::clone(&state.metrics);
        let router = create_router(state);

        let mut bad = listing_json("TV69");
        bad["name"] = serde_json::json!("");
        let resp = rpc(&router, "parcel_listProperty", bad).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, RPC_INVALID_PARAMS);
        assert_eq!(err.data.unwrap()["kind"], "invalid_input");

        let resp = rpc(&router, "parcel_currentPropertyId", Value::Null).await;
        assert_eq!(resp.result, Some(serde_json::json!(0)));
        assert!(metrics.encode().unwrap().contains("kind=\"invalid_input\""));
    }

    #[tokio::test]
    async fn rpc_long_symbol_is_listed() {
        let router = create_router(test_app_state());
        let resp = rpc(&router, "parcel_listProperty", listing_json("PROPERTY1234")).await;
        assert!(resp.error.is_none());
        assert_eq!(resp.result, Some(serde_json::json!(1)));
    }

    #[test]
    fn registry_errors_map_to_rpc_codes() {
        let cases = [
            (ParcelError::invalid("name", "empty"), RPC_INVALID_PARAMS),
            (ParcelError::NotFound("property 9".into()), RPC_NOT_FOUND),
            (ParcelError::ProvisionFailure("owner".into()), RPC_PROVISION_FAILURE),
        ];
        for (err, code) in cases {
            let kind = err.kind();
            let rpc_err = JsonRpcError::from(err);
            assert_eq!(rpc_err.code, code);
            assert_eq!(rpc_err.data.unwrap()["kind"], kind);
        }
    }

    #[tokio::test]
    async fn unknown_methods_share_one_metric_series() {
        let state = test_app_state();
        let metrics = Arc::clone(&state.metrics);
        let router = create_router(state);

        for i in 0..20 {
            let resp = rpc(&router, &format!("junk_{i}"), Value::Null).await;
            assert_eq!(resp.error.unwrap().code, RPC_METHOD_NOT_FOUND);
        }
        rpc(&router, "parcel_version", Value::Null).await;

        let text = metrics.encode().unwrap();
        let series: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("parcel_rpc_requests_total{"))
            .collect();
        assert_eq!(series.len(), 2, "{series:?}");
        assert!(text.contains("parcel_rpc_requests_total{method=\"unknown\"} 20"));
        assert!(text.contains("parcel_rpc_requests_total{method=\"parcel_version\"} 1"));
        assert!(!text.contains("junk_"));
    }

    #[tokio::test]
    async fn rpc_get_property_not_found_outside_issued_ids() {
        let router = create_router(test_app_state());
        for id in [0, -1, 7, i64::MIN] {
            let resp = rpc(&router, "parcel_getProperty", serde_json::json!([id])).await;
            assert_eq!(resp.error.unwrap().code, RPC_NOT_FOUND, "id {id}");
        }
        for id in [i64::MAX as u64 + 1, u64::MAX] {
            let resp = rpc(&router, "parcel_getProperty", serde_json::json!([id])).await;
            assert_eq!(resp.error.unwrap().code, RPC_NOT_FOUND, "id {id}");
        }
        let resp = rpc(&router, "parcel_getProperty", serde_json::json!(["one"])).await;
        assert_eq!(resp.error.unwrap().code, RPC_INVALID_PARAMS);
    }

    #[tokio::test]
    async fn rpc_instance_symbol_unknown_handle() {
        let router = create_router(test_app_state());
        let handle = format!("0x{}", "ab".repeat(20));
        let resp = rpc(&router, "parcel_instanceSymbol", serde_json::json!([handle])).await;
        assert_eq!(resp.error.unwrap().code, RPC_NOT_FOUND);
    }

    #[tokio::test]
    async fn rpc_unknown_method_and_bad_version() {
        let router = create_router(test_app_state());
        let resp = rpc(&router, "parcel_selfDestruct", Value::Null).await;
        assert_eq!(resp.error.unwrap().code, RPC_METHOD_NOT_FOUND);

        let body = serde_json::json!({ "jsonrpc": "1.0", "method": "parcel_version", "id": 9 });
        let req = Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let resp: JsonRpcResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(resp.error.unwrap().code, RPC_INVALID_REQUEST);
        assert_eq!(resp.id, serde_json::json!(9));
    }

    #[tokio::test]
    async fn listing_broadcasts_event() {
        let state = test_app_state();
        let mut rx = state.event_tx.subscribe();
        let router = create_router(state);

        rpc(&router, "parcel_listProperty", listing_json("TV69")).await;
        match rx.recv().await.unwrap() {
            MarketEvent::PropertyListed { id, symbol, .. } => {
                assert_eq!(id, 1);
                assert_eq!(symbol, "TV69");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
