use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use broker_core::{AcquireOutcome, Brokerage, MonitorStats, Protocol, ProxyCollection, ProxyKey, ProxyRecord};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

const DEFAULT_README: &str = "<html><body><h1>proxy brokerage</h1></body></html>";

#[derive(Clone)]
pub struct ApiServer {
    collection: Arc<ProxyCollection>,
    brokerage: Arc<Brokerage>,
    readme: Arc<str>,
}

impl ApiServer {
    pub fn new(collection: Arc<ProxyCollection>, brokerage: Arc<Brokerage>) -> Self {
        Self::with_readme(collection, brokerage, DEFAULT_README)
    }

    pub fn with_readme(collection: Arc<ProxyCollection>, brokerage: Arc<Brokerage>, readme: impl Into<Arc<str>>) -> Self {
        Self {
            collection,
            brokerage,
            readme: readme.into(),
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/", get(index_handler))
            .route("/proxies", get(list_proxies_handler))
            .route("/proxies/register", post(register_handler))
            .route("/proxies/acquire", post(acquire_handler))
            .route("/proxies/release", post(release_handler))
            .route("/domains", get(list_domains_handler))
            .route("/domains/:domain", get(domain_stats_handler))
            .route("/domains/:domain", delete(delist_domain_handler))
            .with_state(self)
    }

    pub async fn run(self, host: &str, port: u16) -> Result<()> {
        let app = Arc::new(self).router();
        let addr = format!("{host}:{port}");
        info!(%addr, "api server listening");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Adapter-level error, mapped to the exact JSON shape spec calls for:
/// `{"err": "<name> is a required parameter."}` on HTTP 400.
#[derive(Debug)]
struct ApiError(String);

impl ApiError {
    fn missing(param: &str) -> Self {
        ApiError(format!("{param} is a required parameter."))
    }

    fn bad_request(message: impl Into<String>) -> Self {
        ApiError(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(json!({ "err": self.0 }))).into_response()
    }
}

fn require(value: Option<String>, name: &str) -> Result<String, ApiError> {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => Ok(v),
        None => Err(ApiError::missing(name)),
    }
}

async fn index_handler(State(state): State<Arc<ApiServer>>) -> Html<String> {
    Html(state.readme.to_string())
}

async fn list_proxies_handler(State(state): State<Arc<ApiServer>>) -> Json<Vec<ProxyKey>> {
    Json(state.collection.keys().await)
}

#[derive(Deserialize)]
struct RegisterForm {
    proto: Option<String>,
    host: Option<String>,
    port: Option<String>,
    resp_time: Option<String>,
    geo: Option<String>,
    anon_level: Option<String>,
}

async fn register_handler(
    State(state): State<Arc<ApiServer>>,
    Form(form): Form<RegisterForm>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let proto = require(form.proto, "proto")?;
    let host = require(form.host, "host")?;
    let port_raw = require(form.port, "port")?;

    let port: i64 = port_raw
        .parse()
        .map_err(|_| ApiError::bad_request("port must be an integer".to_string()))?;
    let protocol = Protocol::parse(&proto).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let resp_time = form
        .resp_time
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let record = ProxyRecord::try_new(protocol, &host, port, resp_time, form.geo, form.anon_level)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    state.collection.register_proxy(record).await;
    Ok(Json(json!({ "msg": "OK" })))
}

#[derive(Deserialize)]
struct AcquireForm {
    url: Option<String>,
    requirements: Option<String>,
    max_wait_time: Option<String>,
}

async fn acquire_handler(
    State(state): State<Arc<ApiServer>>,
    Form(form): Form<AcquireForm>,
) -> Result<Json<AcquireOutcome>, ApiError> {
    let url = require(form.url, "url")?;
    let requirements: Vec<String> = form
        .requirements
        .as_deref()
        .map(|csv| csv.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    let max_wait_time = form
        .max_wait_time
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(60.0);

    let outcome = state
        .brokerage
        .acquire(&url, &requirements, Duration::from_secs_f64(max_wait_time.max(0.0)))
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid url: {e}")))?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct ReleaseForm {
    broker: Option<String>,
    proxy: Option<ProxyKey>,
    response_time: Option<String>,
    is_failure: Option<String>,
}

async fn release_handler(
    State(state): State<Arc<ApiServer>>,
    Form(form): Form<ReleaseForm>,
) -> Result<Json<bool>, ApiError> {
    let broker = require(form.broker, "broker")?;
    let proxy = form.proxy.ok_or_else(|| ApiError::missing("proxy"))?;
    let response_time = form
        .response_time
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(60.0);
    let is_failure = form
        .is_failure
        .as_deref()
        .map(|s| s.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let known = state.brokerage.release(&broker, proxy, response_time, is_failure).await;
    Ok(Json(known))
}

async fn list_domains_handler(State(state): State<Arc<ApiServer>>) -> Json<HashMap<String, MonitorStats>> {
    Json(state.brokerage.list_all().await)
}

async fn domain_stats_handler(
    State(state): State<Arc<ApiServer>>,
    Path(domain): Path<String>,
) -> Json<serde_json::Value> {
    let mut all = state.brokerage.list_all().await;
    match all.remove(&domain) {
        Some(stats) => Json(serde_json::to_value(stats).unwrap_or_else(|_| json!({}))),
        None => Json(json!({})),
    }
}

/// The source never implemented this route; it is kept as a stub
/// returning the same literal the original served.
async fn delist_domain_handler(Path(_domain): Path<String>) -> Json<&'static str> {
    Json("not_implemented")
}
