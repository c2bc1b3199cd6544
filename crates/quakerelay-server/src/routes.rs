use std::sync::Arc;

use axum::{
    extract::{Path as RoutePath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use quakerelay_pdl::{EventCode, PdlClient, PdlError};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::archive::{archive_staged_file, archive_timestamp};
use crate::config::ServerConfig;
use crate::fetch::AttachmentFetcher;

pub(crate) const STATUS_ENDPOINT: &str = "/status";
pub(crate) const JSON2PDL_ENDPOINT: &str = "/api/JSON2PDL/{event_code}";
pub(crate) const ASSOCIATE_ENDPOINT: &str = "/api/ASSOCIATE/";
pub(crate) const CANCEL2PDL_ENDPOINT: &str = "/api/CANCEL2PDL/{event_code}";
pub(crate) const MISSED2PDL_ENDPOINT: &str = "/api/MISSED2PDL/{event_code}";

const ALIVE_MESSAGE: &str = "QUAKERELAY ALIVE";

pub(crate) struct AppState {
    pub(crate) config: ServerConfig,
    pub(crate) client: PdlClient,
    pub(crate) fetcher: AttachmentFetcher,
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_status))
        .route(STATUS_ENDPOINT, get(handle_status))
        .route(JSON2PDL_ENDPOINT, post(handle_json2pdl))
        .route(ASSOCIATE_ENDPOINT, get(handle_associate))
        .route(
            CANCEL2PDL_ENDPOINT,
            get(handle_cancel2pdl).post(handle_cancel2pdl),
        )
        .route(
            MISSED2PDL_ENDPOINT,
            get(handle_missed2pdl).post(handle_missed2pdl),
        )
        .with_state(state)
}

#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PdlError> for ApiError {
    fn from(error: PdlError) -> Self {
        if error.is_client_error() {
            Self::bad_request(error.to_string())
        } else {
            Self::internal(error.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

async fn handle_status() -> Json<Value> {
    Json(json!({ "message": ALIVE_MESSAGE }))
}

/// Confirmation payload posted by the review console. The urls point back at
/// the console itself; either may be absent or unreachable without failing
/// the flow.
#[derive(Debug, Deserialize)]
struct FollowupPayload {
    #[serde(default)]
    contents_file_url: Option<String>,
    #[serde(default)]
    pas_pdf_file_url: Option<String>,
    #[serde(default)]
    pas_geojson: Value,
}

/// The console posts its payload as a JSON-encoded string. Accept that
/// doubly-encoded form alongside a plain JSON object.
fn decode_followup_payload(body: &str) -> Result<FollowupPayload, String> {
    let outer: Value = serde_json::from_str(body)
        .map_err(|error| format!("request body is not valid JSON: {error}"))?;
    match outer {
        Value::String(inner) => serde_json::from_str(&inner)
            .map_err(|error| format!("nested JSON payload is not valid: {error}")),
        other => serde_json::from_value(other)
            .map_err(|error| format!("request payload must be a JSON object: {error}")),
    }
}

async fn handle_json2pdl(
    State(state): State<Arc<AppState>>,
    RoutePath(event_code): RoutePath<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let code = EventCode::parse(&event_code)?;
    tracing::info!(event_code = %code, "confirmation follow-up received");

    let payload = decode_followup_payload(&body).map_err(ApiError::bad_request)?;

    let mut attachments = Vec::new();
    match payload.contents_file_url.as_deref() {
        Some(url) => match state.fetcher.fetch_contents_xml(url).await {
            Ok(path) => attachments.push(path),
            Err(error) => {
                tracing::error!(event_code = %code, error = %error, "contents.xml not attached");
            }
        },
        None => tracing::error!(event_code = %code, "contents_file_url missing from payload"),
    }
    match payload.pas_pdf_file_url.as_deref() {
        Some(url) => match state.fetcher.fetch_summary_pdf(url).await {
            Ok(path) => attachments.push(path),
            Err(error) => {
                tracing::error!(event_code = %code, error = %error, "summary.pdf not attached");
            }
        },
        None => tracing::error!(event_code = %code, "pas_pdf_file_url missing from payload"),
    }

    if payload.pas_geojson.is_null() {
        tracing::error!(event_code = %code, "summary geojson missing or null");
    }
    let staged = state.config.work_dir.join("summary.json");
    tokio::fs::write(&staged, payload.pas_geojson.to_string())
        .await
        .map_err(|error| {
            ApiError::internal(format!("failed to stage {}: {error}", staged.display()))
        })?;

    state
        .client
        .send_confirmation(&code, &staged, &attachments)
        .await?;

    let archive_name = format!("{}_{}.json", code.combined(), archive_timestamp());
    if let Err(error) = archive_staged_file(&staged, &state.config.archive_dir(), &archive_name) {
        tracing::error!(event_code = %code, error = %error, "unable to archive summary.json");
    }

    Ok(Json(json!({ "uuid": code.combined() })))
}

#[derive(Debug, Deserialize)]
struct AssociateQuery {
    #[serde(rename = "eventID")]
    event_id: Option<String>,
    #[serde(rename = "otherID")]
    other_id: Option<String>,
}

fn parse_query_code(raw: Option<&str>, name: &str) -> Result<EventCode, ApiError> {
    raw.and_then(|value| EventCode::parse(value).ok())
        .ok_or_else(|| ApiError::bad_request(format!("Invalid URL param \"{name}\".")))
}

async fn handle_associate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AssociateQuery>,
) -> Result<StatusCode, ApiError> {
    let event_id = parse_query_code(query.event_id.as_deref(), "eventID")?;
    let other_id = parse_query_code(query.other_id.as_deref(), "otherID")?;
    tracing::info!(event_code = %event_id, other = %other_id, "association requested");

    state.client.send_association(&event_id, &other_id).await?;

    Ok(StatusCode::OK)
}

async fn handle_cancel2pdl(
    State(state): State<Arc<AppState>>,
    RoutePath(event_code): RoutePath<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let code = EventCode::parse(&event_code)?;
    tracing::info!(event_code = %code, "cancellation requested");

    let report = state.client.send_cancellation(&code, &body).await?;
    tracing::info!(
        event_code = %code,
        origin_cancel = report.origin_cancel.success,
        deleted_text = report.deleted_text.success,
        "cancellation workflow complete"
    );

    Ok(Json(json!({ "uuid": code.combined() })))
}

async fn handle_missed2pdl(
    State(state): State<Arc<AppState>>,
    RoutePath(event_code): RoutePath<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let code = EventCode::parse(&event_code)?;
    tracing::info!(event_code = %code, bytes = body.len(), "missed-alert follow-up received");

    let staged = state.config.work_dir.join("missing.html");
    tokio::fs::write(&staged, body.as_bytes())
        .await
        .map_err(|error| {
            ApiError::internal(format!("failed to stage {}: {error}", staged.display()))
        })?;

    state.client.send_missed_alert(&code, &staged).await?;

    let archive_name = format!("{}_{}_missing.html", code.combined(), archive_timestamp());
    archive_staged_file(&staged, &state.config.archive_dir(), &archive_name).map_err(|error| {
        ApiError::internal(format!("unable to archive missed-alert snippet: {error}"))
    })?;

    Ok(Json(json!({ "uuid": code.combined() })))
}
