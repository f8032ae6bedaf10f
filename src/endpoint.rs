/// HTTP endpoint for querying water temperature sensors
///
/// Read-only view of what the host currently holds, for scripts and
/// dashboards that do not speak to the host directly.
///
/// Endpoints:
/// - GET /health - Config entries, load state and coordinator freshness
/// - GET /sensors - Every water temperature sensor state
/// - GET /sensors/{entity_id} - One sensor state

use crate::coordinator::Snapshot;
use crate::host::config_entries::EntryState;
use crate::host::Host;
use crate::model::DOMAIN;
use crate::sensor::ENTITY_DOMAIN;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

type JsonResponse = tiny_http::Response<Cursor<Vec<u8>>>;

const AVAILABLE_ENDPOINTS: [&str; 3] = ["/health", "/sensors", "/sensors/{entity_id}"];

#[derive(Debug, Error)]
#[error("failed to start HTTP server on port {port}: {message}")]
pub struct EndpointError {
    pub port: u16,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Health of one config entry
#[derive(Debug, Serialize)]
pub struct EntryHealth {
    pub entry_id: String,
    pub title: String,
    pub state: EntryState,

    /// Coordinator freshness, absent while the entry is not loaded
    pub last_update_success: Option<bool>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub record_count: Option<usize>,
}

impl EntryHealth {
    fn with_snapshot(mut self, snapshot: &Snapshot) -> Self {
        self.last_update_success = Some(snapshot.last_update_success);
        self.last_updated = Some(snapshot.last_updated);
        self.last_error = snapshot.last_error.clone();
        self.record_count = Some(snapshot.dataset.len());
        self
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub entries: Vec<EntryHealth>,
}

// ---------------------------------------------------------------------------
// Data Gathering
// ---------------------------------------------------------------------------

/// Status is "ok" only when every entry is loaded and its last refresh
/// succeeded.
pub fn collect_health(host: &Host) -> HealthResponse {
    let entries: Vec<EntryHealth> = host
        .config_entries
        .entries(DOMAIN)
        .into_iter()
        .map(|entry| {
            let health = EntryHealth {
                entry_id: entry.entry_id.clone(),
                title: entry.title.clone(),
                state: entry.state,
                last_update_success: None,
                last_updated: None,
                last_error: None,
                record_count: None,
            };
            match host.entry_runtime(&entry.entry_id) {
                Some(runtime) => health.with_snapshot(&runtime.coordinator.snapshot()),
                None => health,
            }
        })
        .collect();

    let healthy = entries
        .iter()
        .all(|e| e.state == EntryState::Ready && e.last_update_success == Some(true));

    HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        entries,
    }
}

/// Routes a request path to a status code and JSON body.
pub fn route(host: &Host, url: &str) -> (u16, Value) {
    let path = url.split('?').next().unwrap_or(url);

    if path == "/health" {
        return to_json(200, &collect_health(host));
    }

    if path == "/sensors" {
        return to_json(200, &host.states.all_in_domain(ENTITY_DOMAIN));
    }

    if let Some(entity_id) = path.strip_prefix("/sensors/") {
        return match host.states.get(entity_id) {
            Some(state) => to_json(200, &state),
            None => (
                404,
                json!({
                    "error": "Unknown sensor",
                    "entity_id": entity_id
                }),
            ),
        };
    }

    (
        404,
        json!({
            "error": "Not found",
            "available_endpoints": AVAILABLE_ENDPOINTS
        }),
    )
}

fn to_json<T: Serialize>(status_code: u16, body: &T) -> (u16, Value) {
    match serde_json::to_value(body) {
        Ok(value) => (status_code, value),
        Err(e) => (500, json!({ "error": e.to_string() })),
    }
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Start HTTP endpoint server on the specified port. Blocks; run it on its
/// own thread.
pub fn start_endpoint_server(port: u16, host: Arc<Host>) -> Result<(), EndpointError> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port)).map_err(|e| EndpointError {
        port,
        message: e.to_string(),
    })?;

    log::info!("HTTP endpoint listening on http://0.0.0.0:{}", port);
    for endpoint in AVAILABLE_ENDPOINTS {
        log::info!("   GET {}", endpoint);
    }

    for request in server.incoming_requests() {
        let (status_code, body) = if *request.method() == tiny_http::Method::Get {
            route(&host, request.url())
        } else {
            (405, json!({ "error": "Method not allowed" }))
        };
        log::debug!("{} {} -> {}", request.method(), request.url(), status_code);

        if let Err(e) = request.respond(create_response(status_code, &body)) {
            log::warn!("Failed to send response: {}", e);
        }
    }

    Ok(())
}

/// Create HTTP response with JSON body
fn create_response(status_code: u16, json: &Value) -> JsonResponse {
    let body = serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string());
    let response =
        tiny_http::Response::from_data(body.into_bytes()).with_status_code(tiny_http::StatusCode::from(status_code));

    match tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
