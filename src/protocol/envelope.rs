//! Event envelope construction.
//!
//! # Responsibilities
//! - Translate one inbound request into one `http_request` event
//! - Copy headers, flatten the query string, capture JSON bodies
//!
//! # Design Decisions
//! - Pure apart from the clock and the event ID source; `build_at` takes
//!   both explicitly
//! - Repeated query parameters keep their first value
//! - Header names are the lowercase names delivered by the HTTP stack;
//!   repeated headers keep the last value

use std::collections::BTreeMap;

use axum::http::{header, request::Parts};
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::protocol::error::EnvelopeError;
use crate::routing::ResolvedRoute;

pub const EVENT_TYPE: &str = "http_request";
pub const CLOUD_EVENTS_VERSION: &str = "0.1";
pub const EVENT_SOURCE: &str = "gateway";
pub const CONTENT_TYPE: &str = "application/vnd.omg.object+json";

/// The event sent to the execution backend for one inbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event_type: &'static str,
    pub cloud_events_version: &'static str,
    pub source: &'static str,
    #[serde(rename = "eventID")]
    pub event_id: Uuid,
    pub event_time: String,
    pub content_type: &'static str,
    pub data: EnvelopeData,
}

/// Request details carried in the envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeData {
    pub headers: BTreeMap<String, String>,
    pub query_params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Envelope {
    /// Build the envelope with a fresh event ID and the current time.
    pub fn build(route: &ResolvedRoute, parts: &Parts, body: &[u8]) -> Result<Self, EnvelopeError> {
        Self::build_at(route, parts, body, Uuid::new_v4(), Utc::now())
    }

    /// Build the envelope with an explicit event ID and capture time.
    pub fn build_at(
        route: &ResolvedRoute,
        parts: &Parts,
        body: &[u8],
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, EnvelopeError> {
        let mut headers = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            headers.insert(
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }

        let query_params = match parts.uri.query() {
            Some(query) => flatten_query(query)?,
            None => BTreeMap::new(),
        };

        let is_json = parts
            .headers
            .get(header::CONTENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).contains("application/json"))
            .unwrap_or(false);
        let body: Option<Value> = if is_json {
            Some(serde_json::from_slice(body)?)
        } else {
            None
        };

        tracing::debug!(
            route = %route.name,
            event_id = %event_id,
            query_params = query_params.len(),
            has_body = body.is_some(),
            "Envelope built"
        );

        Ok(Self {
            event_type: EVENT_TYPE,
            cloud_events_version: CLOUD_EVENTS_VERSION,
            source: EVENT_SOURCE,
            event_id,
            event_time: now.format("%Y-%m-%dT%H:%M:%S").to_string(),
            content_type: CONTENT_TYPE,
            data: EnvelopeData {
                headers,
                query_params,
                body,
            },
        })
    }
}

/// Parse `a=1&a=2&b` into `{a: "1", b: ""}`.
fn flatten_query(query: &str) -> Result<BTreeMap<String, String>, EnvelopeError> {
    let mut params = BTreeMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key)?;
        let value = decode_component(value)?;
        params.entry(key).or_insert(value);
    }
    Ok(params)
}

fn decode_component(raw: &str) -> Result<String, EnvelopeError> {
    let spaced = raw.replace('+', " ");
    percent_decode(spaced.as_bytes())
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| EnvelopeError::Decode(raw.to_string()))
}
