//! Structured-response parsing.
//!
//! The reasoning service is asked for JSON but occasionally wraps it in
//! code fences or leading prose. Each parse strips that decoration, then
//! deserializes leniently: unknown fields are ignored and missing fields
//! take defaults, so a sparse-but-valid reply degrades instead of failing.
//! A reply that is not JSON at all is a `ServiceError::ResponseParsing`,
//! which the dispatcher treats like any other per-request failure.

use serde::de::DeserializeOwned;

use crate::models::{EmergentReport, ObjectivesDocument, QuestionMapping, StrategicFindings};
use crate::service::ServiceError;

/// Locate the JSON payload inside a response: fenced block if present,
/// otherwise the span from the first `{` to the last `}`.
fn json_payload(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let body = &response[start + 7..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(open), Some(close)) if close > open => response[open..=close].trim(),
        _ => response.trim(),
    }
}

fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T, ServiceError> {
    serde_json::from_str(json_payload(response))
        .map_err(|e| ServiceError::ResponseParsing(e.to_string()))
}

pub fn parse_objectives(response: &str) -> Result<ObjectivesDocument, ServiceError> {
    parse_json(response)
}

pub fn parse_mapping(response: &str) -> Result<QuestionMapping, ServiceError> {
    parse_json(response)
}

pub fn parse_emergent(response: &str) -> Result<EmergentReport, ServiceError> {
    parse_json(response)
}

pub fn parse_strategic(response: &str) -> Result<StrategicFindings, ServiceError> {
    parse_json(response)
}
