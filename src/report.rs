//! Tabular analysis artifacts.
//!
//! Row shapes for the three report tables, serialized with their
//! spreadsheet-facing column names. The pipeline writes them as JSON row
//! arrays; office-document rendering is a downstream concern and consumes
//! these same shapes.

use std::path::Path;

use serde::Serialize;

use crate::models::ObjectivesDocument;

/// One kept verbatim→question mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionMappingRow {
    #[serde(rename = "Section")]
    pub section: String,
    #[serde(rename = "Question")]
    pub question: String,
    #[serde(rename = "Verbatim")]
    pub verbatim: String,
    #[serde(rename = "Speaker")]
    pub speaker: String,
    #[serde(rename = "Confidence")]
    pub confidence: String,
    #[serde(rename = "Reasoning")]
    pub reasoning: String,
    #[serde(rename = "Source File")]
    pub source_file: String,
}

/// One (topic, verbatim) pairing from the emergent-topic stage. A
/// multi-labelled verbatim appears once per assigned topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmergentTopicRow {
    #[serde(rename = "Broad Topic")]
    pub broad_topic: String,
    #[serde(rename = "Sub-Topic")]
    pub sub_topic: String,
    #[serde(rename = "Verbatim")]
    pub verbatim: String,
    #[serde(rename = "Speaker")]
    pub speaker: String,
    #[serde(rename = "Source File")]
    pub source_file: String,
}

/// One expanded strategic-analysis row. The base fields (topic pair, key
/// insights, verbatim count) repeat on every row of a topic's expansion —
/// the table is deliberately denormalized for spreadsheet consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategicInsightRow {
    #[serde(rename = "Broad Topic")]
    pub broad_topic: String,
    #[serde(rename = "Sub-Topic")]
    pub sub_topic: String,
    #[serde(rename = "Key Insights")]
    pub key_insights: String,
    #[serde(rename = "Verbatim Count")]
    pub verbatim_count: usize,
    #[serde(rename = "Theme")]
    pub theme: String,
    #[serde(rename = "Takeaway")]
    pub takeaway: String,
    #[serde(rename = "Supporting Quote")]
    pub supporting_quote: String,
}

/// Write a row table as a pretty-printed JSON array.
pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(rows)?;
    std::fs::write(path, json)
}

/// Write the extracted objectives document.
pub fn write_objectives(path: &Path, document: &ObjectivesDocument) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(document)?;
    std::fs::write(path, json)
}
