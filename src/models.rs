//! Domain types shared across the pipeline.
//!
//! Everything here is plain data: verbatim records extracted from
//! transcripts, discussion-guide objectives, and the structured shapes the
//! reasoning service returns for each analysis stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Verbatims
// ---------------------------------------------------------------------------

/// One attributed statement extracted from a transcript line.
///
/// Immutable once created. Ordering within a source file is preserved by the
/// extractor and must survive chunking — downstream reports rely on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbatimRecord {
    pub speaker: String,
    pub text: String,
    pub source_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl VerbatimRecord {
    /// JSON form submitted to the reasoning service. The token cost of a
    /// verbatim is always computed over this serialization, so chunk
    /// membership decisions and prompt assembly agree on the price.
    pub fn serialized(&self) -> String {
        serde_json::to_string(self).expect("verbatim record serializes")
    }
}

// ---------------------------------------------------------------------------
// Discussion guide
// ---------------------------------------------------------------------------

/// One question from the discussion guide, extracted once per project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionObjective {
    pub section: String,
    pub question: String,
}

/// Persisted form of the objective extraction stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectivesDocument {
    #[serde(default)]
    pub objectives: Vec<DiscussionObjective>,
}

/// Sequential objective identifier as the reasoning service echoes it back:
/// `"ID-1"` .. `"ID-n"`, with `"ID-0"` meaning "no question fits".
///
/// Identifiers map to list position (`idx = n - 1`). Anything outside
/// `[1, len]` is invalid and is rejected rather than used as an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectiveId(u32);

impl ObjectiveId {
    pub const NO_MATCH: ObjectiveId = ObjectiveId(0);

    pub fn is_no_match(&self) -> bool {
        self.0 == 0
    }

    /// Resolve to an index into an objectives list of length `len`.
    /// `None` for the no-match sentinel and for out-of-range identifiers.
    pub fn index_in(&self, len: usize) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let idx = (self.0 - 1) as usize;
        (idx < len).then_some(idx)
    }
}

impl FromStr for ObjectiveId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n = s
            .strip_prefix("ID-")
            .ok_or_else(|| format!("Invalid question id format: {s}"))?;
        n.parse::<u32>()
            .map(ObjectiveId)
            .map_err(|_| format!("Invalid question id format: {s}"))
    }
}

impl fmt::Display for ObjectiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Question mapping
// ---------------------------------------------------------------------------

/// Confidence grade attached to a question mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("Invalid confidence grade: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Anything the service invents outside the three grades is treated
        // as Low, which the mapping filter then drops.
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or(Confidence::Low))
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::Low
    }
}

/// Structured reply to a single verbatim→question mapping request.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionMapping {
    #[serde(default = "QuestionMapping::default_id")]
    pub best_fit_question_id: String,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub reasoning: String,
}

impl QuestionMapping {
    fn default_id() -> String {
        "ID-0".to_string()
    }
}

// ---------------------------------------------------------------------------
// Emergent topics
// ---------------------------------------------------------------------------

/// A (broad, sub) topic pair assigned to a verbatim. Multi-label: one
/// verbatim may carry several assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub broad_topic: String,
    pub sub_topic: String,
}

/// A verbatim as returned by emergent-topic analysis, with its assignments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicTaggedVerbatim {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub speaker: String,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub assigned_topics: Vec<TopicAssignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTopic {
    pub sub_topic_name: String,
    #[serde(default)]
    pub sub_topic_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicHierarchy {
    pub broad_topic_name: String,
    #[serde(default)]
    pub broad_topic_description: String,
    #[serde(default)]
    pub sub_topics: Vec<SubTopic>,
}

/// Full result of the emergent-topic stage for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmergentReport {
    #[serde(default)]
    pub identified_topics_hierarchy: Vec<TopicHierarchy>,
    #[serde(default)]
    pub verbatims_with_topics: Vec<TopicTaggedVerbatim>,
}

// ---------------------------------------------------------------------------
// Strategic analysis
// ---------------------------------------------------------------------------

/// Verbatim reference carried into a topic bucket for strategic analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicVerbatim {
    pub text: String,
    pub speaker: String,
}

/// Structured reply to a per-topic strategic analysis request. The three
/// lists are independently sized; row expansion zips them raggedly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategicFindings {
    #[serde(default)]
    pub key_themes: Vec<String>,
    #[serde(default)]
    pub key_insights: String,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
    #[serde(default)]
    pub supporting_quotes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_id_parses_and_resolves() {
        let id: ObjectiveId = "ID-3".parse().unwrap();
        assert_eq!(id.index_in(5), Some(2));
        assert_eq!(id.index_in(3), Some(2));
        assert_eq!(id.index_in(2), None);
    }

    #[test]
    fn objective_id_zero_is_no_match() {
        let id: ObjectiveId = "ID-0".parse().unwrap();
        assert!(id.is_no_match());
        assert_eq!(id, ObjectiveId::NO_MATCH);
        assert_eq!(id.index_in(10), None);
    }

    #[test]
    fn objective_id_rejects_malformed() {
        assert!("Q-1".parse::<ObjectiveId>().is_err());
        assert!("ID-".parse::<ObjectiveId>().is_err());
        assert!("ID-x".parse::<ObjectiveId>().is_err());
        assert!("3".parse::<ObjectiveId>().is_err());
    }

    #[test]
    fn objective_id_round_trips_display() {
        let id: ObjectiveId = "ID-12".parse().unwrap();
        assert_eq!(id.to_string(), "ID-12");
    }

    #[test]
    fn confidence_parses_case_insensitively() {
        assert_eq!("High".parse::<Confidence>().unwrap(), Confidence::High);
        assert_eq!("medium".parse::<Confidence>().unwrap(), Confidence::Medium);
        assert!("certain".parse::<Confidence>().is_err());
    }

    #[test]
    fn unknown_confidence_deserializes_as_low() {
        let mapping: QuestionMapping =
            serde_json::from_str(r#"{"best_fit_question_id": "ID-2", "confidence": "Certain"}"#)
                .unwrap();
        assert_eq!(mapping.confidence, Confidence::Low);
    }

    #[test]
    fn question_mapping_defaults_to_no_match() {
        let mapping: QuestionMapping = serde_json::from_str("{}").unwrap();
        assert_eq!(mapping.best_fit_question_id, "ID-0");
        assert_eq!(mapping.confidence, Confidence::Low);
        assert!(mapping.reasoning.is_empty());
    }

    #[test]
    fn verbatim_serialization_omits_absent_timestamp() {
        let record = VerbatimRecord {
            speaker: "Alice".into(),
            text: "I like the design.".into(),
            source_file: "session1.txt".into(),
            timestamp: None,
        };
        let json = record.serialized();
        assert!(!json.contains("timestamp"));

        let with_ts = VerbatimRecord {
            timestamp: Some("00:01:23".into()),
            ..record
        };
        assert!(with_ts.serialized().contains("00:01:23"));
    }

    #[test]
    fn emergent_report_tolerates_sparse_json() {
        let report: EmergentReport = serde_json::from_str(
            r#"{"verbatims_with_topics": [{"text": "hmm", "speaker": "P1"}]}"#,
        )
        .unwrap();
        assert!(report.identified_topics_hierarchy.is_empty());
        assert_eq!(report.verbatims_with_topics.len(), 1);
        assert!(report.verbatims_with_topics[0].assigned_topics.is_empty());
    }
}
