//! Prompt assembly for each analysis stage.
//!
//! Every structured prompt states its expected JSON shape inline; the
//! lenient parsers in `parser.rs` are the other half of that contract.

use crate::models::{DiscussionObjective, TopicVerbatim};
use crate::pipeline::chunker::VerbatimBatch;

pub const ANALYST_SYSTEM_PROMPT: &str = "You are a qualitative research analyst.";

/// Extract every question from a discussion guide.
pub fn objectives_prompt(guide_text: &str) -> String {
    format!(
        r#"Extract every single question from this discussion guide into a structured JSON format.
Return: {{"objectives": [{{"section": "...", "question": "..."}}]}}

Discussion guide:
{guide_text}"#
    )
}

/// Map one verbatim to the best-fitting guide question.
pub fn mapping_prompt(
    speaker: &str,
    text: &str,
    objectives: &[DiscussionObjective],
) -> String {
    let objectives_list = objectives
        .iter()
        .enumerate()
        .map(|(i, obj)| format!("ID-{}: [{}] {}", i + 1, obj.section, obj.question))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Map this verbatim to the most relevant question. Use "ID-0" if none fits.
Return: {{"best_fit_question_id": "ID-X", "confidence": "High/Medium/Low", "reasoning": "..."}}

Questions:
{objectives_list}

Verbatim:
Speaker: {speaker}
Text: "{text}""#
    )
}

/// Discover hierarchical topics across a batch of verbatims.
pub fn emergent_prompt(batch: &VerbatimBatch) -> String {
    let verbatims_json = batch
        .records
        .iter()
        .map(|record| record.serialized())
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"Analyze these verbatims and identify hierarchical topics.

Return JSON format:
{{
  "identified_topics_hierarchy": [
    {{
      "broad_topic_name": "...",
      "broad_topic_description": "...",
      "sub_topics": [{{"sub_topic_name": "...", "sub_topic_description": "..."}}]
    }}
  ],
  "verbatims_with_topics": [
    {{
      "text": "...",
      "speaker": "...",
      "source_file": "...",
      "assigned_topics": [{{"broad_topic": "...", "sub_topic": "..."}}]
    }}
  ]
}}

Verbatims:
[
{verbatims_json}
]"#
    )
}

/// Synthesize themes, takeaways and quotes for one topic pair. At most
/// `max_verbatims` are quoted into the prompt.
pub fn strategic_prompt(
    broad_topic: &str,
    sub_topic: &str,
    verbatims: &[TopicVerbatim],
    max_verbatims: usize,
) -> String {
    let verbatim_list = verbatims
        .iter()
        .take(max_verbatims)
        .enumerate()
        .map(|(i, v)| format!("{}. (Speaker: {}) \"{}\"", i + 1, v.speaker, v.text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Analyze these verbatims for the topic '{sub_topic}' under '{broad_topic}'.

Return JSON format:
{{
  "key_themes": ["2-4 critical themes"],
  "key_insights": "Analysis paragraph",
  "key_takeaways": ["2-3 strategic recommendations"],
  "supporting_quotes": ["2-3 quotes with speakers"]
}}

Verbatims:
{verbatim_list}"#
    )
}

/// Translate non-English text to English.
pub fn translation_prompt(text: &str) -> String {
    format!("Translate the following text to English, returning only the translation: {text}")
}
