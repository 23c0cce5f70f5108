//! Topic aggregation and strategic row expansion.
//!
//! Folds the emergent-topic report into a per-topic verbatim index
//! (multi-label verbatims fan out into every bucket they were assigned),
//! and expands per-topic strategic findings into the denormalized row
//! table the exporters consume.

use std::collections::HashMap;

use crate::models::{EmergentReport, StrategicFindings, TopicVerbatim};
use crate::report::{EmergentTopicRow, StrategicInsightRow};

/// A (broad topic, sub-topic) pair.
pub type TopicKey = (String, String);

/// One aggregated topic bucket: the pair plus every verbatim assigned to it.
#[derive(Debug, Clone)]
pub struct TopicBucket {
    pub broad_topic: String,
    pub sub_topic: String,
    pub verbatims: Vec<TopicVerbatim>,
}

/// Build the topic→verbatims index from an emergent report. Buckets keep
/// first-seen order so report tables are stable for a given input; a
/// verbatim with several assignments lands in several buckets.
pub fn aggregate_topic_verbatims(report: &EmergentReport) -> Vec<TopicBucket> {
    let mut buckets: Vec<TopicBucket> = Vec::new();
    let mut index: HashMap<TopicKey, usize> = HashMap::new();

    for verbatim in &report.verbatims_with_topics {
        for topic in &verbatim.assigned_topics {
            let key = (topic.broad_topic.clone(), topic.sub_topic.clone());
            let slot = *index.entry(key).or_insert_with(|| {
                buckets.push(TopicBucket {
                    broad_topic: topic.broad_topic.clone(),
                    sub_topic: topic.sub_topic.clone(),
                    verbatims: Vec::new(),
                });
                buckets.len() - 1
            });
            buckets[slot].verbatims.push(TopicVerbatim {
                text: verbatim.text.clone(),
                speaker: verbatim.speaker.clone(),
            });
        }
    }

    buckets
}

/// Flatten the emergent report into its tabular form: one row per
/// (assigned topic, verbatim) pairing, in report order.
pub fn emergent_rows(report: &EmergentReport) -> Vec<EmergentTopicRow> {
    report
        .verbatims_with_topics
        .iter()
        .flat_map(|verbatim| {
            verbatim.assigned_topics.iter().map(|topic| EmergentTopicRow {
                broad_topic: topic.broad_topic.clone(),
                sub_topic: topic.sub_topic.clone(),
                verbatim: verbatim.text.clone(),
                speaker: verbatim.speaker.clone(),
                source_file: verbatim.source_file.clone(),
            })
        })
        .collect()
}

/// Expand one topic's strategic findings into rows.
///
/// Themes, takeaways and quotes are independently sized; row `i` carries
/// the `i`-th element of each list (empty string where a list is shorter).
/// Row count is the longest list's length, minimum one — a topic with
/// three empty lists still yields a single row carrying the key insights.
/// The base fields repeat on every row; downstream spreadsheet tooling
/// expects the denormalized form.
pub fn expand_strategic_rows(
    broad_topic: &str,
    sub_topic: &str,
    findings: &StrategicFindings,
    verbatim_count: usize,
) -> Vec<StrategicInsightRow> {
    let rows = findings
        .key_themes
        .len()
        .max(findings.key_takeaways.len())
        .max(findings.supporting_quotes.len())
        .max(1);

    (0..rows)
        .map(|i| StrategicInsightRow {
            broad_topic: broad_topic.to_string(),
            sub_topic: sub_topic.to_string(),
            key_insights: findings.key_insights.clone(),
            verbatim_count,
            theme: findings.key_themes.get(i).cloned().unwrap_or_default(),
            takeaway: findings.key_takeaways.get(i).cloned().unwrap_or_default(),
            supporting_quote: findings
                .supporting_quotes
                .get(i)
                .cloned()
                .unwrap_or_default(),
        })
        .collect()
}
