//! Token-budgeted partitioning of verbatims into submission batches.
//!
//! Greedy sequential bin packing: walk the verbatims in order, pricing each
//! record's JSON serialization through the shared token estimator, and cut
//! a new batch whenever the next record would push the running total past
//! the ceiling. The output is a partition — concatenating the batches in
//! order reproduces the input exactly, so no verbatim is ever lost to
//! chunking.

use crate::config::ReasoningConfig;
use crate::models::VerbatimRecord;
use crate::text::TokenEstimator;

/// Fixed token cost of the prompt scaffolding (instructions, response
/// schema) that wraps a batch. Reserved off the model window before any
/// verbatim is admitted.
pub const BASE_PROMPT_OVERHEAD_TOKENS: usize = 1000;

/// One token-bounded submission batch. Consumed by exactly one reasoning
/// call and discarded after result extraction.
#[derive(Debug, Clone)]
pub struct VerbatimBatch {
    pub records: Vec<VerbatimRecord>,
    /// Estimated input cost of the serialized records.
    pub token_estimate: usize,
}

impl VerbatimBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct VerbatimChunker {
    estimator: TokenEstimator,
    ceiling: usize,
}

impl VerbatimChunker {
    /// The effective per-batch ceiling is the smaller of the configured
    /// target and what the model window affords once prompt overhead,
    /// response reservation and the safety buffer are set aside. The
    /// configured target may well exceed the affordable budget; taking the
    /// minimum is what keeps oversized submissions from ever being built.
    pub fn new(
        estimator: TokenEstimator,
        target_input_tokens: usize,
        reasoning: &ReasoningConfig,
    ) -> Self {
        let affordable = reasoning.max_tokens.saturating_sub(
            BASE_PROMPT_OVERHEAD_TOKENS + reasoning.response_tokens + reasoning.safety_buffer,
        );
        Self {
            estimator,
            ceiling: target_input_tokens.min(affordable),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Partition `verbatims` into ordered batches. A single record whose
    /// own cost exceeds the ceiling still gets a batch of its own — it is
    /// never dropped and never split mid-record.
    pub fn chunk(&self, verbatims: &[VerbatimRecord]) -> Vec<VerbatimBatch> {
        let mut batches = Vec::new();
        let mut current: Vec<VerbatimRecord> = Vec::new();
        let mut current_tokens = 0usize;

        for verbatim in verbatims {
            let cost = self.estimator.count(&verbatim.serialized());

            if current_tokens + cost > self.ceiling && !current.is_empty() {
                batches.push(VerbatimBatch {
                    records: std::mem::take(&mut current),
                    token_estimate: current_tokens,
                });
                current_tokens = 0;
            }

            current.push(verbatim.clone());
            current_tokens += cost;
        }

        if !current.is_empty() {
            batches.push(VerbatimBatch {
                records: current,
                token_estimate: current_tokens,
            });
        }

        tracing::info!(
            verbatims = verbatims.len(),
            batches = batches.len(),
            ceiling = self.ceiling,
            "Chunked verbatims for submission"
        );

        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TokenScheme;

    fn record(speaker: &str, text: &str) -> VerbatimRecord {
        VerbatimRecord {
            speaker: speaker.into(),
            text: text.into(),
            source_file: "session1.txt".into(),
            timestamp: None,
        }
    }

    fn chunker_with_ceiling(target: usize) -> VerbatimChunker {
        // Window large enough that the target is the binding constraint
        let reasoning = ReasoningConfig {
            max_tokens: 1_000_000,
            ..ReasoningConfig::default()
        };
        VerbatimChunker::new(
            TokenEstimator::new(TokenScheme::Cl100k),
            target,
            &reasoning,
        )
    }

    fn make_verbatims(n: usize) -> Vec<VerbatimRecord> {
        (0..n)
            .map(|i| record(&format!("P{i}"), &format!("Statement number {i} about the product.")))
            .collect()
    }

    #[test]
    fn concatenated_batches_reproduce_input() {
        let verbatims = make_verbatims(25);
        let batches = chunker_with_ceiling(60).chunk(&verbatims);

        let rejoined: Vec<VerbatimRecord> = batches
            .iter()
            .flat_map(|b| b.records.iter().cloned())
            .collect();
        assert_eq!(rejoined, verbatims, "chunking must be a partition");
        assert!(batches.len() > 1, "ceiling of 60 should force multiple batches");
    }

    #[test]
    fn no_batch_is_empty() {
        let verbatims = make_verbatims(10);
        for ceiling in [1, 10, 100, 10_000] {
            let batches = chunker_with_ceiling(ceiling).chunk(&verbatims);
            assert!(batches.iter().all(|b| !b.is_empty()));
        }
    }

    #[test]
    fn batches_respect_ceiling_except_oversized_singletons() {
        let verbatims = make_verbatims(30);
        let chunker = chunker_with_ceiling(50);
        for batch in chunker.chunk(&verbatims) {
            if batch.len() > 1 {
                assert!(
                    batch.token_estimate <= chunker.ceiling(),
                    "multi-record batch over ceiling: {} tokens",
                    batch.token_estimate
                );
            }
        }
    }

    #[test]
    fn oversized_verbatim_gets_its_own_batch() {
        let huge = record("P9", &"word ".repeat(500));
        let verbatims = vec![
            record("P1", "Short remark."),
            huge.clone(),
            record("P2", "Another short remark."),
        ];

        let chunker = chunker_with_ceiling(40);
        let batches = chunker.chunk(&verbatims);

        let holding: Vec<&VerbatimBatch> = batches
            .iter()
            .filter(|b| b.records.contains(&huge))
            .collect();
        assert_eq!(holding.len(), 1, "oversized verbatim appears exactly once");
        assert_eq!(holding[0].len(), 1, "oversized verbatim rides alone");

        // And nothing else was lost around it
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn single_small_verbatim_single_batch() {
        let verbatims = vec![record("P1", "Fine.")];
        let batches = chunker_with_ceiling(10_000).chunk(&verbatims);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }

    #[test]
    fn empty_input_yields_no_batches() {
        let batches = chunker_with_ceiling(100).chunk(&[]);
        assert!(batches.is_empty());
    }

    #[test]
    fn model_window_caps_generous_target() {
        let reasoning = ReasoningConfig {
            max_tokens: 8_000,
            response_tokens: 3_000,
            safety_buffer: 1_000,
            ..ReasoningConfig::default()
        };
        let chunker = VerbatimChunker::new(
            TokenEstimator::new(TokenScheme::Cl100k),
            1_000_000,
            &reasoning,
        );
        // 8000 - 1000 overhead - 3000 response - 1000 buffer
        assert_eq!(chunker.ceiling(), 3_000);
    }

    #[test]
    fn target_caps_generous_window() {
        let reasoning = ReasoningConfig {
            max_tokens: 1_000_000,
            ..ReasoningConfig::default()
        };
        let chunker =
            VerbatimChunker::new(TokenEstimator::new(TokenScheme::Cl100k), 5_000, &reasoning);
        assert_eq!(chunker.ceiling(), 5_000);
    }
}
