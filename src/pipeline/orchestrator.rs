//! End-to-end analysis run.
//!
//! Sequences the stages: objective extraction → verbatim extraction →
//! parallel question-mapping and emergent-topic analysis → strategic
//! synthesis → artifacts. Error containment is per stage: guide problems
//! degrade, individual request failures are absorbed at the dispatcher
//! boundary, and only an empty verbatim set or a fully failed emergent
//! stage aborts the run. Artifacts already written stay on disk when a
//! later stage fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};

use crate::config::AppConfig;
use crate::models::{
    Confidence, DiscussionObjective, EmergentReport, ObjectivesDocument, ObjectiveId,
    QuestionMapping, StrategicFindings, VerbatimRecord,
};
use crate::pipeline::aggregate::{aggregate_topic_verbatims, emergent_rows, expand_strategic_rows, TopicBucket};
use crate::pipeline::chunker::VerbatimChunker;
use crate::pipeline::extract::{scan_project, VerbatimExtractor};
use crate::pipeline::{dispatcher, parser, prompt, PipelineError};
use crate::report::{self, QuestionMappingRow, StrategicInsightRow};
use crate::service::embedding::{VectorCapability, VerbatimMetadata};
use crate::service::gate::RequestGate;
use crate::service::reasoning::ReasoningRequest;
use crate::service::ServiceError;
use crate::text::{DocumentSource, SpeakerExtractor, TokenEstimator};

/// Counts and timing of one completed run.
#[derive(Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Local>,
    pub elapsed: std::time::Duration,
    pub objectives: usize,
    pub verbatims: usize,
    pub mapping_rows: usize,
    pub emergent_rows: usize,
    pub strategic_rows: usize,
    pub output_dir: PathBuf,
}

pub struct AnalysisPipeline {
    config: AppConfig,
    gate: Arc<RequestGate>,
    estimator: TokenEstimator,
    extractor: VerbatimExtractor,
    source: Box<dyn DocumentSource>,
    vector: Option<VectorCapability>,
    project_dir: PathBuf,
    output_dir: PathBuf,
}

impl AnalysisPipeline {
    pub fn new(
        project_dir: &Path,
        config: AppConfig,
        gate: Arc<RequestGate>,
        source: Box<dyn DocumentSource>,
        vector: Option<VectorCapability>,
    ) -> Result<Self, PipelineError> {
        if !project_dir.is_dir() {
            return Err(PipelineError::ProjectDirMissing(project_dir.to_path_buf()));
        }

        let speaker = SpeakerExtractor::new(&config.patterns).map_err(|e| {
            PipelineError::Config(crate::config::ConfigError::Invalid(format!(
                "speaker pattern does not compile: {e}"
            )))
        })?;

        let estimator = TokenEstimator::from_scheme_name(&config.processing.token_scheme);
        let output_dir = project_dir.join(&config.app.output_folder);

        Ok(Self {
            config,
            gate,
            estimator,
            extractor: VerbatimExtractor::new(speaker),
            source,
            vector,
            project_dir: project_dir.to_path_buf(),
            output_dir,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Run the full pipeline. Returns the summary on success; on failure
    /// the error names the stage that halted the run, and artifacts of
    /// completed stages remain on disk.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let started_at = Local::now();
        let clock = Instant::now();
        tracing::info!(
            project_dir = %self.project_dir.display(),
            "Starting qualitative analysis pipeline"
        );

        std::fs::create_dir_all(&self.output_dir)?;
        let files = scan_project(&self.project_dir, &self.config.files)?;

        // Stage 1: objectives (degrades to empty on any failure)
        let objectives_doc = self.extract_objectives(files.guide.as_deref()).await;
        let objectives = objectives_doc.objectives;

        // Stage 2: verbatims (empty is fatal)
        let verbatims = self.extract_verbatims(&files.transcripts)?;

        // Stage 3: question mapping and emergent topics, concurrently.
        // Mapping absorbs its per-item failures; a fully failed emergent
        // stage aborts the run.
        tracing::info!("Running parallel analysis");
        let (mapping_rows, emergent) = tokio::join!(
            self.map_questions(&verbatims, &objectives),
            self.emergent_topics(&verbatims),
        );
        let emergent = emergent?;

        if self.config.export.enabled && !mapping_rows.is_empty() {
            report::write_rows(&self.output_dir.join("question_mapping.json"), &mapping_rows)?;
        }

        let topic_rows = emergent_rows(&emergent);
        if self.config.export.enabled && !topic_rows.is_empty() {
            report::write_rows(
                &self.output_dir.join("emergent_topics_report.json"),
                &topic_rows,
            )?;
        }

        // Stage 4: strategic synthesis, skipped when no verbatim carried
        // a topic assignment.
        let strategic_rows = if topic_rows.is_empty() {
            tracing::info!("No topic-bearing verbatims; skipping strategic analysis");
            Vec::new()
        } else {
            let rows = self.strategic_analysis(&emergent).await;
            if self.config.export.enabled && !rows.is_empty() {
                report::write_rows(&self.output_dir.join("strategic_analysis.json"), &rows)?;
            }
            rows
        };

        let summary = RunSummary {
            started_at,
            elapsed: clock.elapsed(),
            objectives: objectives.len(),
            verbatims: verbatims.len(),
            mapping_rows: mapping_rows.len(),
            emergent_rows: topic_rows.len(),
            strategic_rows: strategic_rows.len(),
            output_dir: self.output_dir.clone(),
        };

        tracing::info!(
            elapsed_secs = summary.elapsed.as_secs_f64(),
            verbatims = summary.verbatims,
            mapping_rows = summary.mapping_rows,
            emergent_rows = summary.emergent_rows,
            strategic_rows = summary.strategic_rows,
            output_dir = %self.output_dir.display(),
            "Pipeline completed"
        );

        Ok(summary)
    }

    // -- Stage 1: objectives ------------------------------------------------

    async fn extract_objectives(&self, guide: Option<&Path>) -> ObjectivesDocument {
        tracing::info!("Step 1: extracting objectives from discussion guide");

        let Some(guide_path) = guide else {
            tracing::warn!("No discussion guide found; proceeding without objectives");
            return ObjectivesDocument::default();
        };

        match self.objectives_from_guide(guide_path).await {
            Ok(document) => {
                tracing::info!(
                    guide = %guide_path.display(),
                    objectives = document.objectives.len(),
                    "Extracted objectives"
                );
                if let Err(e) =
                    report::write_objectives(&self.output_dir.join("guide_objectives.json"), &document)
                {
                    tracing::warn!(error = %e, "Failed to persist guide objectives");
                }
                document
            }
            Err(e) => {
                tracing::warn!(error = %e, "Objective extraction failed; proceeding without objectives");
                ObjectivesDocument::default()
            }
        }
    }

    async fn objectives_from_guide(&self, path: &Path) -> Result<ObjectivesDocument, PipelineError> {
        let guide_text = self.source.read_text(path)?;
        let request = ReasoningRequest::user(prompt::objectives_prompt(&guide_text)).structured();
        let response = self.gate.call(request).await?;
        Ok(parser::parse_objectives(&response)?)
    }

    // -- Stage 2: verbatims -------------------------------------------------

    fn extract_verbatims(&self, transcripts: &[PathBuf]) -> Result<Vec<VerbatimRecord>, PipelineError> {
        tracing::info!("Step 2: extracting verbatims from transcripts");

        if transcripts.is_empty() {
            return Err(PipelineError::NoTranscripts);
        }

        let mut all = Vec::new();
        for path in transcripts {
            match self.extractor.extract_from_file(self.source.as_ref(), path) {
                Ok(verbatims) => {
                    tracing::info!(
                        file = %path.display(),
                        count = verbatims.len(),
                        "Extracted verbatims"
                    );
                    all.extend(verbatims);
                }
                Err(e) => {
                    tracing::error!(file = %path.display(), error = %e, "Failed to extract from transcript");
                }
            }
        }

        if all.is_empty() {
            return Err(PipelineError::NoVerbatims);
        }

        tracing::info!(total = all.len(), "Verbatim extraction complete");
        Ok(all)
    }

    // -- Stage 3a: question mapping ----------------------------------------

    async fn map_questions(
        &self,
        verbatims: &[VerbatimRecord],
        objectives: &[DiscussionObjective],
    ) -> Vec<QuestionMappingRow> {
        tracing::info!("Step 3a: mapping verbatims to discussion guide questions");

        if objectives.is_empty() {
            tracing::warn!("No objectives available for mapping");
            return Vec::new();
        }

        let batch_size = self.config.processing.verbatim_batch_size;
        let batch_count = verbatims.len().div_ceil(batch_size);
        let mut rows = Vec::new();

        for (i, group) in verbatims.chunks(batch_size).enumerate() {
            tracing::info!(batch = i + 1, of = batch_count, "Processing mapping batch");

            let requests: Vec<_> = group
                .iter()
                .map(|verbatim| self.map_one(verbatim, objectives))
                .collect();
            let settled = dispatcher::dispatch(requests).await;

            for (verbatim, result) in group.iter().zip(settled) {
                match result {
                    Ok(mapping) => {
                        if let Some(row) = mapping_row(verbatim, mapping, objectives) {
                            rows.push(row);
                        }
                    }
                    Err(e) => {
                        tracing::error!(speaker = %verbatim.speaker, error = %e, "Error mapping verbatim");
                    }
                }
            }
        }

        rows
    }

    async fn map_one(
        &self,
        verbatim: &VerbatimRecord,
        objectives: &[DiscussionObjective],
    ) -> Result<QuestionMapping, ServiceError> {
        let request = ReasoningRequest::user(prompt::mapping_prompt(
            &verbatim.speaker,
            &verbatim.text,
            objectives,
        ))
        .structured();
        let response = self.gate.call(request).await?;

        // Best-effort vector storage for later retrieval; absence or
        // failure of the capability never affects the mapping result.
        if let Some(vector) = &self.vector {
            vector
                .store_verbatim(
                    &verbatim.text,
                    VerbatimMetadata {
                        speaker: verbatim.speaker.clone(),
                        source_file: verbatim.source_file.clone(),
                        kind: "verbatim".into(),
                    },
                )
                .await;
        }

        parser::parse_mapping(&response)
    }

    // -- Stage 3b: emergent topics -----------------------------------------

    async fn emergent_topics(&self, verbatims: &[VerbatimRecord]) -> Result<EmergentReport, PipelineError> {
        tracing::info!("Step 3b: performing emergent topic analysis");

        let chunker = VerbatimChunker::new(
            self.estimator,
            self.config.processing.target_input_tokens_per_chunk,
            &self.config.reasoning,
        );
        let batches = chunker.chunk(verbatims);

        let requests: Vec<_> = batches
            .iter()
            .map(|batch| async move {
                let request = ReasoningRequest::user(prompt::emergent_prompt(batch))
                    .with_system(prompt::ANALYST_SYSTEM_PROMPT)
                    .structured()
                    .max_output_tokens(self.config.reasoning.response_tokens as u32);
                let response = self.gate.call(request).await?;
                parser::parse_emergent(&response)
            })
            .collect();

        let settled = dispatcher::dispatch(requests).await;
        let mut valid = dispatcher::successes(settled, "emergent-topics");

        if valid.is_empty() {
            return Err(PipelineError::EmergentAnalysisFailed);
        }

        // TODO: synthesize topic hierarchies across batches instead of
        // keeping only the first valid result.
        if valid.len() > 1 {
            tracing::warn!(
                kept = 1,
                discarded = valid.len() - 1,
                "Multiple emergent batches succeeded; keeping first result only"
            );
        }

        Ok(valid.remove(0))
    }

    // -- Stage 4: strategic analysis ---------------------------------------

    async fn strategic_analysis(&self, emergent: &EmergentReport) -> Vec<StrategicInsightRow> {
        tracing::info!("Step 4: performing strategic analysis");

        let buckets = aggregate_topic_verbatims(emergent);
        let batch_size = self.config.processing.strategic_analysis_batch_size;
        let mut rows = Vec::new();

        for group in buckets.chunks(batch_size) {
            let requests: Vec<_> = group.iter().map(|bucket| self.analyze_topic(bucket)).collect();
            let settled = dispatcher::dispatch(requests).await;

            for (bucket, result) in group.iter().zip(settled) {
                match result {
                    Ok(findings) => rows.extend(expand_strategic_rows(
                        &bucket.broad_topic,
                        &bucket.sub_topic,
                        &findings,
                        bucket.verbatims.len(),
                    )),
                    Err(e) => {
                        tracing::error!(
                            broad_topic = %bucket.broad_topic,
                            sub_topic = %bucket.sub_topic,
                            error = %e,
                            "Error analyzing topic"
                        );
                    }
                }
            }
        }

        rows
    }

    async fn analyze_topic(&self, bucket: &TopicBucket) -> Result<StrategicFindings, ServiceError> {
        let request = ReasoningRequest::user(prompt::strategic_prompt(
            &bucket.broad_topic,
            &bucket.sub_topic,
            &bucket.verbatims,
            self.config.processing.max_verbatims_per_topic,
        ))
        .structured()
        .max_output_tokens(self.config.reasoning.response_tokens as u32);
        let response = self.gate.call(request).await?;
        parser::parse_strategic(&response)
    }
}

/// Validate one mapping result into a report row. Anything dropped here
/// is logged at the point of drop: no-match ids and low confidence at
/// debug (routine), malformed or out-of-range ids as errors.
fn mapping_row(
    verbatim: &VerbatimRecord,
    mapping: QuestionMapping,
    objectives: &[DiscussionObjective],
) -> Option<QuestionMappingRow> {
    if mapping.confidence == Confidence::Low {
        tracing::debug!(speaker = %verbatim.speaker, "Dropping low-confidence mapping");
        return None;
    }

    let id: ObjectiveId = match mapping.best_fit_question_id.parse() {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "Invalid question id in mapping response");
            return None;
        }
    };

    if id.is_no_match() {
        tracing::debug!(speaker = %verbatim.speaker, "Verbatim matched no question");
        return None;
    }

    let Some(idx) = id.index_in(objectives.len()) else {
        tracing::error!(id = %id, objectives = objectives.len(), "Question id out of range");
        return None;
    };

    let objective = &objectives[idx];
    Some(QuestionMappingRow {
        section: objective.section.clone(),
        question: objective.question.clone(),
        verbatim: verbatim.text.clone(),
        speaker: verbatim.speaker.clone(),
        confidence: mapping.confidence.as_str().to_string(),
        reasoning: mapping.reasoning,
        source_file: verbatim.source_file.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use regex::Regex;

    use crate::config::PatternConfig;
    use crate::service::reasoning::{MockReasoning, ReasoningService};
    use crate::text::PlainTextSource;

    /// Routes each request to a canned stage response by inspecting the
    /// prompt, the way the live service distinguishes stages by content.
    struct RoutedMock;

    #[async_trait]
    impl ReasoningService for RoutedMock {
        async fn call(&self, request: ReasoningRequest) -> Result<String, ServiceError> {
            let prompt_text = &request.messages.last().unwrap().content;

            if prompt_text.contains("discussion guide") {
                return Ok(r#"{"objectives": [
                    {"section": "Product", "question": "What did you think of the design?"},
                    {"section": "Product", "question": "What was confusing?"}
                ]}"#
                    .into());
            }

            if prompt_text.starts_with("Map this verbatim") {
                // Alice's verbatim maps to Q1 with high confidence; Bob's
                // comes back low and must be dropped.
                if prompt_text.contains("Speaker: Alice") {
                    return Ok(r#"{"best_fit_question_id": "ID-1", "confidence": "High", "reasoning": "direct"}"#.into());
                }
                return Ok(r#"{"best_fit_question_id": "ID-2", "confidence": "Low", "reasoning": "weak"}"#.into());
            }

            if prompt_text.contains("hierarchical topics") {
                return Ok(r#"{
                    "identified_topics_hierarchy": [
                        {"broad_topic_name": "Design", "sub_topics": [{"sub_topic_name": "Visual"}]}
                    ],
                    "verbatims_with_topics": [
                        {"text": "I like the design.", "speaker": "Alice", "source_file": "session1.txt",
                         "assigned_topics": [{"broad_topic": "Design", "sub_topic": "Visual"}]},
                        {"text": "It's confusing.", "speaker": "Bob", "source_file": "session1.txt",
                         "assigned_topics": [{"broad_topic": "Design", "sub_topic": "Clarity"}]}
                    ]
                }"#
                .into());
            }

            if prompt_text.starts_with("Analyze these verbatims for the topic") {
                return Ok(r#"{
                    "key_themes": ["Aesthetics", "First impressions"],
                    "key_insights": "Design polarizes the group.",
                    "key_takeaways": ["Ship a guided tour"],
                    "supporting_quotes": []
                }"#
                .into());
            }

            Err(ServiceError::HttpClient(format!(
                "unrouted prompt: {}",
                &prompt_text[..prompt_text.len().min(60)]
            )))
        }
    }

    fn cjk_predicate() -> Regex {
        Regex::new(&PatternConfig::default().needs_translation).unwrap()
    }

    fn write_project(dir: &Path) {
        std::fs::write(
            dir.join("discussion_guide.txt"),
            "1. What did you think of the design?\n2. What was confusing?\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("session1.txt"),
            "Alice: I like the design.\n\nBob: It's confusing.\n",
        )
        .unwrap();
    }

    fn pipeline_with(
        dir: &Path,
        service: Arc<dyn ReasoningService>,
    ) -> AnalysisPipeline {
        let config = AppConfig::default();
        let gate = Arc::new(RequestGate::new(service, 4, cjk_predicate()));
        AnalysisPipeline::new(dir, config, gate, Box::new(PlainTextSource), None).unwrap()
    }

    #[tokio::test]
    async fn full_run_produces_all_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let pipeline = pipeline_with(dir.path(), Arc::new(RoutedMock));
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.objectives, 2);
        assert_eq!(summary.verbatims, 2, "blank line must be ignored");
        assert_eq!(summary.mapping_rows, 1, "low-confidence mapping dropped");
        assert_eq!(summary.emergent_rows, 2);
        // Two topic buckets × 2-row ragged expansion each
        assert_eq!(summary.strategic_rows, 4);

        let out = pipeline.output_dir();
        assert!(out.join("guide_objectives.json").exists());
        assert!(out.join("question_mapping.json").exists());
        assert!(out.join("emergent_topics_report.json").exists());
        assert!(out.join("strategic_analysis.json").exists());

        let mapping = std::fs::read_to_string(out.join("question_mapping.json")).unwrap();
        assert!(mapping.contains("I like the design."));
        assert!(!mapping.contains("It's confusing."), "dropped row must not be exported");
    }

    #[tokio::test]
    async fn missing_guide_degrades_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("session1.txt"),
            "Alice: I like the design.\nBob: It's confusing.\n",
        )
        .unwrap();

        let pipeline = pipeline_with(dir.path(), Arc::new(RoutedMock));
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.objectives, 0);
        assert_eq!(summary.mapping_rows, 0, "mapping skipped without objectives");
        assert!(summary.emergent_rows > 0, "emergent analysis still runs");
        assert!(!pipeline.output_dir().join("guide_objectives.json").exists());
    }

    #[tokio::test]
    async fn empty_project_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline_with(dir.path(), Arc::new(RoutedMock));
        assert!(matches!(
            pipeline.run().await,
            Err(PipelineError::NoTranscripts)
        ));
    }

    #[tokio::test]
    async fn transcripts_without_verbatims_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("session1.txt"),
            "(moderator adjusts the recording equipment)\n\n",
        )
        .unwrap();

        let pipeline = pipeline_with(dir.path(), Arc::new(RoutedMock));
        assert!(matches!(
            pipeline.run().await,
            Err(PipelineError::NoVerbatims)
        ));
    }

    #[tokio::test]
    async fn total_emergent_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let pipeline = pipeline_with(dir.path(), Arc::new(MockReasoning::failing("503")));
        assert!(matches!(
            pipeline.run().await,
            Err(PipelineError::EmergentAnalysisFailed)
        ));
    }

    #[tokio::test]
    async fn dry_run_completes_with_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let pipeline = pipeline_with(
            dir.path(),
            Arc::new(crate::service::reasoning::DryRunReasoning),
        );
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.verbatims, 2);
        assert_eq!(summary.objectives, 0);
        assert_eq!(summary.mapping_rows, 0);
        assert_eq!(summary.emergent_rows, 0);
        assert_eq!(summary.strategic_rows, 0, "strategic stage skipped");
    }

    #[test]
    fn mapping_row_validation() {
        let objectives = vec![DiscussionObjective {
            section: "Product".into(),
            question: "Design?".into(),
        }];
        let verbatim = VerbatimRecord {
            speaker: "Alice".into(),
            text: "I like it.".into(),
            source_file: "s1.txt".into(),
            timestamp: None,
        };

        let keep = |id: &str, confidence: Confidence| {
            mapping_row(
                &verbatim,
                QuestionMapping {
                    best_fit_question_id: id.into(),
                    confidence,
                    reasoning: String::new(),
                },
                &objectives,
            )
        };

        assert!(keep("ID-1", Confidence::High).is_some());
        assert!(keep("ID-1", Confidence::Medium).is_some());
        // Dropped: low confidence, no-match sentinel, out of range, malformed
        assert!(keep("ID-1", Confidence::Low).is_none());
        assert!(keep("ID-0", Confidence::High).is_none());
        assert!(keep("ID-2", Confidence::High).is_none());
        assert!(keep("Q-1", Confidence::High).is_none());
    }
}
