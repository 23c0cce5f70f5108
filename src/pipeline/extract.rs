//! Project-directory scanning and verbatim extraction.
//!
//! A project directory holds one discussion guide (identified by filename
//! keywords) and any number of transcripts. Transcripts are parsed line by
//! line through the speaker patterns; lines before a `==========` header
//! separator are session metadata and are skipped.

use std::path::{Path, PathBuf};

use crate::config::FileConfig;
use crate::models::VerbatimRecord;
use crate::pipeline::PipelineError;
use crate::text::{DocumentSource, SpeakerExtractor};

/// Files discovered in a project directory.
#[derive(Debug, Clone)]
pub struct ProjectFiles {
    pub guide: Option<PathBuf>,
    pub transcripts: Vec<PathBuf>,
}

/// Scan a project directory. The guide is the first supported file whose
/// lower-cased name contains a guide keyword; every other supported file
/// is a transcript, skipping editor artifacts (`~`, `.` prefixes).
/// Files are visited in name order so runs are deterministic.
pub fn scan_project(dir: &Path, files: &FileConfig) -> Result<ProjectFiles, PipelineError> {
    if !dir.is_dir() {
        return Err(PipelineError::ProjectDirMissing(dir.to_path_buf()));
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_supported_extension(path, files))
        .filter(|path| {
            file_name(path)
                .map(|name| !name.starts_with('~') && !name.starts_with('.'))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    let guide = candidates.iter().find(|path| is_guide(path, files)).cloned();

    let transcripts = candidates
        .into_iter()
        .filter(|path| Some(path) != guide.as_ref())
        .collect();

    Ok(ProjectFiles { guide, transcripts })
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn has_supported_extension(path: &Path, files: &FileConfig) -> bool {
    file_name(path)
        .map(|name| {
            let lower = name.to_lowercase();
            files.supported_extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
        })
        .unwrap_or(false)
}

fn is_guide(path: &Path, files: &FileConfig) -> bool {
    file_name(path)
        .map(|name| {
            let lower = name.to_lowercase();
            files.guide_keywords.iter().any(|kw| lower.contains(kw.as_str()))
        })
        .unwrap_or(false)
}

/// Line-by-line verbatim extraction over a `DocumentSource`.
pub struct VerbatimExtractor {
    speaker: SpeakerExtractor,
}

impl VerbatimExtractor {
    pub fn new(speaker: SpeakerExtractor) -> Self {
        Self { speaker }
    }

    /// Extract every attributed statement from one transcript, preserving
    /// line order. Unparseable lines are narrative and are discarded
    /// without logging — that is the normal case, not a drop.
    pub fn extract_from_file(
        &self,
        source: &dyn DocumentSource,
        path: &Path,
    ) -> Result<Vec<VerbatimRecord>, PipelineError> {
        let lines = source.read_lines(path)?;
        let start = content_start(&lines);
        let source_file = file_name(path).unwrap_or_default().to_string();

        let verbatims: Vec<VerbatimRecord> = lines[start..]
            .iter()
            .filter_map(|line| self.speaker.extract(line))
            .map(|line| VerbatimRecord {
                speaker: line.speaker,
                text: line.text,
                source_file: source_file.clone(),
                timestamp: line.timestamp,
            })
            .collect();

        Ok(verbatims)
    }
}

/// Index of the first content line. A separator of ten or more `=` past
/// the first line marks the end of a metadata header; without one the
/// whole file is content.
fn content_start(lines: &[String]) -> usize {
    for (i, line) in lines.iter().enumerate() {
        if i > 0 && line.contains("==========") {
            return i + 1;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;
    use crate::text::PlainTextSource;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn extractor() -> VerbatimExtractor {
        VerbatimExtractor::new(SpeakerExtractor::new(&PatternConfig::default()).unwrap())
    }

    #[test]
    fn scan_separates_guide_from_transcripts() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "discussion_guide.txt", "1. Why?");
        write_file(dir.path(), "session1.txt", "Alice: hi");
        write_file(dir.path(), "session2.txt", "Bob: hello");
        write_file(dir.path(), "notes.pdf", "binary");
        write_file(dir.path(), "~session1.txt", "lock file");

        let files = scan_project(dir.path(), &FileConfig::default()).unwrap();
        assert!(files.guide.unwrap().ends_with("discussion_guide.txt"));
        assert_eq!(files.transcripts.len(), 2);
        assert!(files.transcripts[0].ends_with("session1.txt"));
    }

    #[test]
    fn scan_without_guide() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "session1.txt", "Alice: hi");

        let files = scan_project(dir.path(), &FileConfig::default()).unwrap();
        assert!(files.guide.is_none());
        assert_eq!(files.transcripts.len(), 1);
    }

    #[test]
    fn missing_directory_is_fatal() {
        let result = scan_project(Path::new("/nonexistent/project"), &FileConfig::default());
        assert!(matches!(result, Err(PipelineError::ProjectDirMissing(_))));
    }

    #[test]
    fn extracts_two_records_skipping_blank_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "session1.txt",
            "Alice: I like the design.\n\nBob: It's confusing.\n",
        );

        let verbatims = extractor()
            .extract_from_file(&PlainTextSource, &path)
            .unwrap();

        assert_eq!(verbatims.len(), 2);
        assert_eq!(verbatims[0].speaker, "Alice");
        assert_eq!(verbatims[0].text, "I like the design.");
        assert_eq!(verbatims[1].speaker, "Bob");
        assert_eq!(verbatims[1].source_file, "session1.txt");
    }

    #[test]
    fn header_before_separator_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "session1.txt",
            "Project: Q3 usability study\nModerator: Dana\n==========\nAlice: The header above is metadata.\n",
        );

        let verbatims = extractor()
            .extract_from_file(&PlainTextSource, &path)
            .unwrap();

        assert_eq!(verbatims.len(), 1);
        assert_eq!(verbatims[0].speaker, "Alice");
    }

    #[test]
    fn separator_on_first_line_does_not_trigger_skip() {
        let lines: Vec<String> = vec!["==========".into(), "Alice: hi".into()];
        assert_eq!(content_start(&lines), 0);
    }

    #[test]
    fn order_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let content: String = (0..12).map(|i| format!("P{i}: statement {i}\n")).collect();
        let path = write_file(dir.path(), "session1.txt", &content);

        let verbatims = extractor()
            .extract_from_file(&PlainTextSource, &path)
            .unwrap();
        let speakers: Vec<&str> = verbatims.iter().map(|v| v.speaker.as_str()).collect();
        let expected: Vec<String> = (0..12).map(|i| format!("P{i}")).collect();
        assert_eq!(speakers, expected.iter().map(|s| s.as_str()).collect::<Vec<_>>());
    }
}
