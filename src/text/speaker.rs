//! Speaker-attributed line parsing.
//!
//! A transcript line either carries an attributed statement
//! (`Speaker: text`, optionally with a timestamp) or it is narrative /
//! stage direction and is discarded. Patterns come from configuration and
//! are compiled once per run.

use regex::Regex;

use crate::config::PatternConfig;

/// A successfully parsed transcript line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerLine {
    pub speaker: String,
    pub text: String,
    pub timestamp: Option<String>,
}

/// Ordered pattern matcher for transcript lines. First match wins:
/// speaker+timestamp+text, then speaker+text, then no-match.
pub struct SpeakerExtractor {
    timestamped: Regex,
    simple: Regex,
}

impl SpeakerExtractor {
    pub fn new(patterns: &PatternConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            timestamped: Regex::new(&patterns.speaker_timestamp)?,
            simple: Regex::new(&patterns.speaker)?,
        })
    }

    /// Parse one line. `None` for blank lines, narrative lines, and speaker
    /// tags with nothing after them — an empty text capture is a no-match,
    /// never an empty-text verbatim.
    pub fn extract(&self, line: &str) -> Option<SpeakerLine> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if let Some(caps) = self.timestamped.captures(line) {
            let speaker = caps.get(1).map_or("", |m| m.as_str()).trim();
            let timestamp = caps.get(2).map_or("", |m| m.as_str()).trim();
            let text = caps.get(3).map_or("", |m| m.as_str()).trim();
            if text.is_empty() {
                return None;
            }
            return Some(SpeakerLine {
                speaker: speaker.to_string(),
                text: text.to_string(),
                timestamp: Some(timestamp.to_string()),
            });
        }

        if let Some(caps) = self.simple.captures(line) {
            let speaker = caps.get(1).map_or("", |m| m.as_str()).trim();
            let text = caps.get(2).map_or("", |m| m.as_str()).trim();
            if text.is_empty() {
                return None;
            }
            return Some(SpeakerLine {
                speaker: speaker.to_string(),
                text: text.to_string(),
                timestamp: None,
            });
        }

        None
    }
}
