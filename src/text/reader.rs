//! Raw document access.
//!
//! The pipeline core never touches the filesystem encoding mess directly:
//! it asks a `DocumentSource` for decoded text or lines. The plain-text
//! implementation walks a fixed ordered list of candidate decodings —
//! strict UTF-8 first, BOM-signalled UTF-16 variants, then lossy UTF-8 as
//! the terminal fallback so no transcript is ever rejected for encoding
//! alone.

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Abstract supplier of transcript / guide content.
pub trait DocumentSource: Send + Sync {
    /// Whole document as decoded text.
    fn read_text(&self, path: &Path) -> Result<String, ReadError>;

    /// Document as an ordered list of lines.
    fn read_lines(&self, path: &Path) -> Result<Vec<String>, ReadError> {
        Ok(self
            .read_text(path)?
            .lines()
            .map(|l| l.to_string())
            .collect())
    }
}

/// Filesystem-backed source for plain-text documents.
pub struct PlainTextSource;

impl DocumentSource for PlainTextSource {
    fn read_text(&self, path: &Path) -> Result<String, ReadError> {
        let bytes = std::fs::read(path).map_err(|source| ReadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(decode_with_fallback(&bytes))
    }
}

/// Decode bytes through the candidate list, first success wins.
fn decode_with_fallback(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return strip_bom(text).to_string();
    }

    if let Some(text) = decode_utf16(bytes) {
        return text;
    }

    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode UTF-16 when a byte-order mark announces it.
fn decode_utf16(bytes: &[u8]) -> Option<String> {
    let (le, payload) = match bytes {
        [0xFF, 0xFE, rest @ ..] => (true, rest),
        [0xFE, 0xFF, rest @ ..] => (false, rest),
        _ => return None,
    };

    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| {
            if le {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    Some(String::from_utf16_lossy(&units))
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_bytes(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn utf8_reads_directly() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bytes(&dir, "t.txt", "Alice: hello\nBob: hi\n".as_bytes());
        let text = PlainTextSource.read_text(&path).unwrap();
        assert!(text.starts_with("Alice: hello"));
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("Alice: hello".as_bytes());
        let path = write_bytes(&dir, "t.txt", &bytes);
        let text = PlainTextSource.read_text(&path).unwrap();
        assert_eq!(text, "Alice: hello");
    }

    #[test]
    fn utf16_le_decoded_via_bom() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "P1: 很好".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let path = write_bytes(&dir, "t.txt", &bytes);
        let text = PlainTextSource.read_text(&path).unwrap();
        assert_eq!(text, "P1: 很好");
    }

    #[test]
    fn undecodable_bytes_fall_back_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bytes(&dir, "t.txt", &[0x41, 0x42, 0xC0, 0x43]);
        let text = PlainTextSource.read_text(&path).unwrap();
        assert!(text.contains("AB"));
        assert!(text.contains('C'));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = PlainTextSource.read_text(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(ReadError::Io { .. })));
    }

    #[test]
    fn read_lines_splits() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bytes(&dir, "t.txt", b"one\ntwo\nthree");
        let lines = PlainTextSource.read_lines(&path).unwrap();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }
}
