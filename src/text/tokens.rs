//! Token-count estimation for budget math.
//!
//! The chunker and prompt assembly both price text through the same
//! estimator instance, so a given string always costs the same number of
//! tokens within a run. The estimate does not need to match any vendor
//! tokenizer exactly — the safety buffer in the chunk budget absorbs the
//! approximation error — but it must be deterministic and cheap.

use std::str::FromStr;

/// Estimation scheme. Selected by name from configuration; unknown names
/// fall back to [`TokenScheme::Cl100k`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScheme {
    /// Word-piece approximation of cl100k-family tokenizers: CJK codepoints
    /// cost one token each, everything else ~4 bytes per token.
    Cl100k,
    /// Flat ~4 bytes per token, no script awareness.
    Bytes,
}

impl FromStr for TokenScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cl100k" | "cl100k_base" => Ok(Self::Cl100k),
            "bytes" => Ok(Self::Bytes),
            other => Err(format!("Unknown token scheme: {other}")),
        }
    }
}

/// Deterministic text→token-count estimator. Pure; no state beyond the
/// scheme choice.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    scheme: TokenScheme,
}

impl TokenEstimator {
    pub fn new(scheme: TokenScheme) -> Self {
        Self { scheme }
    }

    /// Resolve a scheme by configured name, falling back to the default
    /// for names this build does not know. The fallback is logged once
    /// here rather than surfaced as an error: a misspelled scheme name
    /// should not stop a run.
    pub fn from_scheme_name(name: &str) -> Self {
        match name.parse::<TokenScheme>() {
            Ok(scheme) => Self::new(scheme),
            Err(_) => {
                tracing::warn!(scheme = name, "Unknown token scheme, using cl100k");
                Self::new(TokenScheme::Cl100k)
            }
        }
    }

    pub fn scheme(&self) -> TokenScheme {
        self.scheme
    }

    /// Estimated token count of `text`. Empty text costs zero.
    pub fn count(&self, text: &str) -> usize {
        match self.scheme {
            TokenScheme::Bytes => text.len().div_ceil(4),
            TokenScheme::Cl100k => {
                let mut cjk = 0usize;
                let mut other_bytes = 0usize;
                for ch in text.chars() {
                    if is_cjk(ch) {
                        cjk += 1;
                    } else {
                        other_bytes += ch.len_utf8();
                    }
                }
                cjk + other_bytes.div_ceil(4)
            }
        }
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(TokenScheme::Cl100k)
    }
}

/// CJK ranges that cl100k-family tokenizers encode at roughly one token
/// per codepoint: unified ideographs, kana, hangul syllables.
fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4e00}'..='\u{9fff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{3040}'..='\u{30ff}'
        | '\u{ac00}'..='\u{d7af}'
    )
}
