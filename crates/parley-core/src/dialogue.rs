//! Request-side dialogue types and input normalization.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Characters that carry markup meaning in the front end and never reach a model.
const STRIPPED_SYMBOLS: [char; 4] = ['#', '^', '@', '|'];

/// Delimiter between turns in the `history` request parameter.
pub const HISTORY_DELIMITER: &str = "###";

/// Leading characters dropped from every history segment (speaker tag).
pub const HISTORY_PREFIX_LEN: usize = 3;

/// Seed used when the request does not carry one.
pub const DEFAULT_SEED: i64 = 1;

/// Replace markup symbols with spaces, trim, and collapse whitespace runs.
pub fn clean_text(text: &str) -> String {
    text.replace(STRIPPED_SYMBOLS, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a `###`-delimited history string into turns, oldest first.
///
/// Each segment loses its first [`HISTORY_PREFIX_LEN`] characters. Segments
/// that end up empty, including ones shorter than the prefix, are dropped.
pub fn parse_history(history: &str) -> Vec<String> {
    history
        .trim()
        .split(HISTORY_DELIMITER)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .chars()
                .skip(HISTORY_PREFIX_LEN)
                .collect::<String>()
                .trim()
                .to_string()
        })
        .filter(|turn| !turn.is_empty())
        .collect()
}

/// Parse the optional `seed` request parameter.
pub fn parse_seed(raw: Option<&str>) -> Result<i64> {
    match raw {
        None => Ok(DEFAULT_SEED),
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::Validation("Invalid seed".to_string())),
    }
}

/// One conversational turn routed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRequest {
    pub model: String,
    pub user_input: String,
    pub history: Vec<String>,
    pub personas: Vec<String>,
}

impl InteractionRequest {
    /// Validate and normalize raw request fields. Persona sampling is left to
    /// the caller since it depends on the loaded store.
    pub fn from_raw(model: &str, text: &str, history: &str) -> Result<Self> {
        let user_input = clean_text(text);
        if user_input.is_empty() {
            return Err(Error::Validation("Invalid user input".to_string()));
        }

        Ok(Self {
            model: model.to_string(),
            user_input,
            history: parse_history(history),
            personas: Vec::new(),
        })
    }

    pub fn with_personas(mut self, personas: Vec<String>) -> Self {
        self.personas = personas;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionResponse {
    pub user_input: String,
    pub response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_symbols_and_collapses_whitespace() {
        assert_eq!(clean_text("  hi#there^ you@me|  ok  "), "hi there you me ok");
        assert_eq!(clean_text("tab\tand\nnewline"), "tab and newline");
        assert_eq!(clean_text("#^@|"), "");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn clean_text_is_idempotent() {
        for input in ["a##b", "  x  y ", "@@@", "plain", "a | b ^ c", "ünï  cødé"] {
            let once = clean_text(input);
            assert_eq!(clean_text(&once), once);
            assert!(!once.contains(STRIPPED_SYMBOLS));
            assert!(!once.contains("  "));
            assert_eq!(once.trim(), once);
        }
    }

    #[test]
    fn history_segments_lose_their_prefix() {
        assert_eq!(parse_history("abcHello###abcWorld"), ["Hello", "World"]);
        assert_eq!(parse_history("###A: hi there###B: hello###"), ["hi there", "hello"]);
    }

    #[test]
    fn history_defaults_to_empty() {
        assert!(parse_history("").is_empty());
        assert!(parse_history("   ").is_empty());
        assert!(parse_history("######").is_empty());
    }

    #[test]
    fn short_history_segments_are_dropped() {
        assert_eq!(parse_history("ab###xyzkept###c"), ["kept"]);
        assert_eq!(parse_history("A: ###B: yes"), ["yes"]);
    }

    #[test]
    fn history_prefix_counts_characters_not_bytes() {
        assert_eq!(parse_history("ééé bonjour"), ["bonjour"]);
    }

    #[test]
    fn seed_parsing() {
        assert_eq!(parse_seed(None).unwrap(), 1);
        assert_eq!(parse_seed(Some(" 42 ")).unwrap(), 42);
        assert_eq!(parse_seed(Some("-3")).unwrap(), -3);
        assert!(matches!(parse_seed(Some("abc")), Err(Error::Validation(_))));
        assert!(matches!(parse_seed(Some("")), Err(Error::Validation(_))));
    }

    #[test]
    fn request_rejects_empty_text() {
        let err = InteractionRequest::from_raw("qc", " #|^@ ", "").unwrap_err();
        assert_eq!(err.to_string(), "Invalid user input");

        let request = InteractionRequest::from_raw("bart", "hi  there", "A: yo").unwrap();
        assert_eq!(request.user_input, "hi there");
        assert_eq!(request.history, ["yo"]);
        assert!(request.personas.is_empty());
    }
}
