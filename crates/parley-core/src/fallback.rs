//! Canned-reply backend used as a degraded control baseline.

use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use tracing::info;

use crate::error::{Error, Result};
use crate::responder::Responder;

#[derive(Debug, Clone)]
pub struct FallbackResponder {
    replies: Vec<String>,
}

impl FallbackResponder {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read canned reply file {path:?}: {e}"))
        })?;
        let responder = Self::from_replies(raw.lines())?;
        info!("Loaded {} canned replies from {:?}", responder.replies.len(), path);
        Ok(responder)
    }

    pub fn from_replies<I, S>(replies: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let replies: Vec<String> = replies
            .into_iter()
            .map(|line| line.as_ref().trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        if replies.is_empty() {
            return Err(Error::Config("Canned reply list is empty".to_string()));
        }

        Ok(Self { replies })
    }

    pub fn replies(&self) -> &[String] {
        &self.replies
    }
}

impl Responder for FallbackResponder {
    fn respond(&self, _user_input: &str, _history: &[String], _personas: &[String]) -> Result<String> {
        self.replies
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::Config("Canned reply list is empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_answers_from_the_list() {
        let responder =
            FallbackResponder::from_replies(["i am not sure.", "what do you mean?", "ok."]).unwrap();
        let history = vec!["hello".to_string()];
        for _ in 0..50 {
            let reply = responder.respond("how are you", &history, &[]).unwrap();
            assert!(responder.replies().contains(&reply));
        }
    }

    #[test]
    fn empty_list_is_rejected() {
        assert!(matches!(
            FallbackResponder::from_replies(Vec::<String>::new()),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            FallbackResponder::from_replies(["", "   "]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn load_reads_one_reply_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replies.txt");
        fs::write(&path, "lol\n\ni guess so\n").unwrap();
        let responder = FallbackResponder::load(&path).unwrap();
        assert_eq!(responder.replies(), ["lol", "i guess so"]);
    }
}
