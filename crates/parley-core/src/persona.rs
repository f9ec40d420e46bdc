//! Persona facts used to condition generated replies.
//!
//! Seeded draws build a local `StdRng` per call; a seed always maps to the
//! same personas.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use crate::error::{Error, Result};

/// Seeds above this value disable persona injection.
pub const PERSONA_SEED_THRESHOLD: i64 = 500;

/// Number of personas drawn for a seeded request.
pub const PERSONA_SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone)]
pub struct PersonaStore {
    entries: Vec<String>,
}

impl PersonaStore {
    /// Load personas from a text file, one per line.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read persona file {path:?}: {e}"))
        })?;
        let store = Self::from_entries(raw.lines())?;
        info!("Loaded {} personas from {:?}", store.len(), path);
        Ok(store)
    }

    /// Build a store from in-memory lines. Lines are trimmed and blank lines dropped.
    pub fn from_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: Vec<String> = entries
            .into_iter()
            .map(|line| line.as_ref().trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();

        if entries.is_empty() {
            return Err(Error::Config("Persona list is empty".to_string()));
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Draw the persona set for a request seed.
    ///
    /// Seeds above [`PERSONA_SEED_THRESHOLD`] yield no personas. Any other seed
    /// deterministically selects [`PERSONA_SAMPLE_SIZE`] distinct entries.
    pub fn sample(&self, seed: i64) -> Result<Vec<String>> {
        if seed > PERSONA_SEED_THRESHOLD {
            return Ok(Vec::new());
        }

        if self.entries.len() < PERSONA_SAMPLE_SIZE {
            return Err(Error::Config(format!(
                "Persona list has {} entries, at least {} are required",
                self.entries.len(),
                PERSONA_SAMPLE_SIZE
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed as u64);
        Ok(self
            .entries
            .choose_multiple(&mut rng, PERSONA_SAMPLE_SIZE)
            .cloned()
            .collect())
    }

    /// One uniformly random persona, independent of any request seed.
    pub fn pick_one(&self) -> Result<String> {
        self.entries
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| Error::Config("Persona list is empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn store(count: usize) -> PersonaStore {
        PersonaStore::from_entries((0..count).map(|i| format!("i like hobby number {i}."))).unwrap()
    }

    #[test]
    fn same_seed_same_personas() {
        let store = store(40);
        for seed in [-7, 0, 1, 42, 250, 500] {
            let first = store.sample(seed).unwrap();
            let second = store.sample(seed).unwrap();
            assert_eq!(first.len(), PERSONA_SAMPLE_SIZE);
            assert_eq!(first, second, "seed {seed} was not deterministic");
        }
    }

    #[test]
    fn seeds_above_threshold_disable_personas() {
        let store = store(40);
        for seed in [501, 750, 1000, i64::MAX] {
            assert!(store.sample(seed).unwrap().is_empty());
        }
    }

    #[test]
    fn sample_has_no_duplicates() {
        let store = store(6);
        for seed in 0..100 {
            let drawn = store.sample(seed).unwrap();
            let unique: HashSet<_> = drawn.iter().collect();
            assert_eq!(unique.len(), drawn.len());
        }
    }

    #[test]
    fn small_store_fails_only_when_drawing() {
        let store = store(4);
        assert!(matches!(store.sample(3), Err(Error::Config(_))));
        assert!(store.sample(900).unwrap().is_empty());
        assert!(store.pick_one().is_ok());
    }

    #[test]
    fn pick_one_returns_a_member() {
        let store = store(10);
        for _ in 0..50 {
            let topic = store.pick_one().unwrap();
            assert!(store.entries().contains(&topic));
        }
    }

    #[test]
    fn load_trims_and_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("personas.txt");
        fs::write(&path, "  i have a dog.  \n\ni love pizza.\r\n\n").unwrap();

        let store = PersonaStore::load(&path).unwrap();
        assert_eq!(store.entries(), ["i have a dog.", "i love pizza."]);
    }

    #[test]
    fn missing_or_empty_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PersonaStore::load(&dir.path().join("absent.txt")),
            Err(Error::Config(_))
        ));

        let path = dir.path().join("empty.txt");
        fs::write(&path, "\n \n").unwrap();
        assert!(matches!(PersonaStore::load(&path), Err(Error::Config(_))));
    }
}
