//! Best-effort top-score recording.
//!
//! The game worker pushes round scores here at the end of every round. The
//! sink contract is write-only and must never propagate a failure into the
//! game worker; callers log and move on.

use log::debug;
use parking_lot::Mutex;
use shared::{Difficulty, Language, Score, WordStyle};
use std::collections::HashMap;

/// Number of entries retained per table key.
const TABLE_SIZE: usize = 10;

/// Write-only sink for end-of-round scores.
pub trait TopScoreSink: Send + Sync {
    /// Records one round's scores. Best-effort: an `Err` is logged by the
    /// caller and otherwise ignored.
    fn record(
        &self,
        style: WordStyle,
        language: Language,
        difficulty: Difficulty,
        round_scores: &[Score],
        effective_words_count: u32,
    ) -> Result<(), String>;
}

/// In-memory top-score table keeping the best [`TABLE_SIZE`] round scores per
/// (style, language, difficulty) key, ranked like round scores.
pub struct MemoryTopScores {
    tables: Mutex<HashMap<(WordStyle, Language, Difficulty), Vec<Score>>>,
}

impl MemoryTopScores {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Current table for a key, best first.
    pub fn top(
        &self,
        style: WordStyle,
        language: Language,
        difficulty: Difficulty,
    ) -> Vec<Score> {
        self.tables
            .lock()
            .get(&(style, language, difficulty))
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MemoryTopScores {
    fn default() -> Self {
        Self::new()
    }
}

impl TopScoreSink for MemoryTopScores {
    fn record(
        &self,
        style: WordStyle,
        language: Language,
        difficulty: Difficulty,
        round_scores: &[Score],
        effective_words_count: u32,
    ) -> Result<(), String> {
        let mut tables = self.tables.lock();
        let table = tables.entry((style, language, difficulty)).or_default();

        for score in round_scores {
            if score.points == 0 {
                continue;
            }
            table.push(score.clone());
        }

        table.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.speed.total_cmp(&a.speed))
        });
        table.truncate(TABLE_SIZE);

        debug!(
            "Recorded round scores for {}/{}/{} ({} words)",
            style, language, difficulty, effective_words_count
        );
        Ok(())
    }
}
