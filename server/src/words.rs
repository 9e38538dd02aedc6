//! Word generation collaborators.
//!
//! The game worker asks one of two providers for the round's words: the
//! dictionary for regular and hidden styles, the arithmetic generator for the
//! calculus style. Both return at most `count` items with unique labels; a
//! provider that runs short returns what it has and the round adjusts its
//! termination target accordingly.

use log::warn;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{Difficulty, Language, Word, WordStyle};
use std::collections::HashSet;

/// Produces typed-word rounds from a dictionary.
pub trait DictionaryProvider: Send + Sync {
    /// Returns up to `count` words with unique labels. For the hidden style
    /// the display form is masked; labels are always the typed form.
    fn generate(
        &self,
        language: Language,
        count: u32,
        style: WordStyle,
        difficulty: Difficulty,
    ) -> Vec<Word>;
}

/// Produces calculus rounds: the display is an arithmetic expression, the
/// label its numeric answer.
pub trait CalculusProvider: Send + Sync {
    fn generate(&self, count: u32, difficulty: Difficulty) -> Vec<Word>;
}

/// Masks a word for the hidden style: first letter kept, the rest replaced
/// by underscores.
pub fn mask_display(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            let mut masked = String::with_capacity(word.len());
            masked.push(first);
            for _ in chars {
                masked.push('_');
            }
            masked
        }
        None => String::new(),
    }
}

const EN_WORDS: &[&str] = &[
    "cat", "dog", "sun", "sky", "cup", "map", "box", "key", "pen", "ice",
    "tree", "fish", "bird", "door", "milk", "rain", "snow", "wind", "fire", "moon",
    "house", "river", "table", "chair", "bread", "clock", "cloud", "grass", "stone", "plant",
    "garden", "window", "bottle", "letter", "forest", "rocket", "silver", "summer", "winter", "bridge",
    "morning", "evening", "teacher", "kitchen", "picture", "journey", "station", "freedom", "mystery", "harvest",
    "mountain", "elephant", "keyboard", "notebook", "sunshine", "daughter", "umbrella", "treasure", "festival", "hospital",
    "adventure", "chocolate", "lighthouse", "friendship", "strawberry", "helicopter", "dictionary", "watermelon", "countryside", "temperature",
];

const FR_WORDS: &[&str] = &[
    "chat", "pain", "vent", "roi", "mur", "lac", "bol", "sac", "lit", "nez",
    "chien", "pomme", "table", "livre", "fleur", "train", "plage", "neige", "pluie", "champ",
    "maison", "jardin", "soleil", "oiseau", "cheval", "fenetre", "hiver", "nuage", "pierre", "bateau",
    "montagne", "cuisine", "bouteille", "tableau", "voiture", "chanson", "village", "fromage", "journee", "lumiere",
    "papillon", "escalier", "horizon", "aventure", "chocolat", "tempete", "campagne", "histoire", "peinture", "courage",
    "bibliotheque", "anniversaire", "atmosphere", "temperature", "dictionnaire", "promenade", "decouverte", "grenouille", "parapluie", "merveille",
];

/// Built-in dictionaries for the supported languages. Difficulty selects a
/// word-length band: easy up to 5 letters, normal 5 to 8, hard 8 and up.
pub struct BuiltinDictionary;

impl BuiltinDictionary {
    fn pool(language: Language, difficulty: Difficulty) -> Vec<&'static str> {
        let list = match language {
            Language::En => EN_WORDS,
            Language::Fr => FR_WORDS,
        };
        list.iter()
            .copied()
            .filter(|w| {
                let len = w.chars().count();
                match difficulty {
                    Difficulty::Easy => len <= 5,
                    Difficulty::Normal => (5..=8).contains(&len),
                    Difficulty::Hard => len >= 8,
                }
            })
            .collect()
    }
}

impl DictionaryProvider for BuiltinDictionary {
    fn generate(
        &self,
        language: Language,
        count: u32,
        style: WordStyle,
        difficulty: Difficulty,
    ) -> Vec<Word> {
        let mut pool = Self::pool(language, difficulty);
        let mut rng = rand::rng();
        pool.shuffle(&mut rng);

        if pool.len() < count as usize {
            warn!(
                "Dictionary short: {} {} {} has {} words, {} requested",
                language,
                difficulty,
                style,
                pool.len(),
                count
            );
        }

        pool.into_iter()
            .take(count as usize)
            .map(|label| {
                let display = match style {
                    WordStyle::Hidden => mask_display(label),
                    _ => label.to_string(),
                };
                Word::new(label, display)
            })
            .collect()
    }
}

/// Random arithmetic expressions with answer-unique labels. Two expressions
/// sharing an answer would collapse into one claimable label, so answers are
/// deduplicated and regenerated.
pub struct ArithmeticGenerator;

impl ArithmeticGenerator {
    fn expression(rng: &mut impl Rng, difficulty: Difficulty) -> (String, i64) {
        match difficulty {
            Difficulty::Easy => {
                let a = rng.random_range(1..=10);
                let b = rng.random_range(1..=10);
                (format!("{} + {}", a, b), a + b)
            }
            Difficulty::Normal => {
                let a = rng.random_range(1..=50);
                let b = rng.random_range(1..=50);
                if rng.random_bool(0.5) {
                    (format!("{} + {}", a, b), a + b)
                } else {
                    let (hi, lo) = (a.max(b), a.min(b));
                    (format!("{} - {}", hi, lo), hi - lo)
                }
            }
            Difficulty::Hard => match rng.random_range(0..3) {
                0 => {
                    let a = rng.random_range(10..=99);
                    let b = rng.random_range(10..=99);
                    (format!("{} + {}", a, b), a + b)
                }
                1 => {
                    let a = rng.random_range(10..=99);
                    let b = rng.random_range(10..=99);
                    let (hi, lo) = (a.max(b), a.min(b));
                    (format!("{} - {}", hi, lo), hi - lo)
                }
                _ => {
                    let a = rng.random_range(2..=12);
                    let b = rng.random_range(2..=12);
                    (format!("{} x {}", a, b), a * b)
                }
            },
        }
    }
}

impl CalculusProvider for ArithmeticGenerator {
    fn generate(&self, count: u32, difficulty: Difficulty) -> Vec<Word> {
        let mut rng = rand::rng();
        let mut seen = HashSet::new();
        let mut words = Vec::with_capacity(count as usize);

        // The answer space is finite (easy mode has 19 distinct sums), so
        // give up after a bounded number of draws and degrade.
        let max_attempts = count as usize * 50 + 100;
        let mut attempts = 0;

        while words.len() < count as usize && attempts < max_attempts {
            attempts += 1;
            let (display, answer) = Self::expression(&mut rng, difficulty);
            if seen.insert(answer) {
                words.push(Word::new(answer.to_string(), display));
            }
        }

        if words.len() < count as usize {
            warn!(
                "Calculus generator short: produced {} of {} requested at {}",
                words.len(),
                count,
                difficulty
            );
        }

        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_mask_display() {
        assert_eq!(mask_display("cat"), "c__");
        assert_eq!(mask_display("a"), "a");
        assert_eq!(mask_display(""), "");
    }

    #[test]
    fn test_dictionary_labels_unique_and_counted() {
        let words = BuiltinDictionary.generate(
            Language::En,
            10,
            WordStyle::Regular,
            Difficulty::Easy,
        );
        assert_eq!(words.len(), 10);

        let labels: HashSet<&str> = words.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels.len(), 10);
        for word in &words {
            assert_eq!(word.label, word.display);
            assert!(word.claimed_by.is_empty());
        }
    }

    #[test]
    fn test_dictionary_difficulty_bands() {
        for (difficulty, check) in [
            (Difficulty::Easy, (3usize, 5usize)),
            (Difficulty::Normal, (5, 8)),
            (Difficulty::Hard, (8, usize::MAX)),
        ] {
            let words =
                BuiltinDictionary.generate(Language::Fr, 8, WordStyle::Regular, difficulty);
            assert!(!words.is_empty());
            for word in &words {
                let len = word.label.chars().count();
                assert!(len >= check.0 && len <= check.1, "{} at {}", word.label, difficulty);
            }
        }
    }

    #[test]
    fn test_dictionary_hidden_masks_display() {
        let words = BuiltinDictionary.generate(
            Language::En,
            5,
            WordStyle::Hidden,
            Difficulty::Normal,
        );
        for word in &words {
            assert_ne!(word.label, word.display);
            assert_eq!(word.display.chars().count(), word.label.chars().count());
            assert!(word.display.chars().skip(1).all(|c| c == '_'));
        }
    }

    #[test]
    fn test_dictionary_degrades_when_short() {
        // Far more words than any band holds: returns the full band, not an
        // error and not duplicates.
        let words = BuiltinDictionary.generate(
            Language::En,
            500,
            WordStyle::Regular,
            Difficulty::Easy,
        );
        assert!(!words.is_empty());
        assert!(words.len() < 500);
        let labels: HashSet<&str> = words.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels.len(), words.len());
    }

    #[test]
    fn test_calculus_answers_unique_and_consistent() {
        let words = ArithmeticGenerator.generate(10, Difficulty::Normal);
        assert_eq!(words.len(), 10);

        let labels: HashSet<&str> = words.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels.len(), 10);

        for word in &words {
            let answer: i64 = word.label.parse().unwrap();
            assert!(answer >= 0);
            let value = eval(&word.display);
            assert_eq!(value, answer, "display {} != label {}", word.display, word.label);
        }
    }

    #[test]
    fn test_calculus_easy_degrades_on_small_answer_space() {
        // Easy sums range over 2..=20: only 19 distinct answers exist.
        let words = ArithmeticGenerator.generate(50, Difficulty::Easy);
        assert!(words.len() <= 19);
        assert!(words.len() >= 10);
    }

    fn eval(display: &str) -> i64 {
        let parts: Vec<&str> = display.split_whitespace().collect();
        let a: i64 = parts[0].parse().unwrap();
        let b: i64 = parts[2].parse().unwrap();
        match parts[1] {
            "+" => a + b,
            "-" => a - b,
            "x" => a * b,
            op => panic!("unexpected operator {}", op),
        }
    }
}
