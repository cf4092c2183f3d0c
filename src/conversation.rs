//! Conversation state
//!
//! Semantic memory of an interview: the turns so far, the questions already
//! asked (normalised) and the topics covered. Used to avoid repeating a
//! question and as prompt context for the next one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::persistence::{conversation_key, SharedStore};
use crate::text::{jaccard, normalize};

/// Jaccard similarity at or above which two questions count as the same
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Conversation error types
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Invalid conversation state: {0}")]
    InvalidState(#[from] serde_json::Error),

    #[error("Conversation state belongs to session {found}, expected {expected}")]
    SessionMismatch { expected: String, found: String },
}

/// One question/answer exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question_number: u32,
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Serialised form; the derived sets are stored as arrays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
    #[serde(default)]
    pub asked_questions: Vec<String>,
    #[serde(default)]
    pub covered_topics: Vec<String>,
}

pub struct ConversationStateManager {
    session_id: String,
    turns: Vec<ConversationTurn>,
    asked_questions: HashSet<String>,
    covered_topics: HashSet<String>,
    store: Option<SharedStore>,
    destroyed: bool,
}

impl ConversationStateManager {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            turns: Vec::new(),
            asked_questions: HashSet::new(),
            covered_topics: HashSet::new(),
            store: None,
            destroyed: false,
        }
    }

    /// Persists every new turn to `store`
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Records a completed turn; ignored after `destroy`
    pub fn add_turn(&mut self, question: &str, answer: &str, topics: &[String]) {
        if self.destroyed {
            return;
        }
        let turn = ConversationTurn {
            question_number: self.turns.len() as u32 + 1,
            question: question.to_string(),
            answer: answer.to_string(),
            timestamp: Utc::now(),
            topics: topics.to_vec(),
        };
        self.asked_questions.insert(normalize(question));
        for topic in topics {
            self.covered_topics.insert(topic.to_lowercase());
        }
        self.turns.push(turn);
        self.save();
    }

    /// Exact normalised match, or Jaccard similarity >= `threshold`
    pub fn has_asked_similar_question(&self, question: &str, threshold: f64) -> bool {
        let candidate = normalize(question);
        if self.asked_questions.contains(&candidate) {
            return true;
        }
        self.asked_questions
            .iter()
            .any(|asked| jaccard(&candidate, asked) >= threshold)
    }

    pub fn has_discussed_topic(&self, topic: &str) -> bool {
        self.covered_topics.contains(&topic.to_lowercase())
    }

    /// Last `n` non-empty answers, oldest first
    pub fn get_recent_answers(&self, n: usize) -> Vec<String> {
        Self::last_non_empty(self.turns.iter().map(|t| t.answer.as_str()), n)
    }

    /// Last `n` non-empty questions, oldest first
    pub fn get_recent_questions(&self, n: usize) -> Vec<String> {
        Self::last_non_empty(self.turns.iter().map(|t| t.question.as_str()), n)
    }

    /// Renders all turns as `Qk: ...` / `Ak: ...` blocks separated by blank lines
    pub fn get_conversation_history(&self) -> String {
        self.turns
            .iter()
            .enumerate()
            .map(|(i, t)| format!("Q{}: {}\nA{}: {}", i + 1, t.question, i + 1, t.answer))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Covered topics in sorted order
    pub fn covered_topics(&self) -> Vec<String> {
        self.covered_topics
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn export_state(&self) -> String {
        // Sorted so that exports of equal states compare equal
        let mut asked_questions: Vec<String> = self.asked_questions.iter().cloned().collect();
        asked_questions.sort();
        let snapshot = ConversationSnapshot {
            session_id: self.session_id.clone(),
            turns: self.turns.clone(),
            asked_questions,
            covered_topics: self.covered_topics(),
        };
        serde_json::to_string(&snapshot).unwrap_or_else(|e| {
            tracing::error!("Failed to serialise conversation state: {}", e);
            String::from("{}")
        })
    }

    /// Replaces the current state with an exported one
    ///
    /// The derived sets are rebuilt from the turns as well as read from the
    /// snapshot, so older exports without them still import correctly.
    pub fn import_state(&mut self, json: &str) -> Result<(), ConversationError> {
        if self.destroyed {
            return Ok(());
        }
        let snapshot: ConversationSnapshot = serde_json::from_str(json)?;
        if snapshot.session_id != self.session_id {
            return Err(ConversationError::SessionMismatch {
                expected: self.session_id.clone(),
                found: snapshot.session_id,
            });
        }

        let mut asked: HashSet<String> = snapshot.asked_questions.into_iter().collect();
        let mut topics: HashSet<String> = snapshot
            .covered_topics
            .into_iter()
            .map(|t| t.to_lowercase())
            .collect();
        for turn in &snapshot.turns {
            asked.insert(normalize(&turn.question));
            topics.extend(turn.topics.iter().map(|t| t.to_lowercase()));
        }

        self.turns = snapshot.turns;
        self.asked_questions = asked;
        self.covered_topics = topics;
        tracing::debug!(
            "Imported conversation state for session {} ({} turns)",
            self.session_id,
            self.turns.len()
        );
        Ok(())
    }

    /// Clears all turns; the session id is kept
    pub fn reset(&mut self) {
        if self.destroyed {
            return;
        }
        self.turns.clear();
        self.asked_questions.clear();
        self.covered_topics.clear();
        self.save();
    }

    /// Writes the state to the attached store, if any
    pub fn save(&self) {
        if self.destroyed {
            return;
        }
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(&conversation_key(&self.session_id), &self.export_state()) {
            tracing::warn!(
                "Failed to persist conversation for session {}: {}",
                self.session_id,
                e
            );
        }
    }

    /// Restores state from the attached store; returns whether anything was loaded
    pub fn load(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        let Some(store) = self.store.clone() else {
            return false;
        };
        match store.load(&conversation_key(&self.session_id)) {
            Ok(Some(blob)) => match self.import_state(&blob) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Discarding stored conversation state: {}", e);
                    false
                }
            },
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(
                    "Failed to load conversation for session {}: {}",
                    self.session_id,
                    e
                );
                false
            }
        }
    }

    /// Flushes state one last time; safe to call repeatedly
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.save();
        self.destroyed = true;
    }

    fn last_non_empty<'a>(items: impl DoubleEndedIterator<Item = &'a str>, n: usize) -> Vec<String> {
        let mut recent: Vec<String> = items
            .rev()
            .filter(|s| !s.trim().is_empty())
            .take(n)
            .map(str::to_string)
            .collect();
        recent.reverse();
        recent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryStore, SessionStore};
    use std::sync::Arc;

    fn topics(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_duplicate_detected() {
        let mut state = ConversationStateManager::new("s");
        state.add_turn("Tell me about yourself.", "I am...", &[]);
        assert!(state.has_asked_similar_question(
            "tell me about YOURSELF",
            DEFAULT_SIMILARITY_THRESHOLD
        ));
    }

    #[test]
    fn test_similarity_matches_jaccard() {
        let a = "what motivates you at work every day";
        let b = "what motivates you at work";
        let similarity = jaccard(&normalize(a), &normalize(b));

        for threshold in [0.5, similarity, 0.9] {
            let mut state = ConversationStateManager::new("s");
            state.add_turn(b, "answer", &[]);
            assert_eq!(
                state.has_asked_similar_question(a, threshold),
                similarity >= threshold
            );
        }
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = "describe a difficult project you led";
        let b = "describe a project you led that was difficult";
        for threshold in [0.5, 0.8, 1.0] {
            let mut forward = ConversationStateManager::new("s");
            forward.add_turn(b, "", &[]);
            let mut backward = ConversationStateManager::new("s");
            backward.add_turn(a, "", &[]);
            assert_eq!(
                forward.has_asked_similar_question(a, threshold),
                backward.has_asked_similar_question(b, threshold)
            );
        }
    }

    #[test]
    fn test_dissimilar_question_not_flagged() {
        let mut state = ConversationStateManager::new("s");
        state.add_turn("What is your greatest strength?", "Focus", &[]);
        assert!(!state.has_asked_similar_question(
            "Where do you see yourself in five years?",
            DEFAULT_SIMILARITY_THRESHOLD
        ));
    }

    #[test]
    fn test_topics_case_insensitive() {
        let mut state = ConversationStateManager::new("s");
        state.add_turn("Q", "A", &topics(&["Leadership", "rust"]));
        assert!(state.has_discussed_topic("leadership"));
        assert!(state.has_discussed_topic("RUST"));
        assert!(!state.has_discussed_topic("python"));
        assert_eq!(state.covered_topics(), vec!["leadership", "rust"]);
    }

    #[test]
    fn test_recent_slices_skip_empty() {
        let mut state = ConversationStateManager::new("s");
        state.add_turn("Q1", "A1", &[]);
        state.add_turn("Q2", "", &[]);
        state.add_turn("Q3", "A3", &[]);

        assert_eq!(state.get_recent_answers(2), vec!["A1", "A3"]);
        assert_eq!(state.get_recent_questions(2), vec!["Q2", "Q3"]);
        assert_eq!(state.get_recent_questions(10).len(), 3);
    }

    #[test]
    fn test_conversation_history_format() {
        let mut state = ConversationStateManager::new("s");
        state.add_turn("First?", "One", &[]);
        state.add_turn("Second?", "Two", &[]);
        assert_eq!(
            state.get_conversation_history(),
            "Q1: First?\nA1: One\n\nQ2: Second?\nA2: Two"
        );
    }

    #[test]
    fn test_empty_history() {
        let state = ConversationStateManager::new("s");
        assert_eq!(state.get_conversation_history(), "");
    }

    #[test]
    fn test_export_import_preserves_sets() {
        let mut state = ConversationStateManager::new("s");
        state.add_turn("What drives you?", "Curiosity", &topics(&["Motivation"]));

        let mut restored = ConversationStateManager::new("s");
        restored.import_state(&state.export_state()).unwrap();
        assert_eq!(restored.turns(), state.turns());
        assert!(restored.has_asked_similar_question("what drives you", 1.0));
        assert!(restored.has_discussed_topic("motivation"));
        assert_eq!(restored.export_state(), state.export_state());
    }

    #[test]
    fn test_import_rejects_invalid_json() {
        let mut state = ConversationStateManager::new("s");
        assert!(matches!(
            state.import_state("{not json"),
            Err(ConversationError::InvalidState(_))
        ));
    }

    #[test]
    fn test_import_rejects_other_session() {
        let other = ConversationStateManager::new("other");
        let mut state = ConversationStateManager::new("s");
        assert!(matches!(
            state.import_state(&other.export_state()),
            Err(ConversationError::SessionMismatch { .. })
        ));
    }

    #[test]
    fn test_reset_keeps_session_id() {
        let mut state = ConversationStateManager::new("keep-me");
        state.add_turn("Q", "A", &topics(&["x"]));
        state.reset();
        assert_eq!(state.turn_count(), 0);
        assert!(state.covered_topics().is_empty());
        assert!(!state.has_asked_similar_question("Q", DEFAULT_SIMILARITY_THRESHOLD));
        assert_eq!(state.session_id(), "keep-me");
    }

    #[test]
    fn test_persists_through_store() {
        let store = Arc::new(MemoryStore::new());
        let mut state = ConversationStateManager::new("s").with_store(store.clone());
        state.add_turn("Q1", "A1", &[]);
        assert!(store.load("conversation:s").unwrap().is_some());

        let mut reloaded = ConversationStateManager::new("s").with_store(store);
        assert!(reloaded.load());
        assert_eq!(reloaded.turn_count(), 1);
    }

    #[test]
    fn test_destroy_twice() {
        let mut state = ConversationStateManager::new("s");
        state.destroy();
        state.destroy();
    }

    #[test]
    fn test_mutations_ignored_after_destroy() {
        let store = Arc::new(MemoryStore::new());
        let mut state = ConversationStateManager::new("s").with_store(store.clone());
        state.add_turn("Q1", "A1", &["rust".to_string()]);
        let exported = state.export_state();
        state.destroy();

        state.add_turn("Q2", "A2", &[]);
        state.reset();
        assert!(!state.load());
        assert_eq!(state.turn_count(), 1);
        assert!(state.has_discussed_topic("rust"));
        assert_eq!(store.load("conversation:s").unwrap().as_deref(), Some(exported.as_str()));
    }
}
