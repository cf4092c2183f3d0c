//! Question queue management
//!
//! Ordered, persisted record of the questions asked in one interview
//! session. Questions are append-only and numbered from 1. The in-memory
//! queue is authoritative for the running process: every mutation is written
//! through to the session store, and a failed write is logged, not returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::{queue_key, SharedStore};
use crate::text::normalize;

/// One interview question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    /// 1-based position in the queue
    pub number: u32,
    pub question: String,
    pub timestamp: DateTime<Utc>,
    pub asked: bool,
    pub answered: bool,
    pub skipped: bool,
    pub answer: Option<String>,
}

impl Question {
    /// Asked and neither answered nor skipped yet
    pub fn is_pending(&self) -> bool {
        self.asked && !self.answered && !self.skipped
    }

    /// Answered or skipped
    pub fn is_resolved(&self) -> bool {
        self.answered || self.skipped
    }
}

/// Persisted form of the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub session_id: String,
    pub questions: Vec<Question>,
    /// Signed so that a corrupted negative index survives loading and can be repaired
    pub current_index: i64,
    pub total_questions: u32,
    #[serde(default)]
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of `validate_state`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueValidation {
    /// The current index was out of range and has been clamped
    pub index_repaired: bool,
    /// Pairs of question numbers whose normalised text is identical
    pub duplicates: Vec<(u32, u32)>,
}

impl QueueValidation {
    pub fn is_clean(&self) -> bool {
        !self.index_repaired && self.duplicates.is_empty()
    }
}

/// Progress summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueProgress {
    pub asked: usize,
    pub answered: usize,
    pub skipped: usize,
    pub total: u32,
    pub percent_complete: f64,
}

pub struct QuestionQueueManager {
    session_id: String,
    total_questions: u32,
    store: SharedStore,
    questions: Vec<Question>,
    current_index: usize,
    completed: bool,
    destroyed: bool,
}

impl QuestionQueueManager {
    pub fn new(session_id: impl Into<String>, total_questions: u32, store: SharedStore) -> Self {
        Self {
            session_id: session_id.into(),
            total_questions,
            store,
            questions: Vec::new(),
            current_index: 0,
            completed: false,
            destroyed: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Loads the persisted queue for this session
    ///
    /// A missing, unreadable or corrupt snapshot leaves an empty queue. The
    /// loaded state is validated and any repair is reported.
    pub fn initialize(&mut self) -> QueueValidation {
        let key = queue_key(&self.session_id);
        let mut negative_index = false;

        match self.store.load(&key) {
            Ok(Some(blob)) => match serde_json::from_str::<QueueSnapshot>(&blob) {
                Ok(snapshot) => {
                    negative_index = snapshot.current_index < 0;
                    self.current_index = snapshot.current_index.max(0) as usize;
                    self.questions = snapshot.questions;
                    self.completed = snapshot.completed;
                    tracing::info!(
                        "Loaded question queue for session {} ({} questions)",
                        self.session_id,
                        self.questions.len()
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Discarding corrupt queue state for session {}: {}",
                        self.session_id,
                        e
                    );
                    self.clear();
                }
            },
            Ok(None) => {
                tracing::debug!("No stored queue for session {}", self.session_id);
                self.clear();
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to load queue for session {}, starting empty: {}",
                    self.session_id,
                    e
                );
                self.clear();
            }
        }

        let mut validation = self.validate_state();
        if negative_index {
            tracing::warn!("Repaired negative queue index for session {}", self.session_id);
            validation.index_repaired = true;
            self.persist();
        }
        validation
    }

    /// Appends a question with the next sequential number
    ///
    /// Returns `None` once the queue has been destroyed.
    pub fn add_question(&mut self, text: &str) -> Option<Question> {
        if self.destroyed {
            return None;
        }
        let question = Question {
            id: uuid::Uuid::new_v4().to_string(),
            number: self.questions.len() as u32 + 1,
            question: text.to_string(),
            timestamp: Utc::now(),
            asked: false,
            answered: false,
            skipped: false,
            answer: None,
        };
        tracing::debug!("Added question {}: {}", question.number, question.question);
        self.questions.push(question.clone());
        self.persist();
        Some(question)
    }

    /// Marks a question as asked; unknown numbers are ignored
    ///
    /// Any other question still pending is marked skipped, so at most one
    /// question is ever awaiting an answer.
    pub fn mark_as_asked(&mut self, number: u32) {
        if self.destroyed {
            return;
        }
        if !self.questions.iter().any(|q| q.number == number) {
            tracing::debug!("mark_as_asked: no question {}", number);
            return;
        }

        for q in self.questions.iter_mut() {
            if q.number != number && q.is_pending() {
                tracing::warn!(
                    "Question {} was never answered, marking skipped",
                    q.number
                );
                q.skipped = true;
            }
        }
        if let Some(q) = self.find_mut(number) {
            q.asked = true;
        }
        self.persist();
    }

    /// Records the answer to a question; unknown numbers are ignored
    pub fn mark_as_answered(&mut self, number: u32, answer: &str) {
        if self.destroyed {
            return;
        }
        let Some(q) = self.find_mut(number) else {
            tracing::debug!("mark_as_answered: no question {}", number);
            return;
        };
        q.answered = true;
        q.answer = Some(answer.to_string());
        self.persist();
    }

    pub fn get_current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    pub fn has_next_question(&self) -> bool {
        let next = self.current_index + 1;
        next < self.total_questions as usize && next < self.questions.len()
    }

    /// Advances to the next question, or marks the queue complete
    pub fn move_to_next(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        let advanced = if self.has_next_question() {
            self.current_index += 1;
            true
        } else {
            tracing::info!("Question queue complete for session {}", self.session_id);
            self.completed = true;
            false
        };
        self.persist();
        advanced
    }

    pub fn can_advance(&self) -> bool {
        self.get_current_question().is_some_and(Question::is_resolved) && self.has_next_question()
    }

    /// Marks the current question skipped without an answer
    pub fn skip_current(&mut self) {
        if self.destroyed {
            return;
        }
        let Some(q) = self.questions.get_mut(self.current_index) else {
            return;
        };
        if q.answered {
            return;
        }
        q.skipped = true;
        tracing::debug!("Skipped question {}", q.number);
        self.persist();
    }

    /// Whether a question with the same normalised text is already queued
    pub fn is_question_already_asked(&self, text: &str) -> bool {
        let wanted = normalize(text);
        self.questions.iter().any(|q| normalize(&q.question) == wanted)
    }

    /// Clamps an out-of-range index and reports duplicate questions
    pub fn validate_state(&mut self) -> QueueValidation {
        let mut validation = QueueValidation::default();

        let max_index = self.questions.len().saturating_sub(1);
        if self.current_index > max_index {
            tracing::warn!(
                "Queue index {} out of range for {} questions, clamping",
                self.current_index,
                self.questions.len()
            );
            self.current_index = max_index;
            validation.index_repaired = true;
        }

        let normalized: Vec<String> = self.questions.iter().map(|q| normalize(&q.question)).collect();
        for (i, a) in normalized.iter().enumerate() {
            for (j, b) in normalized.iter().enumerate().skip(i + 1) {
                if a == b {
                    validation
                        .duplicates
                        .push((self.questions[i].number, self.questions[j].number));
                }
            }
        }
        if !validation.duplicates.is_empty() {
            tracing::warn!(
                "Duplicate questions in session {}: {:?}",
                self.session_id,
                validation.duplicates
            );
        }

        if validation.index_repaired {
            self.persist();
        }
        validation
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    pub fn progress(&self) -> QueueProgress {
        let asked = self.questions.iter().filter(|q| q.asked).count();
        let answered = self.questions.iter().filter(|q| q.answered).count();
        let skipped = self.questions.iter().filter(|q| q.skipped).count();
        let percent_complete = if self.total_questions == 0 {
            100.0
        } else {
            ((answered + skipped) as f64 / self.total_questions as f64 * 100.0).min(100.0)
        };
        QueueProgress {
            asked,
            answered,
            skipped,
            total: self.total_questions,
            percent_complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        if self.completed {
            return true;
        }
        let resolved = self.questions.iter().filter(|q| q.is_resolved()).count();
        resolved >= self.total_questions as usize
    }

    /// Clears all questions and persists the empty queue
    pub fn reset(&mut self) {
        if self.destroyed {
            return;
        }
        self.clear();
        tracing::info!("Question queue reset for session {}", self.session_id);
        self.persist();
    }

    /// Flushes state one last time; safe to call repeatedly
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.persist();
        self.destroyed = true;
    }

    fn clear(&mut self) {
        self.questions.clear();
        self.current_index = 0;
        self.completed = false;
    }

    fn find_mut(&mut self, number: u32) -> Option<&mut Question> {
        self.questions.iter_mut().find(|q| q.number == number)
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            session_id: self.session_id.clone(),
            questions: self.questions.clone(),
            current_index: self.current_index as i64,
            total_questions: self.total_questions,
            completed: self.completed,
            updated_at: Utc::now(),
        }
    }

    fn persist(&self) {
        if self.destroyed {
            return;
        }
        let blob = match serde_json::to_string(&self.snapshot()) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::error!("Failed to serialise queue state: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.save(&queue_key(&self.session_id), &blob) {
            tracing::warn!(
                "Failed to persist queue for session {}: {}",
                self.session_id,
                e
            );
        }
    }
}
