//! Auto interview controller
//!
//! Drives one question/answer turn after another: listens once the question
//! has been spoken, decides when the answer is complete, pauses, and returns
//! to idle for the host to ask the next question.
//!
//! All waiting is expressed as deadlines stored on the controller. The host
//! calls [`AutoInterviewController::tick`] from its loop and can sleep for
//! [`AutoInterviewController::next_wake`] in between.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::state::{transition, InterviewPhase, InterviewTrigger, TransitionResult};
use crate::audio::vad::SpeakingFlag;
use crate::clock::SharedClock;
use crate::events::{ListenerId, Listeners};
use crate::text::word_count;

/// Answer completion and turn timing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewConfig {
    /// Minimum words before silence can complete an answer
    pub min_answer_length_words: usize,
    /// Time without transcript updates that counts as a finished answer
    pub silence_threshold_ms: u64,
    /// Hard cap on answer length; completes regardless of word count
    pub max_answer_duration_ms: u64,
    /// Pause between answer completion and returning to idle
    pub transition_delay_ms: u64,
    /// Longest interval between completion checks while listening
    pub completion_check_interval_ms: u64,
    /// Let the candidate barge in while the question is playing
    pub interruption_enabled: bool,
    /// Relay host-reported errors to listeners
    pub relay_errors: bool,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            min_answer_length_words: 10,
            silence_threshold_ms: 2500,
            max_answer_duration_ms: 180_000,
            transition_delay_ms: 1500,
            completion_check_interval_ms: 500,
            interruption_enabled: true,
            relay_errors: true,
        }
    }
}

/// Partial configuration applied by `update_config`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterviewConfigUpdate {
    pub min_answer_length_words: Option<usize>,
    pub silence_threshold_ms: Option<u64>,
    pub max_answer_duration_ms: Option<u64>,
    pub transition_delay_ms: Option<u64>,
    pub completion_check_interval_ms: Option<u64>,
    pub interruption_enabled: Option<bool>,
    pub relay_errors: Option<bool>,
}

impl InterviewConfig {
    fn apply(&mut self, update: InterviewConfigUpdate) {
        if let Some(v) = update.min_answer_length_words {
            self.min_answer_length_words = v;
        }
        if let Some(v) = update.silence_threshold_ms {
            self.silence_threshold_ms = v;
        }
        if let Some(v) = update.max_answer_duration_ms {
            self.max_answer_duration_ms = v;
        }
        if let Some(v) = update.transition_delay_ms {
            self.transition_delay_ms = v;
        }
        if let Some(v) = update.completion_check_interval_ms {
            self.completion_check_interval_ms = v;
        }
        if let Some(v) = update.interruption_enabled {
            self.interruption_enabled = v;
        }
        if let Some(v) = update.relay_errors {
            self.relay_errors = v;
        }
    }
}

/// Observable snapshot of the controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterviewState {
    pub phase: InterviewPhase,
    /// Derived from `phase`: the candidate's answer is being captured
    pub is_listening: bool,
    /// Derived from `phase`: the question audio is playing
    pub is_speaking: bool,
    pub current_question: Option<String>,
    pub question_number: u32,
    pub total_questions: u32,
    /// Final transcript chunks of the current answer
    pub current_answer: String,
    /// The VAD has reported speech during this answer
    pub answer_started: bool,
    pub last_error: Option<String>,
}

/// Event delivered to controller listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterviewEvent {
    QuestionStart {
        question: String,
        number: u32,
        total: u32,
    },
    QuestionEnd,
    AnswerStart,
    AnswerComplete {
        answer: String,
        duration_ms: u64,
    },
    TransitionStart,
    TransitionComplete,
    Interruption,
    StateChange {
        state: InterviewState,
    },
    Error {
        message: String,
    },
}

pub struct AutoInterviewController {
    config: InterviewConfig,
    clock: SharedClock,
    vad: Option<SpeakingFlag>,
    state: InterviewState,
    listeners: Listeners<InterviewEvent>,
    transcript: Vec<String>,
    listening_started_at: Option<Instant>,
    answer_started_at: Option<Instant>,
    last_transcript_at: Option<Instant>,
    transition_deadline: Option<Instant>,
    destroyed: bool,
}

impl AutoInterviewController {
    pub fn new(config: InterviewConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            vad: None,
            state: InterviewState::default(),
            listeners: Listeners::new(),
            transcript: Vec::new(),
            listening_started_at: None,
            answer_started_at: None,
            last_transcript_at: None,
            transition_deadline: None,
            destroyed: false,
        }
    }

    /// Attaches the VAD's speaking state, consulted by the completion check
    pub fn with_vad(mut self, vad: SpeakingFlag) -> Self {
        self.vad = Some(vad);
        self
    }

    pub fn set_vad(&mut self, vad: SpeakingFlag) {
        self.vad = Some(vad);
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&InterviewEvent) + Send + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Returns a snapshot of the current state
    pub fn state(&self) -> InterviewState {
        self.state.clone()
    }

    pub fn phase(&self) -> InterviewPhase {
        self.state.phase
    }

    pub fn config(&self) -> &InterviewConfig {
        &self.config
    }

    /// Merges `update` into the configuration; applies from the next tick
    pub fn update_config(&mut self, update: InterviewConfigUpdate) {
        self.config.apply(update);
        tracing::debug!("Interview config updated: {:?}", self.config);
    }

    /// Begins a new question: `idle -> ai_speaking`
    pub fn start_question(
        &mut self,
        question: &str,
        number: u32,
        total: u32,
    ) -> Option<TransitionResult> {
        let result = self.apply(InterviewTrigger::StartQuestion)?;
        self.cleanup();
        self.transcript.clear();
        self.update_state(|s| {
            s.phase = result.to;
            s.current_question = Some(question.to_string());
            s.question_number = number;
            s.total_questions = total;
            s.current_answer.clear();
            s.answer_started = false;
        });
        self.listeners.emit(&InterviewEvent::QuestionStart {
            question: question.to_string(),
            number,
            total,
        });
        Some(result)
    }

    /// Question playback finished: `ai_speaking -> user_speaking`
    pub fn on_question_speaking_complete(&mut self) -> Option<TransitionResult> {
        let result = self.apply(InterviewTrigger::QuestionSpeakingComplete)?;
        self.begin_listening(result.to);
        self.listeners.emit(&InterviewEvent::QuestionEnd);
        Some(result)
    }

    /// Candidate barged in: `ai_speaking -> user_speaking`
    ///
    /// Ignored unless `interruption_enabled` is set.
    pub fn on_ai_speaking_interrupted(&mut self) -> Option<TransitionResult> {
        if !self.config.interruption_enabled {
            tracing::debug!("Interruption ignored: interruptions disabled");
            return None;
        }
        let result = self.apply(InterviewTrigger::AiSpeakingInterrupted)?;
        self.begin_listening(result.to);
        self.listeners.emit(&InterviewEvent::Interruption);
        Some(result)
    }

    /// VAD speech start; marks the start of the answer on first occurrence
    pub fn on_speech_start(&mut self) -> bool {
        if self.destroyed || self.state.phase != InterviewPhase::UserSpeaking {
            return false;
        }
        if self.answer_started_at.is_some() {
            return false;
        }
        self.answer_started_at = Some(self.clock.now());
        self.update_state(|s| s.answer_started = true);
        self.listeners.emit(&InterviewEvent::AnswerStart);
        true
    }

    /// Feeds speech-to-text output while listening
    ///
    /// Every chunk resets the silence timer; only final chunks become part
    /// of the answer.
    pub fn add_transcript_chunk(&mut self, text: &str, is_final: bool) {
        if self.destroyed || self.state.phase != InterviewPhase::UserSpeaking {
            return;
        }
        self.last_transcript_at = Some(self.clock.now());

        if !is_final {
            return;
        }
        let chunk = text.trim();
        if chunk.is_empty() {
            return;
        }
        self.transcript.push(chunk.to_string());
        let answer = self.transcript.join(" ");
        self.update_state(|s| s.current_answer = answer);
    }

    /// Runs due deadlines and the answer completion check
    pub fn tick(&mut self) {
        if self.destroyed {
            return;
        }
        let now = self.clock.now();

        match self.state.phase {
            InterviewPhase::UserSpeaking => {
                if self.max_answer_deadline().is_some_and(|at| now >= at) {
                    tracing::info!("Answer reached maximum duration");
                    self.complete_answer(InterviewTrigger::MaxDurationElapsed);
                } else if self.answer_criteria_met(now) {
                    self.complete_answer(InterviewTrigger::AnswerCriteriaMet);
                }
            }
            InterviewPhase::Transitioning => {
                if self.transition_deadline.is_some_and(|at| now >= at) {
                    if let Some(result) = self.apply(InterviewTrigger::TransitionElapsed) {
                        self.finish_transition(result.to);
                    }
                }
            }
            _ => {}
        }
    }

    /// Completes the current answer immediately, bypassing the criteria
    pub fn force_complete_answer(&mut self) -> Option<TransitionResult> {
        self.complete_answer(InterviewTrigger::ForceComplete)
    }

    /// Ends the transition pause early: `transitioning -> idle`
    pub fn skip_transition(&mut self) -> Option<TransitionResult> {
        let result = self.apply(InterviewTrigger::SkipTransition)?;
        self.finish_transition(result.to);
        Some(result)
    }

    /// Ends the interview from any live phase
    pub fn complete_interview(&mut self) -> Option<TransitionResult> {
        let result = self.apply(InterviewTrigger::CompleteInterview)?;
        self.cleanup();
        self.update_state(|s| s.phase = result.to);
        tracing::info!("Interview completed");
        Some(result)
    }

    /// Relays an upstream failure (TTS, STT, network) to listeners
    pub fn report_error(&mut self, message: &str) {
        if self.destroyed {
            return;
        }
        tracing::warn!("Interview error reported: {}", message);
        if !self.config.relay_errors {
            return;
        }
        self.update_state(|s| s.last_error = Some(message.to_string()));
        self.listeners.emit(&InterviewEvent::Error {
            message: message.to_string(),
        });
    }

    /// Time until the next deadline, `None` when nothing is scheduled
    pub fn next_wake(&self) -> Option<Duration> {
        if self.destroyed {
            return None;
        }
        let now = self.clock.now();

        let wake = match self.state.phase {
            InterviewPhase::UserSpeaking => {
                let mut wake = self.max_answer_deadline();
                if word_count(&self.state.current_answer) >= self.config.min_answer_length_words {
                    let vad_speaking = self.vad.as_ref().is_some_and(|v| v.is_speaking());
                    let candidate = if vad_speaking {
                        now + Duration::from_millis(self.config.completion_check_interval_ms)
                    } else {
                        self.silence_deadline().unwrap_or(now)
                    };
                    wake = Some(wake.map_or(candidate, |w| w.min(candidate)));
                }
                wake
            }
            InterviewPhase::Transitioning => self.transition_deadline,
            _ => None,
        }?;

        Some(wake.saturating_duration_since(now))
    }

    /// Cancels all deadlines and drops listeners; safe to call repeatedly
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.cleanup();
        self.listeners.clear();
        self.destroyed = true;
        tracing::debug!("Interview controller destroyed");
    }

    fn apply(&mut self, trigger: InterviewTrigger) -> Option<TransitionResult> {
        if self.destroyed {
            return None;
        }
        let from = self.state.phase;
        match transition(from, trigger) {
            Ok(to) => {
                tracing::info!(
                    "Interview state transition: {} -> {} ({:?})",
                    from,
                    to,
                    trigger
                );
                Some(TransitionResult { from, to, trigger })
            }
            Err(rejected) => {
                tracing::debug!("Interview transition rejected: {}", rejected);
                None
            }
        }
    }

    fn begin_listening(&mut self, phase: InterviewPhase) {
        let now = self.clock.now();
        self.listening_started_at = Some(now);
        self.last_transcript_at = Some(now);
        self.answer_started_at = None;
        self.transcript.clear();
        self.update_state(|s| {
            s.phase = phase;
            s.current_answer.clear();
            s.answer_started = false;
        });
    }

    fn complete_answer(&mut self, trigger: InterviewTrigger) -> Option<TransitionResult> {
        let processing = self.apply(trigger)?;
        let now = self.clock.now();
        let started = self.answer_started_at.or(self.listening_started_at);
        let duration_ms = started
            .map(|at| now.saturating_duration_since(at).as_millis() as u64)
            .unwrap_or(0);
        let answer = self.state.current_answer.clone();

        self.cleanup();
        self.update_state(|s| s.phase = processing.to);

        let result = self.apply(InterviewTrigger::CompleteAnswer)?;
        tracing::info!(
            "Answer complete ({} words, {}ms)",
            word_count(&answer),
            duration_ms
        );
        self.listeners
            .emit(&InterviewEvent::AnswerComplete { answer, duration_ms });

        self.transition_deadline =
            Some(now + Duration::from_millis(self.config.transition_delay_ms));
        self.update_state(|s| s.phase = result.to);
        self.listeners.emit(&InterviewEvent::TransitionStart);
        Some(processing)
    }

    fn finish_transition(&mut self, phase: InterviewPhase) {
        self.cleanup();
        self.update_state(|s| s.phase = phase);
        self.listeners.emit(&InterviewEvent::TransitionComplete);
    }

    fn answer_criteria_met(&self, now: Instant) -> bool {
        if word_count(&self.state.current_answer) < self.config.min_answer_length_words {
            return false;
        }
        if !self.silence_deadline().is_some_and(|at| now >= at) {
            return false;
        }
        !self.vad.as_ref().is_some_and(|v| v.is_speaking())
    }

    fn max_answer_deadline(&self) -> Option<Instant> {
        self.listening_started_at
            .map(|at| at + Duration::from_millis(self.config.max_answer_duration_ms))
    }

    fn silence_deadline(&self) -> Option<Instant> {
        self.last_transcript_at
            .map(|at| at + Duration::from_millis(self.config.silence_threshold_ms))
    }

    fn cleanup(&mut self) {
        self.listening_started_at = None;
        self.last_transcript_at = None;
        self.transition_deadline = None;
    }

    fn update_state<F>(&mut self, update: F)
    where
        F: FnOnce(&mut InterviewState),
    {
        update(&mut self.state);
        self.state.is_listening = self.state.phase.is_listening();
        self.state.is_speaking = self.state.phase.is_speaking();
        self.listeners.emit(&InterviewEvent::StateChange {
            state: self.state.clone(),
        });
    }
}

impl Drop for AutoInterviewController {
    fn drop(&mut self) {
        self.destroy();
    }
}
