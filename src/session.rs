//! Per-session composition of the interview components
//!
//! An `InterviewSession` owns one detector, one controller, one question
//! queue and one conversation state. Nothing is shared between sessions.
//! The host drives it either by calling [`InterviewSession::pump`] from its
//! own loop or by spawning [`run`] on a tokio runtime.

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::audio::source::AudioSource;
use crate::audio::vad::{MediaAccessError, VadEvent, VoiceActivityDetector};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::conversation::{ConversationStateManager, DEFAULT_SIMILARITY_THRESHOLD};
use crate::interview::controller::{AutoInterviewController, InterviewEvent};
use crate::interview::state::InterviewPhase;
use crate::persistence::SharedStore;
use crate::queue::{Question, QuestionQueueManager, QueueValidation};

/// Upper bound on the pump interval while the detector is running
const VAD_POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct InterviewSession {
    session_id: String,
    vad: VoiceActivityDetector,
    controller: AutoInterviewController,
    queue: QuestionQueueManager,
    conversation: ConversationStateManager,
    speech_starts: Receiver<()>,
    completed_answers: Receiver<String>,
    destroyed: bool,
}

impl InterviewSession {
    pub fn new(
        session_id: impl Into<String>,
        config: &Config,
        store: SharedStore,
        clock: SharedClock,
    ) -> Self {
        let session_id = session_id.into();

        let mut vad = VoiceActivityDetector::new(config.vad.clone(), clock.clone());
        let (speech_tx, speech_starts) = unbounded();
        vad.subscribe(move |event| {
            if matches!(event, VadEvent::SpeechStart { .. }) {
                let _ = speech_tx.send(());
            }
        });

        let mut controller = AutoInterviewController::new(config.interview.clone(), clock)
            .with_vad(vad.speaking_handle());
        let (answer_tx, completed_answers) = unbounded();
        controller.subscribe(move |event| {
            if let InterviewEvent::AnswerComplete { answer, .. } = event {
                let _ = answer_tx.send(answer.clone());
            }
        });

        let queue =
            QuestionQueueManager::new(session_id.clone(), config.queue.total_questions, store.clone());
        let conversation = ConversationStateManager::new(session_id.clone()).with_store(store);

        Self {
            session_id,
            vad,
            controller,
            queue,
            conversation,
            speech_starts,
            completed_answers,
            destroyed: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Restores persisted state and starts the detector on `source`
    ///
    /// # Errors
    ///
    /// Returns the detector's `MediaAccessError`. Queue and conversation
    /// state are loaded regardless, so a manual-input fallback can continue.
    pub fn initialize(
        &mut self,
        source: Box<dyn AudioSource>,
    ) -> Result<QueueValidation, MediaAccessError> {
        let validation = self.queue.initialize();
        self.conversation.load();
        self.vad.initialize(source)?;
        self.vad.start();
        tracing::info!("Interview session {} initialised", self.session_id);
        Ok(validation)
    }

    /// Queues and starts asking `text`
    ///
    /// Returns `None` when the question repeats an earlier one, the queue is
    /// full, or the controller is not idle.
    pub fn ask_question(&mut self, text: &str) -> Option<Question> {
        if self.controller.phase() != InterviewPhase::Idle {
            tracing::debug!("Cannot ask a question in phase {}", self.controller.phase());
            return None;
        }
        if self.queue.questions().len() >= self.queue.total_questions() as usize {
            tracing::info!("Question queue is full for session {}", self.session_id);
            return None;
        }
        if self.queue.is_question_already_asked(text)
            || self
                .conversation
                .has_asked_similar_question(text, DEFAULT_SIMILARITY_THRESHOLD)
        {
            tracing::info!("Rejected repeated question: {}", text);
            return None;
        }

        let question = self.queue.add_question(text)?;
        self.queue.mark_as_asked(question.number);
        if self.queue.can_advance() {
            self.queue.move_to_next();
        }
        self.controller
            .start_question(text, question.number, self.queue.total_questions());
        Some(question)
    }

    /// Records `answer` for the current question and the conversation log
    pub fn record_answer(&mut self, answer: &str, topics: &[String]) {
        let Some(current) = self.queue.get_current_question().cloned() else {
            tracing::debug!("No current question to record an answer for");
            return;
        };
        if current.answered {
            return;
        }
        self.queue.mark_as_answered(current.number, answer);
        self.conversation.add_turn(&current.question, answer, topics);
    }

    /// One cooperative cycle; returns how long the host may sleep
    ///
    /// Polls the detector, forwards speech starts to the controller, runs the
    /// controller's deadlines and records completed answers. Speech detected
    /// while the question is playing interrupts it.
    pub fn pump(&mut self) -> Duration {
        let check_interval = self.check_interval();
        if self.destroyed {
            return check_interval;
        }

        self.vad.poll();
        while self.speech_starts.try_recv().is_ok() {
            if self.controller.phase().is_speaking() {
                self.controller.on_ai_speaking_interrupted();
            }
            self.controller.on_speech_start();
        }

        self.controller.tick();
        while let Ok(answer) = self.completed_answers.try_recv() {
            self.record_answer(&answer, &[]);
        }

        let mut wait = self
            .controller
            .next_wake()
            .unwrap_or(check_interval)
            .min(check_interval);
        if self.vad.is_running() {
            wait = wait.min(VAD_POLL_INTERVAL);
        }
        wait
    }

    fn check_interval(&self) -> Duration {
        Duration::from_millis(self.controller.config().completion_check_interval_ms.max(1))
    }

    pub fn vad(&self) -> &VoiceActivityDetector {
        &self.vad
    }

    pub fn vad_mut(&mut self) -> &mut VoiceActivityDetector {
        &mut self.vad
    }

    pub fn controller(&self) -> &AutoInterviewController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut AutoInterviewController {
        &mut self.controller
    }

    pub fn queue(&self) -> &QuestionQueueManager {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut QuestionQueueManager {
        &mut self.queue
    }

    pub fn conversation(&self) -> &ConversationStateManager {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut ConversationStateManager {
        &mut self.conversation
    }

    /// Tears down every component; safe to call repeatedly
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.controller.destroy();
        self.vad.destroy();
        self.queue.destroy();
        self.conversation.destroy();
        self.destroyed = true;
        tracing::info!("Interview session {} destroyed", self.session_id);
    }
}

/// Drives `session` until `shutdown` turns true or its sender is dropped
///
/// The session is destroyed before returning.
pub async fn run(session: Arc<Mutex<InterviewSession>>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let wait = session.lock().pump();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    session.lock().destroy();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::ChannelSource;
    use crate::clock::ManualClock;
    use crate::interview::controller::InterviewConfigUpdate;
    use crate::persistence::MemoryStore;

    fn session() -> (Arc<ManualClock>, InterviewSession) {
        let clock = Arc::new(ManualClock::new());
        let session = InterviewSession::new(
            "session-1",
            &Config::default(),
            Arc::new(MemoryStore::new()),
            clock.clone(),
        );
        (clock, session)
    }

    #[test]
    fn test_ask_question_starts_controller() {
        let (_, mut session) = session();
        let q = session.ask_question("Tell me about yourself").unwrap();
        assert_eq!(q.number, 1);
        assert_eq!(session.controller().phase(), InterviewPhase::AiSpeaking);
        assert!(session.queue().questions()[0].asked);
    }

    #[test]
    fn test_ask_question_rejected_while_busy() {
        let (_, mut session) = session();
        session.ask_question("First question").unwrap();
        assert!(session.ask_question("Second question").is_none());
    }

    #[test]
    fn test_full_turn_records_answer() {
        let (clock, mut session) = session();
        session.ask_question("Describe a recent project").unwrap();
        session.controller_mut().on_question_speaking_complete();
        session.controller_mut().add_transcript_chunk(
            "I rebuilt our billing pipeline in Rust and cut latency by half",
            true,
        );
        clock.advance_ms(2500);
        session.pump();

        assert_eq!(session.controller().phase(), InterviewPhase::Transitioning);
        let q = &session.queue().questions()[0];
        assert!(q.answered);
        assert!(q.answer.as_deref().unwrap().starts_with("I rebuilt"));
        assert_eq!(session.conversation().turn_count(), 1);

        clock.advance_ms(1500);
        session.pump();
        assert_eq!(session.controller().phase(), InterviewPhase::Idle);

        // Near duplicate of the first question
        assert!(session.ask_question("Describe a recent project.").is_none());
        let next = session.ask_question("What would you improve next time?").unwrap();
        assert_eq!(next.number, 2);
        assert_eq!(session.queue().get_current_question().unwrap().number, 2);
    }

    #[test]
    fn test_vad_speech_start_reaches_controller() {
        let (clock, mut session) = session();
        let (tx, source) = ChannelSource::new();
        session.initialize(Box::new(source)).unwrap();
        session.ask_question("Q1?").unwrap();
        session.controller_mut().on_question_speaking_complete();

        for _ in 0..40 {
            clock.advance_ms(10);
            session.vad_mut().process_volume(90.0);
        }
        session.pump();
        assert!(session.controller().state().answer_started);
        drop(tx);
    }

    fn speak(clock: &ManualClock, session: &mut InterviewSession, ms: u64) {
        for _ in 0..ms / 10 {
            clock.advance_ms(10);
            session.vad_mut().process_volume(90.0);
        }
        session.pump();
    }

    #[test]
    fn test_speech_during_question_interrupts() {
        let (clock, mut session) = session();
        let (_tx, source) = ChannelSource::new();
        session.initialize(Box::new(source)).unwrap();
        session.ask_question("Tell me about a hard bug").unwrap();
        assert_eq!(session.controller().phase(), InterviewPhase::AiSpeaking);

        speak(&clock, &mut session, 600);
        assert!(session.vad().is_speaking());
        assert_eq!(session.controller().phase(), InterviewPhase::UserSpeaking);
        assert!(session.controller().state().answer_started);
    }

    #[test]
    fn test_speech_during_question_ignored_when_interruptions_disabled() {
        let clock = Arc::new(ManualClock::new());
        let mut config = Config::default();
        config.interview.interruption_enabled = false;
        let mut session =
            InterviewSession::new("session-1", &config, Arc::new(MemoryStore::new()), clock.clone());
        let (_tx, source) = ChannelSource::new();
        session.initialize(Box::new(source)).unwrap();
        session.ask_question("Tell me about a hard bug").unwrap();

        speak(&clock, &mut session, 600);
        assert_eq!(session.controller().phase(), InterviewPhase::AiSpeaking);
    }

    #[test]
    fn test_pump_follows_updated_check_interval() {
        let (_, mut session) = session();
        session.controller_mut().update_config(InterviewConfigUpdate {
            completion_check_interval_ms: Some(120),
            ..Default::default()
        });
        assert_eq!(session.pump(), Duration::from_millis(120));
    }

    #[test]
    fn test_pump_wait_is_capped() {
        let (_, mut session) = session();
        assert_eq!(session.pump(), Duration::from_millis(500));

        let (_tx, source) = ChannelSource::new();
        session.initialize(Box::new(source)).unwrap();
        assert_eq!(session.pump(), VAD_POLL_INTERVAL);
    }

    #[test]
    fn test_destroy_twice() {
        let (_, mut session) = session();
        session.destroy();
        session.destroy();
        assert!(!session.vad().is_running());
    }

    #[test]
    fn test_components_inert_after_destroy() {
        let (_, mut session) = session();
        session.destroy();

        assert!(session.queue_mut().add_question("Late question").is_none());
        session
            .conversation_mut()
            .add_turn("Late question", "Late answer", &[]);
        assert!(session.ask_question("Another question").is_none());

        assert!(session.queue().questions().is_empty());
        assert_eq!(session.conversation().turn_count(), 0);
    }
}
