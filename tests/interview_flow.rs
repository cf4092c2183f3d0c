//! End-to-end interview flow tests for viva.
//!
//! Drives a full session with simulated time: detector, controller, queue
//! and conversation state together, plus the async driver.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use viva::audio::ChannelSource;
use viva::clock::ManualClock;
use viva::config::Config;
use viva::interview::{InterviewEvent, InterviewPhase};
use viva::persistence::MemoryStore;
use viva::session::{self, InterviewSession};

const ANSWER: &str = "This is a short test answer with enough words to qualify";

fn new_session(clock: Arc<ManualClock>) -> InterviewSession {
    InterviewSession::new(
        "flow",
        &Config::default(),
        Arc::new(MemoryStore::new()),
        clock,
    )
}

/// Feeds `volume` to the detector once per 10ms for `ms` milliseconds
fn speak(session: &mut InterviewSession, clock: &ManualClock, volume: f32, ms: u64) {
    for _ in 0..ms / 10 {
        clock.advance_ms(10);
        session.vad_mut().process_volume(volume);
        session.pump();
    }
}

// =============================================================================
// Turn taking
// =============================================================================

#[test]
fn test_answer_completes_after_speech_and_silence() {
    let clock = Arc::new(ManualClock::new());
    let mut session = new_session(clock.clone());
    let (_tx, source) = ChannelSource::new();
    session
        .initialize(Box::new(source))
        .expect("Failed to initialise");

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    session.controller_mut().subscribe(move |e| {
        if !matches!(e, InterviewEvent::StateChange { .. }) {
            sink.lock().push(e.clone());
        }
    });

    session
        .ask_question("Tell me about a hard bug you fixed.")
        .expect("Question rejected");
    session.controller_mut().on_question_speaking_complete();

    speak(&mut session, &clock, 80.0, 2000);
    assert!(session.vad().is_speaking());
    session.controller_mut().add_transcript_chunk(ANSWER, true);

    // VAD needs ~1.5s of silence before it stops reporting speech
    speak(&mut session, &clock, 0.0, 3000);

    let completions: Vec<(String, u64)> = events
        .lock()
        .iter()
        .filter_map(|e| match e {
            InterviewEvent::AnswerComplete {
                answer,
                duration_ms,
            } => Some((answer.clone(), *duration_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].0, ANSWER);
    assert!(completions[0].1 >= 2500);
    assert_eq!(
        events
            .lock()
            .iter()
            .filter(|e| **e == InterviewEvent::AnswerStart)
            .count(),
        1
    );

    assert_eq!(
        session.controller().phase(),
        InterviewPhase::Transitioning
    );
    assert!(session.queue().questions()[0].answered);
}

#[test]
fn test_manual_input_path_without_microphone() {
    let clock = Arc::new(ManualClock::new());
    let mut session = new_session(clock.clone());

    session.ask_question("Why this company?").expect("Question rejected");
    session.controller_mut().on_question_speaking_complete();
    session.controller_mut().add_transcript_chunk("Because of the team", true);
    session.controller_mut().force_complete_answer();
    session.pump();

    assert_eq!(session.conversation().turn_count(), 1);
    assert_eq!(
        session.conversation().get_conversation_history(),
        "Q1: Why this company?\nA1: Because of the team"
    );

    session.controller_mut().skip_transition();
    assert_eq!(session.controller().phase(), InterviewPhase::Idle);
}

#[test]
fn test_interview_ends_when_queue_full() {
    let clock = Arc::new(ManualClock::new());
    let mut config = Config::default();
    config.queue.total_questions = 1;
    let mut session =
        InterviewSession::new("short", &config, Arc::new(MemoryStore::new()), clock.clone());

    session.ask_question("Only question").expect("Question rejected");
    session.controller_mut().on_question_speaking_complete();
    session.controller_mut().force_complete_answer();
    session.controller_mut().skip_transition();

    assert!(session.ask_question("One more?").is_none());
    session.controller_mut().complete_interview();
    assert_eq!(session.controller().phase(), InterviewPhase::Completed);
}

// =============================================================================
// Async driver
// =============================================================================

#[tokio::test]
async fn test_run_stops_on_shutdown_and_destroys_session() {
    let clock = Arc::new(ManualClock::new());
    let mut inner = new_session(clock);
    let (_tx, source) = ChannelSource::new();
    inner
        .initialize(Box::new(source))
        .expect("Failed to initialise");
    let shared = Arc::new(Mutex::new(inner));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let driver = tokio::spawn(session::run(shared.clone(), shutdown_rx));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).expect("Driver exited early");
    tokio::time::timeout(Duration::from_secs(2), driver)
        .await
        .expect("Driver did not stop")
        .expect("Driver panicked");

    assert!(!shared.lock().vad().is_running());
}
