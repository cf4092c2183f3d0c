//! Automatic interview turn-taking
//!
//! Decides when the candidate has finished answering and moves the interview
//! on to the next question without manual intervention.
//!
//! ## Phases
//!
//! 1. **IDLE** - Waiting for the host to start a question
//! 2. **AI_SPEAKING** - The question is being played back
//! 3. **USER_SPEAKING** - Listening; transcript chunks accumulate
//! 4. **PROCESSING** - The answer is being handed off
//! 5. **TRANSITIONING** - Short pause before the next question
//! 6. **COMPLETED** - Terminal, reachable from every other phase
//!
//! ## Transitions
//!
//! ```text
//!            start_question          speaking complete / interruption
//! ┌──────┐ ───────────────► ┌─────────────┐ ──────────────────► ┌───────────────┐
//! │ IDLE │                  │ AI_SPEAKING │                     │ USER_SPEAKING │
//! └──────┘                  └─────────────┘                     └───────────────┘
//!    ▲                                              criteria met / max │
//!    │                                              duration / forced  ▼
//!    │   delay elapsed / skip   ┌───────────────┐  complete   ┌────────────┐
//!    └──────────────────────────│ TRANSITIONING │◄────────────│ PROCESSING │
//!                               └───────────────┘             └────────────┘
//!
//!      any phase ── complete_interview ──► COMPLETED
//! ```
//!
//! An answer completes when it has at least `min_answer_length_words` words,
//! no transcript update has arrived for `silence_threshold_ms` and the VAD
//! does not report speech, or unconditionally once `max_answer_duration_ms`
//! has passed since listening began.

pub mod controller;
pub mod state;

pub use controller::{
    AutoInterviewController, InterviewConfig, InterviewConfigUpdate, InterviewEvent,
    InterviewState,
};
pub use state::{
    transition, InterviewPhase, InterviewTrigger, TransitionRejected, TransitionResult,
};
