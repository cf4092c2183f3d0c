//! Interview turn state machine
//!
//! Defines the phases of a question/answer turn and the transition table
//! between them. `transition` is a pure function; the controller owns the
//! timers and side effects that surround each accepted transition.

use serde::{Deserialize, Serialize};

/// Phase of the current interview turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterviewPhase {
    /// Waiting for the host to start the next question
    #[default]
    Idle,
    /// The question is being spoken to the candidate
    AiSpeaking,
    /// Listening for the candidate's answer
    UserSpeaking,
    /// The answer has been accepted and is being handed off
    Processing,
    /// Pause between the answer and the next question
    Transitioning,
    /// The interview is over; terminal
    Completed,
}

impl InterviewPhase {
    /// Returns a human-readable description of the phase
    pub fn description(&self) -> &'static str {
        match self {
            InterviewPhase::Idle => "Waiting for the next question",
            InterviewPhase::AiSpeaking => "Asking the question",
            InterviewPhase::UserSpeaking => "Listening for the answer",
            InterviewPhase::Processing => "Processing the answer",
            InterviewPhase::Transitioning => "Moving to the next question",
            InterviewPhase::Completed => "Interview complete",
        }
    }

    /// Returns whether the candidate's answer is being captured
    pub fn is_listening(&self) -> bool {
        matches!(self, InterviewPhase::UserSpeaking)
    }

    /// Returns whether the question audio is playing
    pub fn is_speaking(&self) -> bool {
        matches!(self, InterviewPhase::AiSpeaking)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InterviewPhase::Completed)
    }
}

impl std::fmt::Display for InterviewPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InterviewPhase::Idle => "idle",
            InterviewPhase::AiSpeaking => "ai_speaking",
            InterviewPhase::UserSpeaking => "user_speaking",
            InterviewPhase::Processing => "processing",
            InterviewPhase::Transitioning => "transitioning",
            InterviewPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Inputs that can move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewTrigger {
    /// Host started a new question
    StartQuestion,
    /// Question playback finished
    QuestionSpeakingComplete,
    /// Candidate barged in during playback
    AiSpeakingInterrupted,
    /// Word count, silence and VAD criteria were all met
    AnswerCriteriaMet,
    /// The answer reached its maximum duration
    MaxDurationElapsed,
    /// Host submitted the answer manually
    ForceComplete,
    /// Answer handed off, start the transition pause
    CompleteAnswer,
    /// Transition pause elapsed
    TransitionElapsed,
    /// Host skipped the transition pause
    SkipTransition,
    /// Host ended the interview
    CompleteInterview,
}

/// A transition the table refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{trigger:?} is not valid in phase {from}")]
pub struct TransitionRejected {
    pub from: InterviewPhase,
    pub trigger: InterviewTrigger,
}

/// An accepted transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionResult {
    pub from: InterviewPhase,
    pub to: InterviewPhase,
    pub trigger: InterviewTrigger,
}

/// Looks up the phase reached from `from` on `trigger`
pub fn transition(
    from: InterviewPhase,
    trigger: InterviewTrigger,
) -> Result<InterviewPhase, TransitionRejected> {
    use InterviewPhase as P;
    use InterviewTrigger as T;

    let to = match (from, trigger) {
        (P::Completed, _) => None,
        (_, T::CompleteInterview) => Some(P::Completed),

        (P::Idle, T::StartQuestion) => Some(P::AiSpeaking),

        (P::AiSpeaking, T::QuestionSpeakingComplete) => Some(P::UserSpeaking),
        (P::AiSpeaking, T::AiSpeakingInterrupted) => Some(P::UserSpeaking),

        (P::UserSpeaking, T::AnswerCriteriaMet) => Some(P::Processing),
        (P::UserSpeaking, T::MaxDurationElapsed) => Some(P::Processing),
        (P::UserSpeaking, T::ForceComplete) => Some(P::Processing),

        (P::Processing, T::CompleteAnswer) => Some(P::Transitioning),

        (P::Transitioning, T::TransitionElapsed) => Some(P::Idle),
        (P::Transitioning, T::SkipTransition) => Some(P::Idle),

        _ => None,
    };

    to.ok_or(TransitionRejected { from, trigger })
}
