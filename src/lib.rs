//! viva - turn-taking core for voice interviews
//!
//! Detects when a candidate starts and stops speaking, decides when an
//! answer is complete, and keeps the persisted question queue and
//! conversation memory for each interview session.

pub mod audio;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod events;
pub mod interview;
pub mod logging;
pub mod persistence;
pub mod queue;
pub mod session;
pub mod text;

pub use audio::{AudioSource, ChannelSource, MediaAccessError, VadConfig, VoiceActivityDetector};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use conversation::ConversationStateManager;
pub use interview::{AutoInterviewController, InterviewConfig, InterviewEvent, InterviewPhase};
pub use persistence::{SessionStore, SharedStore};
pub use queue::{Question, QuestionQueueManager};
pub use session::InterviewSession;
