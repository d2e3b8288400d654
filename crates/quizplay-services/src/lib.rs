//! quizplay-services: concrete collaborators for the attempt engine.
//!
//! In-memory persistence with failure injection, answer-key scoring, a
//! static grade store, host notification sinks, and the configuration
//! that wires them together.

pub mod config;
pub mod grades;
pub mod memory;
pub mod notifier;
pub mod scoring;

pub use config::{
    create_notifier, create_persistence, load_config_from, NotifierConfig, PersistenceConfig,
    QuizplayConfig,
};
pub use grades::{read_snapshots, MemoryGradeStore};
pub use memory::InMemoryPersistence;
pub use notifier::{ChannelNotifier, LogNotifier, StdoutNotifier};
pub use scoring::AnswerKeyScorer;
