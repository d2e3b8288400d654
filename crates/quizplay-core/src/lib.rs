//! quizplay-core: the assessment-attempt engine.
//!
//! This crate defines how a learner moves through a gated quiz attempt,
//! how unsaved answers are buffered against a persistence layer that may
//! fail, and how course-wide grade state turns into a single completion
//! notification for the embedding host.

pub mod classify;
pub mod completion;
pub mod error;
pub mod model;
pub mod navigation;
pub mod parser;
pub mod player;
pub mod policy;
pub mod report;
pub mod session;
pub mod traits;
pub mod watcher;
