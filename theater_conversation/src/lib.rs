#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Autonomous multi-persona conversations.
//!
//! A [`SessionRegistry`] owns one [`Session`] per external key and spawns a
//! loop task per running conversation. The loop alternates between personas,
//! asks a tiered [`theater_providers::CompletionClient`] for each line, swaps
//! out repetitive output for a fresh topic and delivers every turn through a
//! [`theater_core::DeliverySink`].

mod engine;
pub mod format;
mod guard;
mod history;
mod registry;
mod rotator;
mod session;

pub use engine::{ConversationEngine, EngineConfig};
pub use guard::{RepetitionGuard, overlap_ratio};
pub use history::{BoundedBuffer, HistoryRecord, PromptBuilder};
pub use registry::{GlobalSummary, SessionRegistry};
pub use rotator::PersonaRotator;
pub use session::{LoopOutcome, LoopState, Session, SessionError, SessionLimits, SessionSummary};
