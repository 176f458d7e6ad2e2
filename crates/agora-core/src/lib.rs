//! agora/crates/agora-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Agora: models,
//! repository ports, the ranking engine and its scheduler, and the forum
//! service that ties them together.

pub mod error;
pub mod forum;
pub mod models;
pub mod ranking;
pub mod scheduler;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use forum::{Forum, Ports, PostPage};
pub use models::*;
pub use ranking::{RankingEngine, RankingParams, SweepReport};
pub use scheduler::{RankScheduler, SchedulerError, SchedulerState};
pub use traits::*;
