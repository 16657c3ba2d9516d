//! mathexam-core: exam assembly, question templates, and scoring.
//!
//! This crate defines the question model, the traits external generators
//! implement, the batch cache, and the scoring logic that the rest of
//! mathexam builds on.

pub mod cache;
pub mod engine;
pub mod error;
pub mod history;
pub mod ids;
pub mod model;
pub mod scoring;
pub mod templates;
pub mod traits;

pub use engine::ExamAssembler;
pub use error::{ExamError, ProviderError};
pub use model::{BatchMode, Difficulty, ExamBatch, ExamMode, ExamRequest, Question};
pub use scoring::{ScoreReport, Scorer};
