pub mod grading_ctx;
pub mod grading_flow;

pub use grading_ctx::SubmissionCtx;
pub use grading_flow::{GradingFlow, GradingMode, ProcessedDocument};
