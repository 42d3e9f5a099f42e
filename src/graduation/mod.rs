//! Graduation requirement checking.
//!
//! The policy is loaded once and passed explicitly into aggregation and
//! evaluation, so several policies can be evaluated side by side.

pub mod classify;
pub mod credits;
pub mod evaluator;
pub mod policy;

pub use classify::{classify, Classification, ClassificationRule, PolicyMismatchError};
pub use credits::{aggregate_credits, CategoryCredit, CourseDisposition, CreditLedger, Disposition};
pub use evaluator::{evaluate, CategoryProgress, EvaluationError, GraduationCheck, ProgressStatus};
pub use policy::{PolicyDocument, PolicyError, RequirementCategory, RequirementPolicy};
