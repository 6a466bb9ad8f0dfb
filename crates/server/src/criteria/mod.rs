pub mod evaluator;
pub mod expression;

pub use evaluator::{evaluate, InvalidCriteriaError, MatchOutcome, MatchedGroup};
