pub mod apply;
pub mod candidate;
pub mod engine;
pub mod rules;
pub mod targets;

pub use apply::RadioController;
pub use candidate::Candidate;
pub use engine::{ApplyOutcome, PendingConfirmation, RecommendationEngine};
pub use rules::RuleInputs;
pub use targets::OptimisationTarget;
