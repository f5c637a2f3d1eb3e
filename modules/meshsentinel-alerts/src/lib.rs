pub mod backend;
pub mod router;
pub mod types;

pub use backend::{AlertBackend, BrokerBackend, BrokerPublisher, WebhookBackend};
pub use router::AlertRouter;
pub use types::{AlertThreshold, Problem, ProblemSeverity};
