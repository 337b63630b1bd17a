pub mod audit;
pub mod gate;
pub mod matcher;
pub mod notify;
pub mod workflow;

pub use audit::AuditRecorder;
pub use gate::{authorize, check_permission, require_role, visibility, GateDecision, Permission};
pub use matcher::{three_way_match, MatchInput, MatchPolicy, MatchingEngine, PoResolution};
pub use notify::{LogNotificationSink, NotificationSink, Outbox, StatusChanged};
pub use workflow::{ActionOutcome, ActionPayload, WorkflowAction, WorkflowEngine};
