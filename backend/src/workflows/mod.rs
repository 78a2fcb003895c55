// Workflow Automation Engine
//
// Candidate events flow through a durable outbox into a worker that matches
// them against configured workflows: trigger, then conditions, then actions.

pub mod actions;
pub mod conditions;
pub mod engine;
pub mod error;
pub mod executor;
pub mod outbox;
pub mod pg_store;
pub mod store;
pub mod triggers;

pub use actions::{Action, ActionResult, ActionType};
pub use conditions::{Condition, ConditionOperator};
pub use engine::{
    ExecutionRecord, ExecutionStatus, SkipReason, WorkflowDefinition, WorkflowEngine, WorkflowOutcome,
};
pub use error::{AutomationError, AutomationResult};
pub use executor::WorkflowExecutor;
pub use outbox::{AutomationDispatcher, AutomationWorker};
pub use pg_store::PgStore;
pub use store::{AutomationStore, CapKind, EventQueue, QueuedEvent, Reservation};
pub use triggers::{EventSource, Trigger, TriggerEvent, TriggerType};
