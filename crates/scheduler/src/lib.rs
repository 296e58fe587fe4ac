//! Recurring-action scheduler.
//!
//! Four pieces cooperate:
//! - [`recurrence`] — pure due-window arithmetic over schedule state,
//! - [`runtime::SchedulerRuntime`] — claims due windows as in-flight
//!   tickets and folds completed tickets back into schedule deltas,
//! - [`command_lane::CommandLane`] — the durable, idempotent submission
//!   point keyed by `execution_id`,
//! - [`dispatch::DispatchLoop`] — the ticker that drives the whole thing.

pub mod command_lane;
pub mod dispatch;
pub mod executor;
pub mod recurrence;
pub mod runtime;

pub use command_lane::{CommandLane, CommandPayload, CommandReceipt};
pub use dispatch::{DispatchLoop, TickSummary};
pub use executor::{ActionExecutor, ExecutionResult};
pub use runtime::SchedulerRuntime;
