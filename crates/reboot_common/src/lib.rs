//! reboot_common - core of the conditional reboot daemon
//!
//! Conditions probe the system and move through a hysteresis state machine.
//! Groups aggregate their conditions with an AND/OR evaluator and ask the
//! controller for a reboot, which is only granted once the machine has been
//! up long enough.
//!
//! Everything that touches the system sits behind a trait in [`ports`]; the
//! [`fakes`] module has in-memory versions for tests.

pub mod condition;
pub mod controller;
pub mod duration;
pub mod error;
pub mod evaluator;
pub mod fakes;
pub mod group;
pub mod metrics;
pub mod ports;
pub mod precondition;
pub mod state;

pub use condition::{Condition, ConditionSettings, StateChange, StateSnapshot};
pub use controller::{shutdown_signal, RebootController, RunOutcome};
pub use duration::{format_duration, parse_duration};
pub use error::{ConfigError, ConfigResult};
pub use evaluator::{StateEvaluator, WantedStates};
pub use group::{Group, RebootRequest};
pub use metrics::RebootMetrics;
pub use ports::{Checker, Journal, JournalEntry, NoopJournal, Precondition, Reboot, UptimeSource};
pub use precondition::{AlwaysPrecondition, HourClock, LocalClock, TimeWindowPrecondition};
pub use state::{ConditionState, StateName};
