//! Simulation: tick synthesis, trigger evaluation, costs and the matching broker.

pub mod activity;
pub mod broker;
pub mod cost_model;
pub mod ticks;
pub mod trigger;

pub use activity::{ActivityEntry, ActivityKind, ActivityLog};
pub use broker::SimulatedBroker;
pub use cost_model::CostModel;
pub use ticks::{synthesize_ticks, TICKS_PER_BAR};
pub use trigger::check_trigger;
