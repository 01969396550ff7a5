//! SignalCore Core — domain types, tick synthesis and the simulated matching broker.
//!
//! This crate holds everything a strategy trades against:
//! - Domain types (bars, ticks, orders, fills, positions, selections, parameters)
//! - Four-tick synthesis of bars for intrabar order evaluation
//! - Simulated matching broker with net positions and protective orders
//! - Broker and data-provider traits shared with live connectivity

pub mod broker;
pub mod data;
pub mod domain;
pub mod sim;

pub use broker::{Broker, BrokerError, ModifyOrder};
