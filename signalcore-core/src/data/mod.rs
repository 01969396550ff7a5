//! Market data access

pub mod provider;

pub use provider::{DataError, DataProvider, InMemoryDataProvider};
