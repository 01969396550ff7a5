//! Built-in strategies, looked up by name from configuration.

pub mod ma_cross;

use std::sync::Arc;

use crate::strategy::Strategy;

pub use ma_cross::MaCrossStrategy;

/// Names accepted by [`builtin`].
pub const BUILTIN: &[&str] = &[ma_cross::NAME];

pub fn builtin(name: &str) -> Option<Arc<dyn Strategy>> {
    match name {
        ma_cross::NAME => Some(Arc::new(MaCrossStrategy::new())),
        _ => None,
    }
}
