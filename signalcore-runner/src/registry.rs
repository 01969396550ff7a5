//! Signal registry — signals keyed by (owner, name), plus event and timer fan-out.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use crate::signal::{Signal, StartOutcome};
use crate::strategy::{StartTrigger, StrategyEvent};

pub type SignalKey = (String, String);

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("factory built signal {actual:?} for key {expected:?}")]
    KeyMismatch {
        expected: SignalKey,
        actual: SignalKey,
    },
}

#[derive(Debug, Default)]
pub struct SignalRegistry {
    signals: RwLock<BTreeMap<SignalKey, Arc<Signal>>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registered signal, or a new one built by `factory` and registered.
    ///
    /// The built signal's owner and strategy name must match the key.
    pub fn get_or_create<F>(
        &self,
        owner: &str,
        name: &str,
        factory: F,
    ) -> Result<Arc<Signal>, RegistryError>
    where
        F: FnOnce() -> Signal,
    {
        let key = (owner.to_string(), name.to_string());
        if let Some(existing) = self.signals.read().get(&key) {
            return Ok(Arc::clone(existing));
        }
        let mut signals = self.signals.write();
        if let Some(existing) = signals.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let signal = factory();
        let actual = (signal.owner().to_string(), signal.name().to_string());
        if actual != key {
            return Err(RegistryError::KeyMismatch {
                expected: key,
                actual,
            });
        }
        let signal = Arc::new(signal);
        signals.insert(key, Arc::clone(&signal));
        Ok(signal)
    }

    pub fn get(&self, owner: &str, name: &str) -> Option<Arc<Signal>> {
        self.signals
            .read()
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
    }

    /// Unregister and stop a signal.
    pub fn remove(&self, owner: &str, name: &str) -> Option<Arc<Signal>> {
        let removed = self
            .signals
            .write()
            .remove(&(owner.to_string(), name.to_string()));
        if let Some(signal) = &removed {
            signal.exit(None);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.read().is_empty()
    }

    pub fn keys(&self) -> Vec<SignalKey> {
        self.signals.read().keys().cloned().collect()
    }

    fn snapshot(&self) -> Vec<(SignalKey, Arc<Signal>)> {
        self.signals
            .read()
            .iter()
            .map(|(k, s)| (k.clone(), Arc::clone(s)))
            .collect()
    }

    /// Start every running signal subscribed to the event's symbol.
    ///
    /// Signals still busy with a previous event report `Busy`; the event is
    /// not queued for them.
    pub fn dispatch(&self, event: &StrategyEvent) -> Vec<(SignalKey, StartOutcome)> {
        let trigger = match event {
            StrategyEvent::Tick { .. } => StartTrigger::NewTick,
            StrategyEvent::Bar(_) => StartTrigger::NewBar,
        };
        let events = std::slice::from_ref(event);
        self.snapshot()
            .into_iter()
            .filter(|(_, signal)| signal.state().is_running())
            .filter(|(_, signal)| {
                signal
                    .selections()
                    .iter()
                    .any(|s| s.symbol == event.symbol())
            })
            .map(|(key, signal)| {
                let outcome = signal.start(trigger, events);
                debug!(owner = %key.0, signal = %key.1, ?outcome, "dispatched event");
                (key, outcome)
            })
            .collect()
    }

    /// Start every signal whose wake-up interval has elapsed. Returns how many ran.
    pub fn fire_timers(&self, now: DateTime<Utc>) -> usize {
        self.snapshot()
            .into_iter()
            .filter(|(_, signal)| signal.is_due(now))
            .filter(|(_, signal)| {
                signal.start_at(StartTrigger::Timer, &[], now) == StartOutcome::Completed
            })
            .count()
    }
}
