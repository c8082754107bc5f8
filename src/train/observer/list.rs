//! Ordered list of observers

use super::traits::{Observer, ObserverAction, ObserverContext};
use crate::error::Result;

/// Dispatches training events to observers in registration order
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Box<dyn Observer>>,
}

impl ObserverList {
    /// Create an empty list
    pub fn new() -> Self {
        Self { observers: Vec::new() }
    }

    /// Add an observer
    pub fn add<O: Observer + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    /// Add an observer, builder style
    pub fn with<O: Observer + 'static>(mut self, observer: O) -> Self {
        self.add(observer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Names of the registered observers, in order
    pub fn names(&self) -> Vec<&'static str> {
        self.observers.iter().map(|o| o.name()).collect()
    }

    /// Fire train begin event
    pub fn on_train_begin(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        self.dispatch(|o| o.on_train_begin(ctx))
    }

    /// Fire step end event
    pub fn on_step_end(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        self.dispatch(|o| o.on_step_end(ctx))
    }

    /// Fire epoch end event
    pub fn on_epoch_end(&mut self, ctx: &ObserverContext) -> Result<ObserverAction> {
        self.dispatch(|o| o.on_epoch_end(ctx))
    }

    /// Fire train end event
    pub fn on_train_end(&mut self, ctx: &ObserverContext) -> Result<()> {
        for obs in &mut self.observers {
            obs.on_train_end(ctx)?;
        }
        Ok(())
    }

    // Every observer sees every event; a Stop from any of them wins.
    fn dispatch<F>(&mut self, mut f: F) -> Result<ObserverAction>
    where
        F: FnMut(&mut dyn Observer) -> Result<ObserverAction>,
    {
        let mut action = ObserverAction::Continue;
        for obs in &mut self.observers {
            if f(obs.as_mut())? == ObserverAction::Stop {
                action = ObserverAction::Stop;
            }
        }
        Ok(action)
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList").field("observers", &self.names()).finish()
    }
}
