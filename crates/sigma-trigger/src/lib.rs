//! Pluggable event triggers.
//!
//! A [`Trigger`] is a source of [`Event`]s that, combined with a predicate
//! condition, drives dispatches on a function controller. Trigger types
//! register factories by name in a process-wide [`TriggerRegistry`];
//! function specs reference them by name.

mod channel;
mod condition;
mod error;

pub use channel::{ChannelTrigger, TriggerSender};
pub use condition::{ConditionError, ConditionEvaluator, EventTypeCondition};
pub use error::{Result, TriggerError};

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use parking_lot::RwLock;

use sigma_proto::Event;

/// A source of events for one function.
#[async_trait]
pub trait Trigger: Send {
    /// Waits for the next event; `None` signals end of stream.
    async fn next(&mut self) -> Option<Event>;
}

/// Builds triggers for a function controller.
pub trait TriggerBuilder: Send + Sync {
    /// Builds a trigger of the given type with the given options.
    fn build(&self, trigger_type: &str, options: &HashMap<String, String>)
        -> Result<Box<dyn Trigger>>;
}

/// Builds a trigger from its option map.
pub type TriggerFactory =
    Box<dyn Fn(&HashMap<String, String>) -> Result<Box<dyn Trigger>> + Send + Sync>;

/// Registry of named trigger factories.
#[derive(Default)]
pub struct TriggerRegistry {
    factories: RwLock<HashMap<String, TriggerFactory>>,
}

impl TriggerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: LazyLock<TriggerRegistry> = LazyLock::new(TriggerRegistry::new);
        &GLOBAL
    }

    /// Registers a factory under a unique name.
    ///
    /// # Panics
    ///
    /// Panics if the name is already taken; duplicate registration is a
    /// programming error.
    pub fn register(&self, name: impl Into<String>, factory: TriggerFactory) {
        let name = name.into();
        let mut factories = self.factories.write();
        assert!(
            !factories.contains_key(&name),
            "trigger factory {name:?} already registered"
        );
        factories.insert(name, factory);
    }

    /// Returns true if a factory is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Clears all registered factories. Intended for tests.
    pub fn reset(&self) {
        self.factories.write().clear();
    }
}

impl TriggerBuilder for TriggerRegistry {
    fn build(
        &self,
        trigger_type: &str,
        options: &HashMap<String, String>,
    ) -> Result<Box<dyn Trigger>> {
        let factories = self.factories.read();
        let factory = factories
            .get(trigger_type)
            .ok_or_else(|| TriggerError::UnknownTriggerType(trigger_type.to_owned()))?;
        factory(options)
    }
}

/// Builder backed by the process-wide registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTriggerBuilder;

impl TriggerBuilder for DefaultTriggerBuilder {
    fn build(
        &self,
        trigger_type: &str,
        options: &HashMap<String, String>,
    ) -> Result<Box<dyn Trigger>> {
        TriggerRegistry::global().build(trigger_type, options)
    }
}
