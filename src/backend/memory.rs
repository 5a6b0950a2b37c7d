//! In-process cluster backend.
//!
//! Stores resources per namespace and records every call in an ordered journal.
//! Failures and completion outcomes can be injected per resource name, which is how
//! rollback and sweep behavior is exercised without a cluster.

use super::{ClusterBackend, ConfigResource, ExecutionUnitSpec, LabelSelector, UnitOutcome};
use crate::error::{BackendError, ResourceKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Backend operation, as recorded in the journal and used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateConfig,
    DeleteConfig,
    ListConfigs,
    CreateUnit,
    DeleteUnit,
    ListUnits,
    Wait,
}

/// One journal entry; `name` is empty for list calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub operation: Operation,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Default)]
struct Namespace {
    configs: BTreeMap<String, ConfigResource>,
    units: BTreeMap<String, ExecutionUnitSpec>,
}

#[derive(Debug, Default)]
struct State {
    namespaces: HashMap<String, Namespace>,
    journal: Vec<JournalEntry>,
    failures: HashSet<(Operation, String)>,
    outcomes: HashMap<String, UnitOutcome>,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` on `name` fail with [`BackendError::Rejected`] until cleared.
    /// Use an empty name to target list operations.
    pub fn fail_on(&self, operation: Operation, name: &str) {
        self.state
            .lock()
            .failures
            .insert((operation, name.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Outcome reported when waiting on unit `name` (default: succeeded).
    pub fn set_outcome(&self, name: &str, outcome: UnitOutcome) {
        self.state
            .lock()
            .outcomes
            .insert(name.to_string(), outcome);
    }

    pub fn config_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .namespaces
            .get(namespace)
            .map(|ns| ns.configs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn unit_names(&self, namespace: &str) -> Vec<String> {
        self.state
            .lock()
            .namespaces
            .get(namespace)
            .map(|ns| ns.units.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn config(&self, namespace: &str, name: &str) -> Option<ConfigResource> {
        self.state
            .lock()
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.configs.get(name).cloned())
    }

    pub fn unit(&self, namespace: &str, name: &str) -> Option<ExecutionUnitSpec> {
        self.state
            .lock()
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.units.get(name).cloned())
    }

    /// Insert a configuration resource directly, bypassing journal and failures.
    pub fn seed_config(&self, namespace: &str, config: ConfigResource) {
        self.state
            .lock()
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .configs
            .insert(config.name.clone(), config);
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().journal.clone()
    }

    /// Journal entries for `operation`, names only.
    pub fn calls(&self, operation: Operation) -> Vec<String> {
        self.state
            .lock()
            .journal
            .iter()
            .filter(|entry| entry.operation == operation)
            .map(|entry| entry.name.clone())
            .collect()
    }

    fn record(
        state: &mut State,
        operation: Operation,
        namespace: &str,
        name: &str,
    ) -> Result<(), BackendError> {
        state.journal.push(JournalEntry {
            operation,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        if state.failures.contains(&(operation, name.to_string())) {
            return Err(BackendError::Rejected(format!(
                "injected failure for {:?} {}",
                operation, name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterBackend for InMemoryBackend {
    async fn create_config(
        &self,
        namespace: &str,
        config: &ConfigResource,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        Self::record(&mut state, Operation::CreateConfig, namespace, &config.name)?;
        let ns = state.namespaces.entry(namespace.to_string()).or_default();
        if ns.configs.contains_key(&config.name) {
            return Err(BackendError::AlreadyExists {
                kind: ResourceKind::Config,
                name: config.name.clone(),
            });
        }
        ns.configs.insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn delete_config(&self, namespace: &str, name: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        Self::record(&mut state, Operation::DeleteConfig, namespace, name)?;
        state
            .namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.configs.remove(name))
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound {
                kind: ResourceKind::Config,
                name: name.to_string(),
            })
    }

    async fn list_configs(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<String>, BackendError> {
        let mut state = self.state.lock();
        Self::record(&mut state, Operation::ListConfigs, namespace, "")?;
        Ok(state
            .namespaces
            .get(namespace)
            .map(|ns| {
                ns.configs
                    .values()
                    .filter(|c| selector.matches(&c.labels))
                    .map(|c| c.name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_unit(
        &self,
        namespace: &str,
        unit: &ExecutionUnitSpec,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        Self::record(&mut state, Operation::CreateUnit, namespace, &unit.name)?;
        let ns = state.namespaces.entry(namespace.to_string()).or_default();
        if ns.units.contains_key(&unit.name) {
            return Err(BackendError::AlreadyExists {
                kind: ResourceKind::ExecutionUnit,
                name: unit.name.clone(),
            });
        }
        if !ns.configs.contains_key(&unit.config_name) {
            return Err(BackendError::Rejected(format!(
                "configmap {} referenced by job {} does not exist",
                unit.config_name, unit.name
            )));
        }
        ns.units.insert(unit.name.clone(), unit.clone());
        Ok(())
    }

    async fn delete_unit(&self, namespace: &str, name: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        Self::record(&mut state, Operation::DeleteUnit, namespace, name)?;
        state
            .namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.units.remove(name))
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound {
                kind: ResourceKind::ExecutionUnit,
                name: name.to_string(),
            })
    }

    async fn list_units(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<String>, BackendError> {
        let mut state = self.state.lock();
        Self::record(&mut state, Operation::ListUnits, namespace, "")?;
        Ok(state
            .namespaces
            .get(namespace)
            .map(|ns| {
                ns.units
                    .values()
                    .filter(|u| selector.matches(&u.labels))
                    .map(|u| u.name.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn wait_for_completion(
        &self,
        namespace: &str,
        name: &str,
        _timeout: Duration,
    ) -> Result<UnitOutcome, BackendError> {
        let mut state = self.state.lock();
        Self::record(&mut state, Operation::Wait, namespace, name)?;
        let exists = state
            .namespaces
            .get(namespace)
            .is_some_and(|ns| ns.units.contains_key(name));
        if !exists {
            return Err(BackendError::NotFound {
                kind: ResourceKind::ExecutionUnit,
                name: name.to_string(),
            });
        }
        Ok(state
            .outcomes
            .get(name)
            .cloned()
            .unwrap_or(UnitOutcome::Succeeded))
    }
}
