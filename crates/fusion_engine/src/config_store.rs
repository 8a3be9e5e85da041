//! Configuration store: copy-on-write snapshots swapped atomically between ticks.

use std::sync::Arc;

use contracts::{AnalysisConfig, RoadError};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared handle to the current configuration snapshot
///
/// Every update is validated against the full snapshot; a rejected update leaves
/// the current snapshot untouched.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    tx: Arc<watch::Sender<Arc<AnalysisConfig>>>,
}

impl ConfigStore {
    /// # Errors
    /// `Configuration` when the initial snapshot is invalid
    pub fn new(config: AnalysisConfig) -> Result<Self, RoadError> {
        config.validate_all()?;
        let (tx, _rx) = watch::channel(Arc::new(config));
        Ok(Self { tx: Arc::new(tx) })
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<AnalysisConfig> {
        self.tx.borrow().clone()
    }

    /// Replace the whole snapshot
    pub fn replace(&self, config: AnalysisConfig) -> Result<(), RoadError> {
        config.validate_all().inspect_err(|e| warn!(error = %e, "configuration rejected"))?;
        self.tx.send_replace(Arc::new(config));
        info!("configuration replaced");
        Ok(())
    }

    /// Set one parameter by dotted key, e.g. `quality.t1` or `anomaly.k`
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), RoadError> {
        self.apply([(key.to_string(), value.into())])
    }

    /// Apply a batch of updates, all or nothing
    pub fn apply<I>(&self, updates: I) -> Result<(), RoadError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let updates: Vec<(String, Value)> = updates.into_iter().collect();
        let mut outcome = Ok(());

        self.tx.send_if_modified(|current| match patched(current, &updates) {
            Ok(next) => {
                *current = Arc::new(next);
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });

        match &outcome {
            Ok(()) => {
                let keys: Vec<&str> = updates.iter().map(|(k, _)| k.as_str()).collect();
                info!(keys = ?keys, "configuration updated");
            }
            Err(e) => warn!(error = %e, "configuration update rejected"),
        }
        outcome
    }

    /// Flattened `key -> value` view of the current snapshot
    pub fn entries(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        if let Ok(value) = serde_json::to_value(&*self.snapshot()) {
            flatten("", &value, &mut out);
        }
        out
    }
}

/// Build the candidate snapshot for a batch of updates
fn patched(current: &AnalysisConfig, updates: &[(String, Value)]) -> Result<AnalysisConfig, RoadError> {
    let mut doc = serde_json::to_value(current)
        .map_err(|e| RoadError::structural(format!("config snapshot not serialisable: {e}")))?;

    for (key, value) in updates {
        let pointer = format!("/{}", key.replace('.', "/"));
        let slot = doc
            .pointer_mut(&pointer)
            .ok_or_else(|| RoadError::configuration(key.as_str(), "unknown configuration key"))?;
        *slot = value.clone();
    }

    let next: AnalysisConfig = serde_json::from_value(doc).map_err(|e| {
        let field = updates
            .first()
            .map(|(k, _)| k.as_str())
            .unwrap_or("config");
        RoadError::configuration(field, e.to_string())
    })?;
    next.validate_all()?;
    Ok(next)
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(&key, v, out);
            }
        }
        other => out.push((prefix.to_string(), other.clone())),
    }
}
