use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use grader_core::model::{Unit, UnitId};

use super::UnitProvider;
use crate::error::UnitProviderError;

/// Units held in memory; `replace` swaps a unit wholesale.
#[derive(Clone, Default)]
pub struct InMemoryUnitProvider {
    units: Arc<RwLock<BTreeMap<UnitId, Unit>>>,
}

impl InMemoryUnitProvider {
    #[must_use]
    pub fn new(units: impl IntoIterator<Item = Unit>) -> Self {
        let units = units.into_iter().map(|u| (u.id().clone(), u)).collect();
        Self {
            units: Arc::new(RwLock::new(units)),
        }
    }

    /// Insert or replace a unit, as an instructor re-upload would.
    pub fn replace(&self, unit: Unit) {
        if let Ok(mut guard) = self.units.write() {
            guard.insert(unit.id().clone(), unit);
        }
    }

    pub fn remove(&self, id: &UnitId) {
        if let Ok(mut guard) = self.units.write() {
            guard.remove(id);
        }
    }
}

#[async_trait]
impl UnitProvider for InMemoryUnitProvider {
    async fn list_units(&self) -> Result<Vec<UnitId>, UnitProviderError> {
        let guard = self.units.read().map_err(|e| UnitProviderError::Io {
            path: "<memory>".into(),
            source: std::io::Error::other(e.to_string()),
        })?;
        Ok(guard.keys().cloned().collect())
    }

    async fn get_unit(&self, id: &UnitId) -> Result<Unit, UnitProviderError> {
        let guard = self.units.read().map_err(|e| UnitProviderError::Io {
            path: "<memory>".into(),
            source: std::io::Error::other(e.to_string()),
        })?;
        guard
            .get(id)
            .cloned()
            .ok_or_else(|| UnitProviderError::UnknownUnit(id.clone()))
    }
}
