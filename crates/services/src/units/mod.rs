mod dir;
mod memory;

use async_trait::async_trait;
use grader_core::model::{Unit, UnitId};

use crate::error::UnitProviderError;

pub use dir::{DirUnitProvider, UNIT_FILE_NAME};
pub use memory::InMemoryUnitProvider;

/// Source of unit definitions.
#[async_trait]
pub trait UnitProvider: Send + Sync {
    /// Unit ids in display order.
    ///
    /// # Errors
    ///
    /// Returns `UnitProviderError` if the source cannot be read.
    async fn list_units(&self) -> Result<Vec<UnitId>, UnitProviderError>;

    /// Fetch one unit.
    ///
    /// # Errors
    ///
    /// Returns `UnitProviderError::UnknownUnit` if the unit does not exist.
    async fn get_unit(&self, id: &UnitId) -> Result<Unit, UnitProviderError>;

    /// Re-discover units from the underlying source.
    ///
    /// # Errors
    ///
    /// Returns `UnitProviderError` if rediscovery fails.
    async fn reload(&self) -> Result<(), UnitProviderError> {
        Ok(())
    }
}
