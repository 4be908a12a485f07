//! Durable storage for the live engine snapshot.

use crate::domain::error::QuadtraderError;
use crate::domain::live::EngineSnapshot;

/// A partially written snapshot must never load as valid.
pub trait StateStorePort {
    fn save(&self, snapshot: &EngineSnapshot) -> Result<(), QuadtraderError>;

    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<EngineSnapshot>, QuadtraderError>;
}
