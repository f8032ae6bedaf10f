/// Data ingestion for the water temperature service.
///
/// Submodules:
/// - `omw`      - HTTP fetcher for the OMW water temperature endpoint.
/// - `validate` - strict payload shape checks producing `WaterRecord`s.
/// - `fixtures` (test only) - representative API payloads.

pub mod omw;
pub mod validate;

#[cfg(test)]
pub(crate) mod fixtures;

pub use omw::{OmwClient, WaterSource};

use crate::model::{Dataset, UpdateError};

/// One fetch + validate cycle, shared by entry setup and the coordinator.
pub async fn fetch_dataset(source: &dyn WaterSource) -> Result<Dataset, UpdateError> {
    let payload = source.fetch().await?;
    let dataset = validate::validate_payload(&payload)?;
    Ok(dataset)
}
