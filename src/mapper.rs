//! The projection seam: payloads become target-shaped records here.

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{ExternalKey, Payload, Projection};

/// Projects an external [`Payload`] into a [`Projection`] for the internal
/// system.
///
/// `validate` carries the business rules and may consult reference data, so
/// it is async and may fail temporarily (dictionary briefly unavailable) or
/// permanently (the data itself is wrong). `map` is a pure function from
/// payload to projection and runs only after validation has passed.
#[async_trait]
pub trait Mapper: Send + Sync {
    /// Domain object consumed from the source.
    type Input: Send + Sync;
    /// Target payload produced.
    type Output: Send + Sync;

    /// Business-rule validation of the incoming payload.
    ///
    /// # Errors
    ///
    /// Mapping errors: temporary when a dependency is transiently
    /// unavailable, permanent when the data violates a rule.
    async fn validate(&self, _key: &ExternalKey, _payload: &Payload<Self::Input>) -> Result<()> {
        Ok(())
    }

    /// Build the projection for a validated payload.
    ///
    /// # Errors
    ///
    /// Permanent mapping error when the payload cannot be projected.
    fn map(
        &self,
        key: &ExternalKey,
        payload: &Payload<Self::Input>,
    ) -> Result<Projection<Self::Output>>;
}
