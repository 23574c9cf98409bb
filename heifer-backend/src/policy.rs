use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::StoreResult;

/// What the pipelines do when a store operation fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorPolicy {
    /// Log and continue as if the store returned nothing.
    #[default]
    Ignore,
    /// Return the error to the caller.
    Propagate,
}

impl StoreErrorPolicy {
    /// Applies the policy to the result of a store operation.
    ///
    /// With [`StoreErrorPolicy::Ignore`] a failure becomes `T::default()`,
    /// i.e. a miss, a `false` or a zero count.
    pub fn absorb<T: Default>(self, operation: &'static str, result: StoreResult<T>) -> StoreResult<T> {
        match (self, result) {
            (_, Ok(value)) => Ok(value),
            (StoreErrorPolicy::Ignore, Err(error)) => {
                warn!(operation, kind = error.kind(), %error, "store operation failed, ignoring");
                Ok(T::default())
            }
            (StoreErrorPolicy::Propagate, Err(error)) => Err(error),
        }
    }
}
