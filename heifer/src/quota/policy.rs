//! Quota configuration.

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::CacheError;

/// Byte budgets of the client store.
///
/// `None` disables the corresponding budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Budget across every domain.
    #[serde(default)]
    pub global: Option<ByteSize>,
    /// Budget of each individual domain.
    #[serde(default)]
    pub per_domain: Option<ByteSize>,
}

impl QuotaConfig {
    /// Create a new builder for QuotaConfig.
    pub fn builder() -> QuotaConfigBuilder {
        QuotaConfigBuilder::default()
    }

    /// Loads the configuration from YAML, e.g. `global: 64 MiB`.
    pub fn from_yaml(yaml: &str) -> Result<Self, CacheError> {
        crate::config::from_yaml(yaml)
    }

    pub(crate) fn global_bytes(&self) -> Option<u64> {
        self.global.map(|size| size.as_u64())
    }

    pub(crate) fn per_domain_bytes(&self) -> Option<u64> {
        self.per_domain.map(|size| size.as_u64())
    }
}

/// Builder for QuotaConfig.
#[derive(Debug, Clone, Default)]
pub struct QuotaConfigBuilder {
    global: Option<ByteSize>,
    per_domain: Option<ByteSize>,
}

impl QuotaConfigBuilder {
    /// Set the global budget.
    pub fn global(self, size: ByteSize) -> Self {
        Self {
            global: Some(size),
            ..self
        }
    }

    /// Set the per-domain budget.
    pub fn per_domain(self, size: ByteSize) -> Self {
        Self {
            per_domain: Some(size),
            ..self
        }
    }

    /// Build the QuotaConfig.
    pub fn build(self) -> QuotaConfig {
        QuotaConfig {
            global: self.global,
            per_domain: self.per_domain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_yaml() {
        let config = QuotaConfig::from_yaml("global: 1 MiB\nper_domain: 4096\n").unwrap();
        assert_eq!(config.global_bytes(), Some(1024 * 1024));
        assert_eq!(config.per_domain_bytes(), Some(4096));
    }

    #[test]
    fn test_builder() {
        let config = QuotaConfig::builder().per_domain(ByteSize::kib(2)).build();
        assert_eq!(config.global, None);
        assert_eq!(config.per_domain_bytes(), Some(2048));
    }
}
