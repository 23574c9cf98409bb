use std::time::Duration;

use heifer_backend::StoreErrorPolicy;
use serde::{Deserialize, Serialize};

use crate::CacheError;

fn default_vary() -> Vec<String> {
    vec!["Accept".to_owned()]
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    "default".to_owned()
}

fn default_max_age() -> Option<Duration> {
    Some(Duration::ZERO)
}

pub(crate) fn from_yaml<T: for<'de> Deserialize<'de>>(yaml: &str) -> Result<T, CacheError> {
    serde_saphyr::from_str(yaml).map_err(|error| CacheError::Config(error.to_string()))
}

/// Policy of the outgoing-call interceptor.
///
/// ```
/// use heifer::ClientPolicy;
///
/// let policy = ClientPolicy::from_yaml("revalidate_by_default: true\nnamespace: cars/v1\n").unwrap();
/// assert!(policy.revalidate_by_default);
/// assert_eq!(policy.default_vary, vec!["Accept".to_owned()]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientPolicy {
    /// Expired entries are revalidated unless the request tolerates staleness.
    #[serde(default)]
    pub revalidate_by_default: bool,
    /// Vary headers assumed for a URI that never advertised `Vary`.
    #[serde(default = "default_vary")]
    pub default_vary: Vec<String>,
    /// What to do with store failures.
    #[serde(default)]
    pub store_errors: StoreErrorPolicy,
    /// Namespace tag folded into every identity.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Attach the diagnostic header to responses.
    #[serde(default = "default_true")]
    pub diagnostic_header: bool,
    /// Drop cached variants of a resource after a successful mutation.
    #[serde(default = "default_true")]
    pub invalidate_on_mutation: bool,
    /// Store responses to different query strings of one resource apart.
    /// Off keys on the query-stripped resource URI alone.
    #[serde(default = "default_true")]
    pub query_variants: bool,
}

impl Default for ClientPolicy {
    fn default() -> Self {
        Self {
            revalidate_by_default: false,
            default_vary: default_vary(),
            store_errors: StoreErrorPolicy::default(),
            namespace: default_namespace(),
            diagnostic_header: true,
            invalidate_on_mutation: true,
            query_variants: true,
        }
    }
}

impl ClientPolicy {
    /// Loads the policy from YAML; missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, CacheError> {
        from_yaml(yaml)
    }
}

/// Policy of the handler interceptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerPolicy {
    /// `max-age` advertised on cacheable GET responses (e.g. "30s", "5m").
    #[serde(default = "default_max_age", with = "humantime_serde")]
    pub max_age: Option<Duration>,
    /// Advertise `public` instead of `private`.
    #[serde(default)]
    pub public: bool,
    /// Advertise `must-revalidate`.
    #[serde(default = "default_true")]
    pub must_revalidate: bool,
    /// Advertise `no-cache`.
    #[serde(default)]
    pub no_cache: bool,
    /// `Vary` advertised on cacheable GET responses.
    #[serde(default = "default_vary")]
    pub vary: Vec<String>,
    /// What to do with store failures.
    #[serde(default)]
    pub store_errors: StoreErrorPolicy,
    /// Derive a strong ETag from the body when the handler set no validator.
    #[serde(default = "default_true")]
    pub digest_etag: bool,
    /// Namespace tag folded into every identity.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Keep validators of different query strings of one resource apart.
    #[serde(default = "default_true")]
    pub query_variants: bool,
}

impl Default for ServerPolicy {
    fn default() -> Self {
        Self {
            max_age: default_max_age(),
            public: false,
            must_revalidate: true,
            no_cache: false,
            vary: default_vary(),
            store_errors: StoreErrorPolicy::default(),
            digest_etag: true,
            namespace: default_namespace(),
            query_variants: true,
        }
    }
}

impl ServerPolicy {
    /// Loads the policy from YAML; missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self, CacheError> {
        from_yaml(yaml)
    }

    /// `Cache-Control` value advertised on cacheable responses.
    pub fn cache_control(&self) -> String {
        let mut directives = vec![if self.public { "public" } else { "private" }.to_owned()];
        if let Some(max_age) = self.max_age {
            directives.push(format!("max-age={}", max_age.as_secs()));
        }
        if self.must_revalidate {
            directives.push("must-revalidate".to_owned());
        }
        if self.no_cache {
            directives.push("no-cache".to_owned());
        }
        directives.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_server_policy_from_yaml() {
        let yaml = r#"
max_age: 5m
public: true
must_revalidate: false
vary: [Accept, Accept-Language]
store_errors: propagate
"#;
        let policy = ServerPolicy::from_yaml(yaml).unwrap();
        assert_eq!(policy.max_age, Some(Duration::from_secs(300)));
        assert_eq!(policy.store_errors, StoreErrorPolicy::Propagate);
        assert_eq!(policy.cache_control(), "public, max-age=300");
        assert!(policy.digest_etag);
        assert!(policy.query_variants);
    }

    #[test]
    fn test_default_server_cache_control() {
        assert_eq!(
            ServerPolicy::default().cache_control(),
            "private, max-age=0, must-revalidate"
        );
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            ClientPolicy::from_yaml("revalidate_by_default: [1, 2]"),
            Err(CacheError::Config(_))
        ));
    }
}
