//! Cache key generation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Closed set of resource categories. Each one is a cache namespace, a
/// circuit-breaker boundary and carries its own default lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Page,
    Database,
    DataSource,
    Block,
    User,
    Comment,
    Search,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        Self::Page,
        Self::Database,
        Self::DataSource,
        Self::Block,
        Self::User,
        Self::Comment,
        Self::Search,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Database => "database",
            Self::DataSource => "data_source",
            Self::Block => "block",
            Self::User => "user",
            Self::Comment => "comment",
            Self::Search => "search",
        }
    }

    /// Lifetime used when neither the call nor the configuration overrides it.
    pub const fn default_ttl(&self) -> Duration {
        match self {
            Self::Page => Duration::from_secs(5 * 60),
            Self::Database | Self::DataSource => Duration::from_secs(10 * 60),
            Self::Block => Duration::from_secs(2 * 60),
            Self::User => Duration::from_secs(60 * 60),
            Self::Comment => Duration::from_secs(60),
            Self::Search => Duration::from_secs(30),
        }
    }

    /// Key prefix shared by every entry of this type, e.g. `page:`.
    pub fn prefix(&self) -> String {
        format!("{}:", self.as_str())
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown resource type '{}'", s))
    }
}

/// Deterministic key: `<type>:<id1>:<id2>...`.
///
/// String identifiers render verbatim except that `%` and `:` are
/// percent-escaped, so a component never splits into two. Any other
/// identifier renders as JSON with object keys sorted, so logically equal
/// filters produce equal keys. A string and a number with the same text
/// (`"3"` and `3`) still render alike; keep identifier types consistent per
/// request shape.
///
/// ```rust
/// use resilient_fetch::cache::{CacheKey, ResourceType};
/// use serde_json::json;
///
/// let a = CacheKey::new(ResourceType::Database).push("db1").push(&json!({"b": 2, "a": 1}));
/// let b = CacheKey::new(ResourceType::Database).push("db1").push(&json!({"a": 1, "b": 2}));
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), r#"database:db1:{"a":1,"b":2}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    resource: ResourceType,
    rendered: String,
    parts: usize,
}

impl CacheKey {
    pub fn new(resource: ResourceType) -> Self {
        Self {
            resource,
            rendered: resource.prefix(),
            parts: 0,
        }
    }

    /// Append one identifier component.
    pub fn push<I: Serialize + ?Sized>(mut self, id: &I) -> Self {
        if self.parts > 0 {
            self.rendered.push(':');
        }
        self.rendered.push_str(&render_identifier(id));
        self.parts += 1;
        self
    }

    pub fn resource(&self) -> ResourceType {
        self.resource
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Number of identifier components.
    pub fn len(&self) -> usize {
        self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts == 0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

fn render_identifier<I: Serialize + ?Sized>(id: &I) -> String {
    match serde_json::to_value(id) {
        Ok(serde_json::Value::String(s)) => escape_component(&s),
        // `Map` is ordered by key, so this output is canonical
        Ok(v) => v.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "cache identifier is not serializable");
            "null".to_string()
        }
    }
}

fn escape_component(s: &str) -> String {
    if !s.contains(['%', ':']) {
        return s.to_string();
    }
    s.replace('%', "%25").replace(':', "%3A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_without_identifiers_is_prefix() {
        let key = CacheKey::new(ResourceType::Page);
        assert_eq!(key.as_str(), "page:");
        assert!(key.is_empty());
    }

    #[test]
    fn test_mixed_identifiers() {
        let key = CacheKey::new(ResourceType::Search)
            .push("q")
            .push(&3)
            .push(&json!({"sort": "desc", "filter": {"b": true, "a": false}}));
        assert_eq!(
            key.as_str(),
            r#"search:q:3:{"filter":{"a":false,"b":true},"sort":"desc"}"#
        );
        assert_eq!(key.len(), 3);
    }

    #[test]
    fn test_separator_inside_string_identifier_does_not_split_it() {
        let joined = CacheKey::new(ResourceType::Page).push("a:b");
        let split = CacheKey::new(ResourceType::Page).push("a").push("b");
        assert_ne!(joined.as_str(), split.as_str());
        assert_eq!(joined.as_str(), "page:a%3Ab");
        assert_eq!(
            CacheKey::new(ResourceType::Page).push("50%:x").as_str(),
            "page:50%25%3Ax"
        );
    }

    #[test]
    fn test_nested_object_keys_are_sorted() {
        let key = CacheKey::new(ResourceType::Database)
            .push(&json!({"b": 1, "a": {"z": [1, {"y": 2, "x": 1}], "c": null}}));
        assert_eq!(
            key.as_str(),
            r#"database:{"a":{"c":null,"z":[1,{"x":1,"y":2}]},"b":1}"#
        );
    }

    #[test]
    fn test_resource_type_round_trip_through_str() {
        for r in ResourceType::ALL {
            assert_eq!(r.as_str().parse::<ResourceType>().unwrap(), r);
        }
        assert!("widget".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_default_ttls() {
        assert_eq!(ResourceType::Search.default_ttl(), Duration::from_secs(30));
        assert_eq!(ResourceType::User.default_ttl(), Duration::from_secs(3600));
    }
}
