use std::fmt;

/// Logical cache namespaces. One namespace per gateway endpoint family so
/// each can be bulk-invalidated without touching the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Overview,
    Assets,
    AssetDetail,
    Candles,
    Search,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Overview => "overview",
            Namespace::Assets => "assets",
            Namespace::AssetDetail => "asset_detail",
            Namespace::Candles => "candles",
            Namespace::Search => "search",
        }
    }

    pub const ALL: [Namespace; 5] = [
        Namespace::Overview,
        Namespace::Assets,
        Namespace::AssetDetail,
        Namespace::Candles,
        Namespace::Search,
    ];
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic cache key construction.
///
/// Parameters are sorted by name before rendering and empty values are
/// skipped, so logically equivalent requests (any argument order, omitted
/// defaults) always land on the same key.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    prefix: String,
    namespace: Namespace,
    params: Vec<(String, String)>,
}

impl CacheKeyBuilder {
    pub fn new(prefix: impl Into<String>, namespace: Namespace) -> Self {
        Self {
            prefix: prefix.into(),
            namespace,
            params: Vec::new(),
        }
    }

    /// Add a parameter. Empty values are dropped so an explicitly-passed
    /// empty string keys identically to an omitted parameter.
    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        if !value.is_empty() {
            self.params.push((name.to_string(), value));
        }
        self
    }

    /// Add an optional parameter; `None` keys identically to omission.
    pub fn param_opt<T: ToString>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.param(name, v),
            None => self,
        }
    }

    pub fn build(mut self) -> String {
        self.params.sort_by(|a, b| a.0.cmp(&b.0));
        let rendered: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        if rendered.is_empty() {
            format!("{}:{}", self.prefix, self.namespace)
        } else {
            format!("{}:{}:{}", self.prefix, self.namespace, rendered.join("|"))
        }
    }
}

/// Glob pattern covering one namespace under the prefix.
pub fn namespace_pattern(prefix: &str, namespace: Namespace) -> String {
    format!("{}:{}:*", prefix, namespace)
}

/// Glob pattern covering every key under the prefix.
pub fn all_pattern(prefix: &str) -> String {
    format!("{}:*", prefix)
}
