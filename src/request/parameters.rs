//! Ordered request parameters
//!
//! Callers describe a query as a list of E-utilities options. Keys keep their
//! insertion order; a key may be present with no value, which means "omit it
//! from the request".

use serde::{Deserialize, Serialize};

use crate::error::{EutilsError, Result};

/// Keys handled by the client itself and never sent as-is
const CLIENT_ONLY_KEYS: &[&str] = &["limit", "usehistory"];

/// A WebEnv / query_key pair identifying a result set on the history server
///
/// WebEnv sessions typically expire after 1 hour of inactivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySession {
    /// WebEnv session identifier
    pub webenv: String,
    /// Query key within the session
    pub query_key: String,
}

impl HistorySession {
    /// Create a session from its two parts
    pub fn new<W: Into<String>, Q: Into<String>>(webenv: W, query_key: Q) -> Self {
        Self {
            webenv: webenv.into(),
            query_key: query_key.into(),
        }
    }
}

/// Ordered name/value mapping for one request or one caller query
///
/// # Example
///
/// ```
/// use eutils_client::Parameters;
///
/// let params = Parameters::new()
///     .with("db", "pubmed")
///     .with("term", "PNAS[ta] AND 97[vi]")
///     .with("retstart", 6)
///     .with("retmax", 6);
///
/// assert_eq!(params.db(), Some("pubmed"));
/// assert_eq!(params.retstart().unwrap(), Some(6));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    entries: Vec<(String, Option<String>)>,
}

impl Parameters {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set`](Parameters::set)
    pub fn with<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.set(key, value);
        self
    }

    /// Set `key` to `value`, replacing an earlier value in place
    pub fn set<K: Into<String>, V: ToString>(&mut self, key: K, value: V) {
        self.put(key.into(), Some(value.to_string()));
    }

    /// Keep `key` but mark it absent, so it is omitted from the request
    pub fn omit<K: Into<String>>(&mut self, key: K) {
        self.put(key.into(), None);
    }

    /// Remove `key` entirely
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        self.entries.remove(idx).1
    }

    /// Value of `key`, or `None` when missing or absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Whether `key` has a value
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Present entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
    }

    /// Number of present entries
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no entry has a value
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Target database
    pub fn db(&self) -> Option<&str> {
        self.get("db")
    }

    /// Parse `key` as a non-negative integer
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<usize>().map(Some).map_err(|_| {
                EutilsError::ConfigurationError(format!(
                    "parameter `{key}` must be a non-negative integer, got `{raw}`"
                ))
            }),
        }
    }

    /// Parse `key` as a boolean flag (`y`, `yes`, `true`, `1`)
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "y" | "yes" | "true" | "1"
            )
        })
    }

    /// Starting offset (`retstart`)
    pub fn retstart(&self) -> Result<Option<usize>> {
        self.get_usize("retstart")
    }

    /// Items per request (`retmax`)
    pub fn retmax(&self) -> Result<Option<usize>> {
        self.get_usize("retmax")
    }

    /// Cap on the total number of items fetched (`limit`, client side only)
    pub fn limit(&self) -> Result<Option<usize>> {
        self.get_usize("limit")
    }

    /// Whether the caller asked for a history session (`usehistory`)
    pub fn usehistory(&self) -> bool {
        self.flag("usehistory")
    }

    /// Comma separated UIDs from `id`
    pub fn ids(&self) -> Vec<&str> {
        self.get("id")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// WebEnv value, accepting either `WebEnv` or `webenv`
    pub fn webenv(&self) -> Option<&str> {
        self.get("WebEnv").or_else(|| self.get("webenv"))
    }

    /// Query key value, accepting either `query_key` or `querykey`
    pub fn query_key(&self) -> Option<&str> {
        self.get("query_key").or_else(|| self.get("querykey"))
    }

    /// History session supplied by the caller
    ///
    /// Only one half of the pair is a configuration error.
    pub fn history_session(&self) -> Result<Option<HistorySession>> {
        match (self.webenv(), self.query_key()) {
            (Some(webenv), Some(query_key)) => Ok(Some(HistorySession::new(webenv, query_key))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(EutilsError::ConfigurationError(
                "WebEnv given without query_key".to_string(),
            )),
            (None, Some(_)) => Err(EutilsError::ConfigurationError(
                "query_key given without WebEnv".to_string(),
            )),
        }
    }

    /// Parameters as they go on the wire
    ///
    /// Drops client-only options, turns `usehistory` into `usehistory=y`, and
    /// spells the history pair the way the service expects (`WebEnv`,
    /// `query_key`) with the values untouched.
    pub fn to_request_parameters(&self) -> Parameters {
        let mut out = Parameters::new();
        for (key, value) in &self.entries {
            if CLIENT_ONLY_KEYS.contains(&key.as_str()) {
                continue;
            }
            let key = match key.as_str() {
                "webenv" => "WebEnv",
                "querykey" => "query_key",
                other => other,
            };
            out.put(key.to_string(), value.clone());
        }
        if self.usehistory() {
            out.set("usehistory", "y");
        }
        out
    }

    /// Encode present entries as an `application/x-www-form-urlencoded` string
    pub fn to_query_string(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn put(&mut self, key: String, value: Option<String>) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Parameters::new();
        for (key, value) in iter {
            params.set(key, value);
        }
        params
    }
}
