//! Content queries and their signal payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::perspective::Perspective;
use crate::Result;

/// A query parameter value: a scalar or an array of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// String.
    String(String),
    /// Array of values.
    Array(Vec<ParamValue>),
}

impl ParamValue {
    /// Encode as the JSON literal expected by the query protocol.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a command-line value: JSON when it parses as a scalar or array,
    /// otherwise the raw string.
    pub fn parse_lenient(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| Self::String(raw.to_string()))
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

/// Parameter mapping of a query. Ordered so encoded requests are stable.
pub type QueryParams = BTreeMap<String, ParamValue>;

/// How a failure of the query affects the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// The page's main document: failures propagate.
    #[default]
    Primary,
    /// Site-wide extras such as settings: failures degrade to defaults.
    Secondary,
}

/// A named, parameterized read against the content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentQuery {
    name: String,
    text: String,
    #[serde(default)]
    params: QueryParams,
    #[serde(default)]
    importance: Importance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    listen_filter: Option<String>,
}

impl ContentQuery {
    /// Creates a primary query with no parameters.
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            params: QueryParams::new(),
            importance: Importance::Primary,
            listen_filter: None,
        }
    }

    /// Adds a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Merges a parameter mapping, overriding existing keys.
    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params.extend(params);
        self
    }

    /// Sets the importance.
    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    /// Sets the document filter used when listening for changes.
    pub fn with_listen_filter(mut self, filter: impl Into<String>) -> Self {
        self.listen_filter = Some(filter.into());
        self
    }

    /// Query name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parameters.
    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Importance.
    pub fn importance(&self) -> Importance {
        self.importance
    }

    /// The filter for the change stream; the query text when unset.
    pub fn listen_filter(&self) -> &str {
        self.listen_filter.as_deref().unwrap_or(&self.text)
    }
}

/// Everything a client view needs to re-subscribe to exactly the query a
/// server render resolved: query, parameters and perspective.
///
/// Never contains credentials, so it is safe to serialize into the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySignal {
    query: ContentQuery,
    perspective: Perspective,
}

impl QuerySignal {
    /// Pair a query with the perspective it was resolved at.
    pub fn new(query: ContentQuery, perspective: Perspective) -> Self {
        Self { query, perspective }
    }

    /// The query.
    pub fn query(&self) -> &ContentQuery {
        &self.query
    }

    /// The perspective.
    pub fn perspective(&self) -> Perspective {
        self.perspective
    }
}
