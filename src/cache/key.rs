//! Cache key generation.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A primitive parameter value.
///
/// Construction normalises values so that semantically equal inputs compare
/// and hash equal: whole floats become integers and timestamps collapse to
/// their UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl ParamValue {
    /// Best-effort typing of a textual value (CLI arguments, query strings).
    pub fn infer(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            return ParamValue::Int(i);
        }
        // f64 parsing also accepts "inf" and "NaN", which are words here.
        let numeric = raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
        if numeric {
            if let Ok(f) = raw.parse::<f64>() {
                return ParamValue::from(f);
            }
        }
        match raw {
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return ParamValue::Date(d);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return ParamValue::from(dt);
        }
        ParamValue::Str(raw.to_string())
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Str(s) => write!(f, "{}", s),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i.into())
    }
}

impl From<u32> for ParamValue {
    fn from(i: u32) -> Self {
        ParamValue::Int(i.into())
    }
}

impl From<f64> for ParamValue {
    fn from(x: f64) -> Self {
        if !x.is_finite() {
            return ParamValue::Str(x.to_string());
        }
        if x.fract() == 0.0 && x >= i64::MIN as f64 && x <= i64::MAX as f64 {
            ParamValue::Int(x as i64)
        } else {
            ParamValue::Float(x)
        }
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(d: NaiveDate) -> Self {
        ParamValue::Date(d)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for ParamValue {
    fn from(dt: DateTime<Tz>) -> Self {
        ParamValue::Date(dt.with_timezone(&Utc).date_naive())
    }
}

/// Ordered parameter mapping; insertion order never affects the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheParams(BTreeMap<String, ParamValue>);

impl CacheParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for CacheParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = CacheParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub kind: String,
    pub hash: String,
}

impl CacheKey {
    pub fn new(kind: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            hash: hash.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.hash)
    }
}

#[derive(Serialize)]
struct Canonical<'a> {
    kind: &'a str,
    params: &'a CacheParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    salt: Option<&'a str>,
}

/// Derives [`CacheKey`]s from a kind and its parameters.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self { salt: None }
    }

    /// Mix a salt into every key, e.g. a prompt-template version, so that
    /// changing templates does not serve stale entries.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn generate(&self, kind: &str, params: &CacheParams) -> CacheKey {
        let canonical = serde_json::to_string(&Canonical {
            kind,
            params,
            salt: self.salt.as_deref(),
        })
        .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        CacheKey::new(kind, hash)
    }
}
