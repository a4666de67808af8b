//! Runtime values for the Plume evaluator

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use regex::Regex;

use super::closure::Closure;
use super::iter::Iter;
use super::usr::UsrObject;
use crate::vm::{RuntimeError, RuntimeErrorKind, RuntimeResult};

/// Shared, mutable list storage
pub type ListRef = Arc<RwLock<Vec<Val>>>;

/// Shared, mutable map storage
pub type MapRef = Arc<RwLock<MapData>>;

/// Shared iterator state
pub type IterRef = Arc<Mutex<Iter>>;

/// A runtime value
///
/// Scalars are held inline; containers are shared handles, so assigning a
/// list or map to another variable aliases it rather than copying it.
#[derive(Clone, Default)]
pub enum Val {
    #[default]
    Null,
    Int(i64),
    Real(f64),
    Bool(bool),
    Str(Arc<str>),
    Pair(Arc<(Val, Val)>),
    List(ListRef),
    Map(MapRef),
    Regexp(Arc<Regex>),
    Iter(IterRef),
    Closure(Arc<Closure>),
    /// Host-defined opaque value
    Usr(Arc<dyn UsrObject>),
}

/// String-keyed map with a modification counter
///
/// Keys iterate in sorted order, which is stable while the map is not
/// mutated. Every mutation bumps `version` so live iterators can detect it.
#[derive(Debug, Clone, Default)]
pub struct MapData {
    entries: BTreeMap<String, Val>,
    version: u64,
}

impl MapData {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current modification counter
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Look up a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Val> {
        self.entries.get(key)
    }

    /// Returns true if the key is present
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, key: impl Into<String>, value: Val) -> Option<Val> {
        self.version += 1;
        self.entries.insert(key.into(), value)
    }

    /// Remove an entry
    pub fn remove(&mut self, key: &str) -> Option<Val> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.version += 1;
        self.entries.clear();
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Val)> {
        self.entries.iter()
    }

    /// Keys in iteration order
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Values in key order
    #[must_use]
    pub fn values(&self) -> Vec<Val> {
        self.entries.values().cloned().collect()
    }
}

impl FromIterator<(String, Val)> for MapData {
    fn from_iter<T: IntoIterator<Item = (String, Val)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            version: 0,
        }
    }
}

impl Val {
    /// Create a string value
    #[must_use]
    pub fn string(s: impl AsRef<str>) -> Self {
        Val::Str(Arc::from(s.as_ref()))
    }

    /// Create a list value
    #[must_use]
    pub fn list(values: Vec<Val>) -> Self {
        Val::List(Arc::new(RwLock::new(values)))
    }

    /// Create an empty map value
    #[must_use]
    pub fn empty_map() -> Self {
        Val::Map(Arc::new(RwLock::new(MapData::new())))
    }

    /// Create a map value from entries
    #[must_use]
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Val)>) -> Self {
        let data = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Val::Map(Arc::new(RwLock::new(data)))
    }

    /// Create a pair value
    #[must_use]
    pub fn pair(first: Val, second: Val) -> Self {
        Val::Pair(Arc::new((first, second)))
    }

    /// Wrap an iterator
    #[must_use]
    pub fn iter(iter: Iter) -> Self {
        Val::Iter(Arc::new(Mutex::new(iter)))
    }

    /// Wrap a host object
    #[must_use]
    pub fn usr(object: impl UsrObject + 'static) -> Self {
        Val::Usr(Arc::new(object))
    }

    /// Truthiness: `null`, `false`, `0`, `0.0`, `""`, empty list and empty
    /// map are falsy; every other value is truthy
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Val::Null => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Real(r) => *r != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::List(l) => !l.read().is_empty(),
            Val::Map(m) => !m.read().is_empty(),
            Val::Usr(u) => u.is_truthy(),
            _ => true,
        }
    }

    /// Returns true if this value is null
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Val::Null)
    }

    /// Returns the type name of this value (for error messages and `type()`)
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null => "null",
            Val::Int(_) => "int",
            Val::Real(_) => "real",
            Val::Bool(_) => "bool",
            Val::Str(_) => "string",
            Val::Pair(_) => "pair",
            Val::List(_) => "list",
            Val::Map(_) => "map",
            Val::Regexp(_) => "regexp",
            Val::Iter(_) => "iter",
            Val::Closure(_) => "closure",
            Val::Usr(_) => "usr",
        }
    }

    /// Immutable-by-contract predicate used to guard shared global writes
    ///
    /// Scalars, strings, regexes and pairs of immutable values qualify, as do
    /// native closures, script closures without captures and host objects that
    /// declare themselves immutable. Lists, maps and iterators never do.
    #[must_use]
    pub fn is_immutable(&self) -> bool {
        match self {
            Val::Null | Val::Int(_) | Val::Real(_) | Val::Bool(_) | Val::Str(_) | Val::Regexp(_) => true,
            Val::Pair(p) => p.0.is_immutable() && p.1.is_immutable(),
            Val::List(_) | Val::Map(_) | Val::Iter(_) => false,
            Val::Closure(c) => c.is_immutable(),
            Val::Usr(u) => u.is_immutable(),
        }
    }

    /// Integer payload, if this is an int
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Val::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric payload promoted to real, if this is an int or real
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Val::Int(i) => Some(*i as f64),
            Val::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// String payload, if this is a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to an integer the way `to_int` does
    pub fn to_int(&self) -> RuntimeResult<i64> {
        match self {
            Val::Int(i) => Ok(*i),
            Val::Real(r) => Ok(*r as i64),
            Val::Bool(b) => Ok(i64::from(*b)),
            Val::Null => Ok(0),
            Val::Str(s) => {
                let trimmed = s.trim();
                let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                    Some(hex) => i64::from_str_radix(hex, 16).ok(),
                    None => trimmed.parse::<i64>().ok(),
                };
                parsed.ok_or_else(|| RuntimeError::invalid(format!("cannot convert \"{s}\" to int")))
            }
            other => Err(RuntimeError::type_error("to_int", "number or string", other.type_name())),
        }
    }

    /// Convert to a real the way `to_real` does
    pub fn to_real(&self) -> RuntimeResult<f64> {
        match self {
            Val::Int(i) => Ok(*i as f64),
            Val::Real(r) => Ok(*r),
            Val::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Val::Null => Ok(0.0),
            Val::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| RuntimeError::invalid(format!("cannot convert \"{s}\" to real"))),
            other => Err(RuntimeError::type_error("to_real", "number or string", other.type_name())),
        }
    }

    /// String coercion used by concatenation and interpolation
    pub fn to_display_string(&self) -> RuntimeResult<String> {
        match self {
            Val::Str(s) => Ok(s.to_string()),
            Val::Usr(u) => u.to_str(),
            other => Ok(other.to_string()),
        }
    }

    /// Ordering used by the relational operators
    ///
    /// Numbers compare after promotion, strings lexicographically, bools with
    /// `false < true`. Any other combination is not ordered.
    #[must_use]
    pub fn compare(&self, other: &Val) -> Option<Ordering> {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Some(a.cmp(b)),
            (Val::Int(_) | Val::Real(_), Val::Int(_) | Val::Real(_)) => {
                self.as_real()?.partial_cmp(&other.as_real()?)
            }
            (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
            (Val::Bool(a), Val::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Project into JSON
    ///
    /// A list or map that contains itself cannot be encoded.
    pub fn to_json(&self) -> RuntimeResult<serde_json::Value> {
        self.to_json_guarded(&mut Vec::new())
    }

    fn to_json_guarded(&self, seen: &mut Vec<usize>) -> RuntimeResult<serde_json::Value> {
        use serde_json::Value as Json;
        if let Some(id) = self.container_id() {
            if seen.contains(&id) {
                return Err(RuntimeError::invalid("json encoding: value contains itself"));
            }
            seen.push(id);
        }
        let json = match self {
            Val::Null => Json::Null,
            Val::Int(i) => Json::from(*i),
            Val::Real(r) => serde_json::Number::from_f64(*r).map_or(Json::Null, Json::Number),
            Val::Bool(b) => Json::Bool(*b),
            Val::Str(s) => Json::String(s.to_string()),
            Val::Pair(p) => Json::Array(vec![p.0.to_json_guarded(seen)?, p.1.to_json_guarded(seen)?]),
            Val::List(l) => Json::Array(
                l.read()
                    .iter()
                    .map(|v| v.to_json_guarded(seen))
                    .collect::<RuntimeResult<Vec<_>>>()?,
            ),
            Val::Map(m) => {
                let mut object = serde_json::Map::new();
                for (k, v) in m.read().iter() {
                    object.insert(k.clone(), v.to_json_guarded(seen)?);
                }
                Json::Object(object)
            }
            Val::Regexp(re) => Json::String(re.as_str().to_string()),
            Val::Usr(u) => u.to_json()?,
            other => {
                return Err(RuntimeError::type_error(
                    "json encoding",
                    "data value",
                    other.type_name(),
                ))
            }
        };
        if self.container_id().is_some() {
            seen.pop();
        }
        Ok(json)
    }

    /// Identity of a list or map, for walks that must not revisit one
    fn container_id(&self) -> Option<usize> {
        match self {
            Val::List(l) => Some(Arc::as_ptr(l) as usize),
            Val::Map(m) => Some(Arc::as_ptr(m) as usize),
            _ => None,
        }
    }

    /// Build a value from JSON
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Val {
        use serde_json::Value as Json;
        match json {
            Json::Null => Val::Null,
            Json::Bool(b) => Val::Bool(*b),
            Json::Number(n) => n
                .as_i64()
                .map(Val::Int)
                .or_else(|| n.as_f64().map(Val::Real))
                .unwrap_or(Val::Null),
            Json::String(s) => Val::string(s),
            Json::Array(items) => Val::list(items.iter().map(Val::from_json).collect()),
            Json::Object(object) => Val::map(object.iter().map(|(k, v)| (k.clone(), Val::from_json(v)))),
        }
    }

    /// Map key coercion: strings are used as-is, scalars are stringified
    pub fn to_key(&self) -> RuntimeResult<String> {
        match self {
            Val::Str(s) => Ok(s.to_string()),
            Val::Int(_) | Val::Real(_) | Val::Bool(_) => Ok(self.to_string()),
            other => Err(RuntimeErrorKind::TypeError {
                expected: "string",
                got: other.type_name(),
                operation: "map key",
            }
            .into()),
        }
    }
}

impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        equal(self, other, &mut Vec::new())
    }
}

/// Structural equality; a pair of containers met again while still being
/// compared counts as equal, so cyclic values terminate
fn equal(a: &Val, b: &Val, seen: &mut Vec<(usize, usize)>) -> bool {
    match (a, b) {
        (Val::Null, Val::Null) => true,
        (Val::Int(a), Val::Int(b)) => a == b,
        (Val::Real(a), Val::Real(b)) => a == b,
        (Val::Int(a), Val::Real(b)) | (Val::Real(b), Val::Int(a)) => (*a as f64) == *b,
        (Val::Bool(a), Val::Bool(b)) => a == b,
        (Val::Str(a), Val::Str(b)) => a == b,
        (Val::Pair(x), Val::Pair(y)) => {
            Arc::ptr_eq(x, y) || (equal(&x.0, &y.0, seen) && equal(&x.1, &y.1, seen))
        }
        (Val::List(x), Val::List(y)) => {
            if Arc::ptr_eq(x, y) {
                return true;
            }
            let ids = (Arc::as_ptr(x) as usize, Arc::as_ptr(y) as usize);
            if seen.contains(&ids) {
                return true;
            }
            seen.push(ids);
            let same = {
                let (x, y) = (x.read(), y.read());
                x.len() == y.len() && x.iter().zip(y.iter()).all(|(v, w)| equal(v, w, seen))
            };
            seen.pop();
            same
        }
        (Val::Map(x), Val::Map(y)) => {
            if Arc::ptr_eq(x, y) {
                return true;
            }
            let ids = (Arc::as_ptr(x) as usize, Arc::as_ptr(y) as usize);
            if seen.contains(&ids) {
                return true;
            }
            seen.push(ids);
            let same = {
                let (x, y) = (x.read(), y.read());
                x.len() == y.len()
                    && x.iter()
                        .zip(y.iter())
                        .all(|((k, v), (l, w))| k == l && equal(v, w, seen))
            };
            seen.pop();
            same
        }
        (Val::Regexp(a), Val::Regexp(b)) => a.as_str() == b.as_str(),
        (Val::Iter(a), Val::Iter(b)) => Arc::ptr_eq(a, b),
        (Val::Closure(a), Val::Closure(b)) => Arc::ptr_eq(a, b),
        (Val::Usr(a), Val::Usr(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        _ => false,
    }
}

/// Render a real so that integral values keep a decimal point
fn format_real(f: &mut fmt::Formatter<'_>, r: f64) -> fmt::Result {
    if r.is_finite() && r.fract() == 0.0 && r.abs() < 1e16 {
        write!(f, "{r:.1}")
    } else {
        write!(f, "{r}")
    }
}

/// Nested rendering: strings inside containers are quoted, and a list or
/// map already being written prints as `[...]` or `{...}`
fn format_nested(f: &mut fmt::Formatter<'_>, v: &Val, seen: &mut Vec<usize>) -> fmt::Result {
    match v {
        Val::Str(s) => write!(f, "{:?}", &**s),
        other => format_val(f, other, seen),
    }
}

fn format_val(f: &mut fmt::Formatter<'_>, v: &Val, seen: &mut Vec<usize>) -> fmt::Result {
    match v {
        Val::Null => write!(f, "null"),
        Val::Int(i) => write!(f, "{i}"),
        Val::Real(r) => format_real(f, *r),
        Val::Bool(b) => write!(f, "{b}"),
        Val::Str(s) => write!(f, "{s}"),
        Val::Pair(p) => {
            write!(f, "(")?;
            format_nested(f, &p.0, seen)?;
            write!(f, ", ")?;
            format_nested(f, &p.1, seen)?;
            write!(f, ")")
        }
        Val::List(l) => {
            let id = Arc::as_ptr(l) as usize;
            if seen.contains(&id) {
                return write!(f, "[...]");
            }
            seen.push(id);
            write!(f, "[")?;
            for (i, v) in l.read().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                format_nested(f, v, seen)?;
            }
            seen.pop();
            write!(f, "]")
        }
        Val::Map(m) => {
            let id = Arc::as_ptr(m) as usize;
            if seen.contains(&id) {
                return write!(f, "{{...}}");
            }
            seen.push(id);
            write!(f, "{{")?;
            for (i, (k, v)) in m.read().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k:?}: ")?;
                format_nested(f, v, seen)?;
            }
            seen.pop();
            write!(f, "}}")
        }
        Val::Regexp(re) => write!(f, "r{:?}", re.as_str()),
        Val::Iter(_) => write!(f, "<iter>"),
        Val::Closure(c) => write!(f, "{c}"),
        Val::Usr(u) => write!(f, "<{}>", u.info()),
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_val(f, self, &mut Vec::new())
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Str(s) => write!(f, "{:?}", &**s),
            other => write!(f, "{other}"),
        }
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<f64> for Val {
    fn from(r: f64) -> Self {
        Val::Real(r)
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::string(s)
    }
}

impl From<String> for Val {
    fn from(s: String) -> Self {
        Val::Str(Arc::from(s))
    }
}

impl From<Vec<Val>> for Val {
    fn from(values: Vec<Val>) -> Self {
        Val::list(values)
    }
}
