//! Hyperparameter values, parameter sets, and grids.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CvError, ModelError};

/// A single hyperparameter value.
///
/// Human-readable formats (JSON) use the bare value: `null`, booleans,
/// integers, floats, strings. Binary formats use a tagged encoding since
/// they cannot infer the variant from the data.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Absent / unlimited (e.g. `max_depth: null`).
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Named option (e.g. `max_features: "sqrt"`).
    Text(String),
}

impl ParamValue {
    /// Interpret as a non-negative integer.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParamValue`] for non-integers and negatives.
    pub fn as_usize(&self, name: &str) -> Result<usize, ModelError> {
        let v = self.as_u64(name)?;
        usize::try_from(v).map_err(|_| self.invalid(name, "does not fit in usize"))
    }

    /// Interpret as an optional non-negative integer; `null` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParamValue`] for anything else.
    pub fn as_opt_usize(&self, name: &str) -> Result<Option<usize>, ModelError> {
        match self {
            ParamValue::Null => Ok(None),
            other => other.as_usize(name).map(Some),
        }
    }

    /// Interpret as a float; integers are widened.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParamValue`] for non-numeric values.
    pub fn as_f64(&self, name: &str) -> Result<f64, ModelError> {
        match self {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            _ => Err(self.invalid(name, "expected a number")),
        }
    }

    /// Interpret as an unsigned 64-bit integer, such as a seed.
    ///
    /// Values above `i64::MAX` are carried as decimal text (see
    /// `From<u64>`), so digit-only text is accepted too.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParamValue`] for non-integers and negatives.
    pub fn as_u64(&self, name: &str) -> Result<u64, ModelError> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Ok(*v as u64),
            ParamValue::Text(t) if !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()) => t
                .parse()
                .map_err(|_| self.invalid(name, "exceeds the unsigned 64-bit range")),
            _ => Err(self.invalid(name, "expected a non-negative integer")),
        }
    }

    /// Build an [`ModelError::InvalidParamValue`] for this value.
    #[must_use]
    pub fn invalid(&self, name: &str, reason: &str) -> ModelError {
        ModelError::InvalidParamValue {
            name: name.to_string(),
            value: self.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => f.write_str("null"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => write!(f, "\"{v}\""),
        }
    }
}

#[derive(Serialize, Deserialize)]
enum TaggedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&ParamValue> for TaggedValue {
    fn from(v: &ParamValue) -> Self {
        match v {
            ParamValue::Null => TaggedValue::Null,
            ParamValue::Bool(b) => TaggedValue::Bool(*b),
            ParamValue::Int(i) => TaggedValue::Int(*i),
            ParamValue::Float(x) => TaggedValue::Float(*x),
            ParamValue::Text(t) => TaggedValue::Text(t.clone()),
        }
    }
}

impl From<TaggedValue> for ParamValue {
    fn from(v: TaggedValue) -> Self {
        match v {
            TaggedValue::Null => ParamValue::Null,
            TaggedValue::Bool(b) => ParamValue::Bool(b),
            TaggedValue::Int(i) => ParamValue::Int(i),
            TaggedValue::Float(x) => ParamValue::Float(x),
            TaggedValue::Text(t) => ParamValue::Text(t),
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if !serializer.is_human_readable() {
            return TaggedValue::from(self).serialize(serializer);
        }
        match self {
            ParamValue::Null => serializer.serialize_unit(),
            ParamValue::Bool(v) => serializer.serialize_bool(*v),
            ParamValue::Int(v) => serializer.serialize_i64(*v),
            ParamValue::Float(v) => serializer.serialize_f64(*v),
            ParamValue::Text(v) => serializer.serialize_str(v),
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_any(PlainValueVisitor)
        } else {
            TaggedValue::deserialize(deserializer).map(ParamValue::from)
        }
    }
}

struct PlainValueVisitor;

impl<'de> Visitor<'de> for PlainValueVisitor {
    type Value = ParamValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null, a boolean, a number, or a string")
    }

    fn visit_unit<E: de::Error>(self) -> Result<ParamValue, E> {
        Ok(ParamValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<ParamValue, E> {
        Ok(ParamValue::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<ParamValue, E> {
        Ok(ParamValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ParamValue, E> {
        Ok(ParamValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ParamValue, E> {
        Ok(i64::try_from(v).map_or(ParamValue::Float(v as f64), ParamValue::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ParamValue, E> {
        Ok(ParamValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ParamValue, E> {
        Ok(ParamValue::Text(v.to_string()))
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::from(v as u64)
    }
}

/// `Int` when the value fits in `i64`, otherwise decimal `Text`, so that
/// [`ParamValue::as_u64`] recovers it exactly.
impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or_else(|_| ParamValue::Text(v.to_string()), ParamValue::Int)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<Option<usize>> for ParamValue {
    fn from(v: Option<usize>) -> Self {
        v.map_or(ParamValue::Null, ParamValue::from)
    }
}

/// One concrete assignment of hyperparameters, keyed by name.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// A hyperparameter grid: each name maps to its ordered candidate values.
///
/// Names iterate in lexicographic order, so candidate order is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamGrid {
    axes: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    /// Create an empty grid (a single candidate with no overrides).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an axis.
    #[must_use]
    pub fn with_axis<V: Into<ParamValue>>(
        mut self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.axes
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Number of candidates in the Cartesian product.
    #[must_use]
    pub fn n_candidates(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    /// Expand the Cartesian product in grid order.
    ///
    /// The last axis (lexicographically) varies fastest.
    ///
    /// # Errors
    ///
    /// Returns [`CvError::EmptyParamGrid`] if any axis has no values.
    pub fn candidates(&self) -> Result<Vec<ParamSet>, CvError> {
        if let Some((name, _)) = self.axes.iter().find(|(_, v)| v.is_empty()) {
            return Err(CvError::EmptyParamGrid { name: name.clone() });
        }

        let mut out: Vec<ParamSet> = vec![ParamSet::new()];
        for (name, values) in &self.axes {
            out = out
                .into_iter()
                .flat_map(|partial| {
                    values.iter().map(move |v| {
                        let mut next = partial.clone();
                        next.insert(name.clone(), v.clone());
                        next
                    })
                })
                .collect();
        }
        Ok(out)
    }
}
