//! Raw caller-supplied columns.
//!
//! The host hands data over as an ordered set of named columns whose values
//! are untyped. [`RawValue`] is the tagged union this layer understands;
//! semantic types are assigned later by specification inference.

use std::borrow::Cow;

/// A single untyped value from the host.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// A numeric value.
    Number(f64),
    /// A textual value. May still be numeric-as-text ("3.5").
    Text(String),
    /// A missing value.
    Null,
}

impl RawValue {
    /// Interpret the value as a finite number, if possible.
    ///
    /// Textual values are parsed; non-finite results count as non-numeric so
    /// that inference stays deterministic across platforms.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n).filter(|n| n.is_finite()),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::Null => None,
        }
    }

    /// The textual form of the value, used for vocabulary construction.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Number(n) => Some(Cow::Owned(format!("{n}"))),
            Self::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Self::Null => None,
        }
    }

    /// Whether the value is missing.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A named column of raw values, in caller row order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    name: String,
    values: Vec<RawValue>,
}

impl RawColumn {
    /// Create a column from any values convertible to [`RawValue`].
    pub fn new<V: Into<RawValue>>(name: impl Into<String>, values: Vec<V>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Convenience constructor for a numeric column.
    pub fn numeric(name: impl Into<String>, values: &[f64]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|&v| RawValue::Number(v)).collect(),
        }
    }

    /// Convenience constructor for a textual column.
    pub fn text<S: AsRef<str>>(name: impl Into<String>, values: &[S]) -> Self {
        Self {
            name: name.into(),
            values: values
                .iter()
                .map(|v| RawValue::Text(v.as_ref().to_string()))
                .collect(),
        }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values in row order.
    pub fn values(&self) -> &[RawValue] {
        &self.values
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_parsing() {
        assert_eq!(RawValue::Number(2.5).as_number(), Some(2.5));
        assert_eq!(RawValue::Text(" 3.5 ".into()).as_number(), Some(3.5));
        assert_eq!(RawValue::Text("abc".into()).as_number(), None);
        assert_eq!(RawValue::Text("inf".into()).as_number(), None);
        assert_eq!(RawValue::Null.as_number(), None);
        assert_eq!(RawValue::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn textual_form() {
        assert_eq!(RawValue::Text("red".into()).as_text().unwrap(), "red");
        assert_eq!(RawValue::Number(1.0).as_text().unwrap(), "1");
        assert!(RawValue::Null.as_text().is_none());
    }

    #[test]
    fn column_constructors() {
        let col = RawColumn::numeric("x", &[1.0, 2.0]);
        assert_eq!(col.name(), "x");
        assert_eq!(col.len(), 2);

        let col = RawColumn::text("y", &["a", "b", "c"]);
        assert_eq!(col.values()[2], RawValue::Text("c".into()));

        let col = RawColumn::new("mixed", vec![RawValue::Number(1.0), RawValue::Null]);
        assert!(col.values()[1].is_null());
    }
}
