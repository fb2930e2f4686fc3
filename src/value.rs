// Expression Value Model
// Runtime values, version tuples, and the inter-kind coercion rules

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// The closed set of value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Boolean,
    Number,
    String,
    Version,
    Array,
    Object,
    Null,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Boolean => "Boolean",
            Kind::Number => "Number",
            Kind::String => "String",
            Kind::Version => "Version",
            Kind::Array => "Array",
            Kind::Object => "Object",
            Kind::Null => "Null",
        };
        write!(f, "{}", name)
    }
}

/// A dotted version of two to four non-negative integer components.
///
/// `revision` is only present when `build` is. Components above `i32::MAX`
/// are rejected during parsing. Ordering is component-wise; an absent
/// component orders before any present one, so `1.2.3` and `1.2.3.0` are
/// distinct and `1.2.3 < 1.2.3.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build: Option<u32>,
    pub revision: Option<u32>,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }

    pub fn with_build(mut self, build: u32) -> Self {
        self.build = Some(build);
        self
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Parse a dotted version with 2-4 components.
    ///
    /// Each component must parse as a non-negative 32-bit signed integer.
    pub fn parse(text: &str) -> Option<Self> {
        let mut components = [None::<u32>; 4];
        let mut count = 0;
        for part in text.split('.') {
            if count == 4 {
                return None;
            }
            let value: i32 = part.parse().ok()?;
            components[count] = Some(u32::try_from(value).ok()?);
            count += 1;
        }
        if count < 2 {
            return None;
        }
        Some(Self {
            major: components[0]?,
            minor: components[1]?,
            build: components[2],
            revision: components[3],
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{}", build)?;
            if let Some(revision) = self.revision {
                write!(f, ".{}", revision)?;
            }
        }
        Ok(())
    }
}

/// Error from [`Version::from_str`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version string: '{0}'")]
pub struct ParseVersionError(pub String);

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ParseVersionError(s.to_string()))
    }
}

/// A runtime expression value.
///
/// Array and Object payloads are opaque handles into a caller-supplied
/// document; their equality is reference identity, never structural.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Number(Decimal),
    String(String),
    Version(Version),
    Array(Arc<Vec<Value>>),
    Object(Arc<HashMap<String, Value>>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Version(a), Value::Version(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Boolean(_) => Kind::Boolean,
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Version(_) => Kind::Version,
            Value::Array(_) => Kind::Array,
            Value::Object(_) => Kind::Object,
        }
    }

    /// Coerce to Boolean. Total: every kind has a truthiness.
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !n.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::Version(_) | Value::Array(_) | Value::Object(_) => true,
        }
    }

    /// Coerce to Number.
    ///
    /// Strings allow a leading sign, thousands separators in the integral
    /// part, a single decimal point, and surrounding whitespace. The empty
    /// string converts to zero.
    pub fn try_to_number(&self) -> Option<Decimal> {
        match self {
            Value::Null => Some(Decimal::ZERO),
            Value::Boolean(b) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
            Value::Number(n) => Some(*n),
            Value::String(s) if s.is_empty() => Some(Decimal::ZERO),
            Value::String(s) => parse_decimal(s),
            Value::Version(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Coerce to String. Arrays and objects have no string form.
    pub fn try_to_string(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Boolean(b) => Some(if *b { "True" } else { "False" }.to_string()),
            Value::Number(n) => Some(format_number(n)),
            Value::String(s) => Some(s.clone()),
            Value::Version(v) => Some(v.to_string()),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Coerce to Version.
    ///
    /// Numbers convert through their canonical string form and succeed only
    /// when that form has exactly one decimal point. Strings are trimmed and
    /// must hold 2-4 dotted components.
    pub fn try_to_version(&self) -> Option<Version> {
        match self {
            Value::Version(v) => Some(*v),
            Value::Number(n) => {
                let text = format_number(n);
                if text.bytes().filter(|&b| b == b'.').count() == 1 {
                    Version::parse(&text)
                } else {
                    None
                }
            }
            Value::String(s) => Version::parse(s.trim()),
            Value::Null | Value::Boolean(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn convert_to_number(&self) -> Result<Decimal, ConvertError> {
        self.try_to_number()
            .ok_or_else(|| ConvertError::new(self.clone(), Kind::Number))
    }

    pub fn convert_to_string(&self) -> Result<String, ConvertError> {
        self.try_to_string()
            .ok_or_else(|| ConvertError::new(self.clone(), Kind::String))
    }

    pub fn convert_to_version(&self) -> Result<Version, ConvertError> {
        self.try_to_version()
            .ok_or_else(|| ConvertError::new(self.clone(), Kind::Version))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Boolean(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Number(n) => write!(f, "{}", format_number(n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Version(v) => write!(f, "{}", v),
            Value::Array(_) => write!(f, "Array"),
            Value::Object(_) => write!(f, "Object"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(Decimal::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(Decimal::from(value))
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Version> for Value {
    fn from(value: Version) -> Self {
        Value::Version(value)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                let decimal = if let Some(i) = n.as_i64() {
                    Some(Decimal::from(i))
                } else if let Some(u) = n.as_u64() {
                    Some(Decimal::from(u))
                } else {
                    n.as_f64().and_then(Decimal::from_f64)
                };
                decimal.map(Value::Number).unwrap_or(Value::Null)
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(Arc::new(items.iter().map(Value::from).collect()))
            }
            serde_json::Value::Object(fields) => Value::Object(Arc::new(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from(value)))
                    .collect(),
            )),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::from(&value)
    }
}

/// Raised by demand-conversions when a value has no representation in the
/// requested kind.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("unable to convert value '{value}' from {from_kind} to {to_kind}")]
pub struct ConvertError {
    pub value: Value,
    pub from_kind: Kind,
    pub to_kind: Kind,
}

impl ConvertError {
    pub fn new(value: Value, to_kind: Kind) -> Self {
        let from_kind = value.kind();
        Self {
            value,
            from_kind,
            to_kind,
        }
    }
}

/// Canonical string form of a number: general format, trailing zeros after
/// the decimal point stripped, then a bare trailing point stripped.
pub(crate) fn format_number(value: &Decimal) -> String {
    if value.is_zero() {
        return "0".to_string();
    }
    value.normalize().to_string()
}

/// Case-insensitive ordinal string comparison with an ASCII A-Z fold.
pub(crate) fn cmp_ignore_ascii_case(a: &str, b: &str) -> Ordering {
    let left = a.bytes().map(|b| b.to_ascii_lowercase());
    let right = b.bytes().map(|b| b.to_ascii_lowercase());
    left.cmp(right)
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let unsigned = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
    let negative = trimmed.starts_with('-');
    let (integral, fraction) = match unsigned.split_once('.') {
        Some((integral, fraction)) => (integral, Some(fraction)),
        None => (unsigned, None),
    };
    if let Some(fraction) = fraction {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }

    // Thousands separators are legal only inside the integral digits.
    let bytes = integral.as_bytes();
    let mut digits = String::with_capacity(integral.len());
    for (i, &byte) in bytes.iter().enumerate() {
        match byte {
            b'0'..=b'9' => digits.push(byte as char),
            b',' => {
                let flanked = i > 0
                    && bytes[i - 1].is_ascii_digit()
                    && bytes.get(i + 1).is_some_and(|next| next.is_ascii_digit());
                if !flanked {
                    return None;
                }
            }
            _ => return None,
        }
    }
    if digits.is_empty() && fraction.is_none_or(str::is_empty) {
        return None;
    }

    let mut normalized = String::with_capacity(trimmed.len() + 2);
    if negative {
        normalized.push('-');
    }
    if digits.is_empty() {
        normalized.push('0');
    } else {
        normalized.push_str(&digits);
    }
    if let Some(fraction) = fraction {
        if !fraction.is_empty() {
            normalized.push('.');
            normalized.push_str(fraction);
        }
    }
    Decimal::from_str(&normalized).ok()
}
