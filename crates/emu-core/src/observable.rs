//! Read-only state inspection for debuggers and tests.
//!
//! Queries never touch emulation state: no contention, no side effects.

use std::fmt;

/// A dynamically-typed value returned by a state query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    String(String),
}

impl Value {
    /// Widen any numeric value to `u64`. Booleans map to 0/1.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Bool(v) => Some(u64::from(v)),
            Value::U8(v) => Some(u64::from(v)),
            Value::U16(v) => Some(u64::from(v)),
            Value::U32(v) => Some(u64::from(v)),
            Value::U64(v) => Some(v),
            Value::String(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "${v:02X}"),
            Value::U16(v) => write!(f, "${v:04X}"),
            Value::U32(v) => write!(f, "${v:08X}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from!(bool => Bool, u8 => U8, u16 => U16, u32 => U32, u64 => U64, String => String);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// A component whose state can be inspected by path.
pub trait Observable {
    /// Query a property by dotted path, e.g. `pc`, `flags.z`, `cpu.hl`.
    ///
    /// Returns `None` if the path is not recognised.
    fn query(&self, path: &str) -> Option<Value>;

    /// All paths `query()` understands. Placeholders are written `<name>`.
    fn query_paths(&self) -> &'static [&'static str];
}
