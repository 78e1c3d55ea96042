use std::any::Any;
use std::fmt;

use crate::error::ValueError;

/// Owned type-erased value, as produced by routines and descriptor functions.
pub type AnyBox = Box<dyn Any>;

/// Canonical intermediate for primitive → primitive conversion.
///
/// Strategy by type:
/// - Integers of every width: `Int(i128)`, range-checked on the way out
/// - `f32`/`f64`: `Float(f64)`
/// - `String`: `Text`, parsed on the way out
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i128),
    Float(f64),
    Char(char),
    Text(String),
}

impl Scalar {
    /// Short name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Bool(_) => "bool",
            Scalar::Int(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Char(_) => "char",
            Scalar::Text(_) => "text",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Char(v) => write!(f, "{v}"),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

/// Borrow a type-erased value as `T`.
pub fn downcast<T: Any>(value: &dyn Any) -> Result<&T, ValueError> {
    value.downcast_ref::<T>().ok_or_else(ValueError::expected::<T>)
}

/// Mutably borrow a type-erased value as `T`.
pub fn downcast_mut<T: Any>(value: &mut dyn Any) -> Result<&mut T, ValueError> {
    value.downcast_mut::<T>().ok_or_else(ValueError::expected::<T>)
}

/// Take ownership of a boxed type-erased value as `T`.
pub fn unbox<T: Any>(value: AnyBox) -> Result<T, ValueError> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| ValueError::expected::<T>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbox_rejects_wrong_type() {
        let boxed: AnyBox = Box::new(5_i32);
        let err = unbox::<String>(boxed).unwrap_err();
        assert_eq!(err.kind, crate::error::ValueErrorKind::TypeMismatch);
        assert!(err.message.contains("String"));
    }

    #[test]
    fn scalar_display_matches_source_text() {
        assert_eq!(Scalar::Int(-3).to_string(), "-3");
        assert_eq!(Scalar::Bool(true).to_string(), "true");
        assert_eq!(Scalar::Text("abc".into()).to_string(), "abc");
        assert_eq!(Scalar::Float(1.5).to_string(), "1.5");
    }
}
