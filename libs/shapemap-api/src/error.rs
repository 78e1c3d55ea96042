use std::fmt;

/// Error kind for value-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueErrorKind {
    /// A type-erased value was not of the type its descriptor promised.
    TypeMismatch,
    /// A scalar could not be represented in the target primitive.
    Conversion,
    /// A value could not be constructed (no default, wrong length, ...).
    Construct,
}

/// Value error, returned by descriptor accessors and scalar conversions.
#[derive(Debug, Clone)]
pub struct ValueError {
    pub kind: ValueErrorKind,
    pub message: String,
}

impl ValueError {
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self { kind: ValueErrorKind::TypeMismatch, message: msg.into() }
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self { kind: ValueErrorKind::Conversion, message: msg.into() }
    }

    pub fn construct(msg: impl Into<String>) -> Self {
        Self { kind: ValueErrorKind::Construct, message: msg.into() }
    }

    /// Mismatch against the expected concrete type `T`.
    pub fn expected<T: ?Sized>() -> Self {
        Self::type_mismatch(format!("expected a value of type {}", std::any::type_name::<T>()))
    }

    /// Add context to the error, preserving the original kind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ValueError {}
