use fifo_store::StoreError;
use shapemap_api::error::ValueError;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("config error: {0}")]
    Configuration(String),

    #[error("value error: {0}")]
    Value(#[from] ValueError),

    #[error("recursive routine for {0} is no longer reachable")]
    DanglingRecursion(String),
}

impl MapError {
    /// Add context to the error.
    ///
    /// For `Value` variant, context is added to the inner `ValueError`.
    /// For other variants, context is prepended to the message.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            MapError::Value(e) => MapError::Value(e.with_context(ctx)),
            MapError::Configuration(msg) => MapError::Configuration(format!("{ctx}: {msg}")),
            MapError::DanglingRecursion(msg) => {
                MapError::DanglingRecursion(format!("{ctx}: {msg}"))
            }
        }
    }
}

impl From<StoreError> for MapError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Config(msg) => MapError::Configuration(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapemap_api::error::ValueErrorKind;

    #[test]
    fn context_reaches_inner_value_error() {
        let err = MapError::from(ValueError::conversion("bad digit")).with_context("field 'age'");
        let MapError::Value(inner) = err else {
            panic!("expected a value error");
        };
        assert_eq!(inner.kind, ValueErrorKind::Conversion);
        assert!(inner.to_string().contains("field 'age'"));
        assert!(inner.to_string().contains("bad digit"));
    }

    #[test]
    fn context_prefixes_configuration_and_recursion_messages() {
        let err = MapError::Configuration("no route".into()).with_context("Order -> OrderDto");
        assert_eq!(err.to_string(), "config error: Order -> OrderDto: no route");

        let err = MapError::DanglingRecursion("Node -> NodeDto".into()).with_context("children");
        assert!(matches!(
            &err,
            MapError::DanglingRecursion(msg) if msg == "children: Node -> NodeDto"
        ));
    }

    #[test]
    fn store_config_errors_surface_as_configuration() {
        let err: MapError = StoreError::Config("capacity must be positive".into()).into();
        assert!(matches!(
            err,
            MapError::Configuration(ref msg) if msg == "capacity must be positive"
        ));
    }
}
