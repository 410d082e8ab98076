//! Helper macros shared across gallery-core services

/// Serialize data to a JSON string or bail with `InvalidInput`
#[doc(hidden)]
#[macro_export]
macro_rules! serialize {
    ($data:expr) => {
        match serde_json::to_string($data) {
            Ok(serial) => serial,
            Err(err) => {
                return $crate::bad!(format!("Failed to serialize value: {err}"));
            }
        }
    };
}

/// Deserialize a JSON string or bail with `InvalidInput`
#[doc(hidden)]
#[macro_export]
macro_rules! deserialize {
    ($data:expr) => {
        match serde_json::from_str($data) {
            Ok(value) => value,
            Err(err) => {
                return $crate::bad!(format!("Failed to deserialize value: {err}"));
            }
        }
    };
}

/// Treat a malformed or missing stored record as absent rather than erroring
///
/// Per the error handling design: "Malformed stored records are logged and
/// treated as absent (listings drop them; direct GETs return `NotFound`)."
#[doc(hidden)]
#[macro_export]
macro_rules! deserialize_or_absent {
    ($data:expr) => {
        match $data.as_deref().map(serde_json::from_str) {
            Some(Ok(value)) => Some(value),
            Some(Err(err)) => {
                tracing::event!(
                    tracing::Level::WARN,
                    error = %err,
                    "dropping malformed stored record"
                );
                None
            }
            None => None,
        }
    };
}
