// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides unified error handling and type aliases.

use crate::error::LazyImageError;

#[cfg(feature = "napi")]
use napi::bindgen_prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Unified Result type that works with or without NAPI.
/// When NAPI is enabled, uses napi::Result.
/// When NAPI is disabled, uses std::result::Result<T, LazyImageError>.
#[cfg(feature = "napi")]
pub type EngineResult<T> = Result<T>;

#[cfg(not(feature = "napi"))]
pub type EngineResult<T> = std::result::Result<T, LazyImageError>;

// to_engine_error removed - it was unused.
// Each module (decoder, encoder, pipeline, tasks) has its own error conversion helper
// that matches its specific Result type (DecoderResult, EncoderResult, etc.).

/// Convert a Result that may be napi::Result or std::result::Result to EngineResult.
/// This macro helps eliminate duplicate cfg blocks in stress.rs.
#[macro_export]
macro_rules! convert_result {
    ($result:expr) => {{
        #[cfg(feature = "napi")]
        {
            $result.map_err(|e| crate::error::LazyImageError::decode_failed(e.to_string()))?
        }
        #[cfg(not(feature = "napi"))]
        {
            $result?
        }
    }};
}

/// Run `f` under `catch_unwind`, converting a codec panic into a structured
/// `InternalPanic` error instead of taking down the whole process. Every
/// decode/encode entry point in this crate is wrapped with this so a single
/// malformed input can't crash a worker thread silently.
pub fn run_with_panic_policy<T>(
    label: &'static str,
    f: impl FnOnce() -> std::result::Result<T, LazyImageError>,
) -> std::result::Result<T, LazyImageError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_payload_message(&payload);
            tracing::error!(stage = label, panic_message = %message, "codec panicked");
            Err(LazyImageError::internal_panic(format!(
                "{label} panicked: {message}"
            )))
        }
    }
}

fn panic_payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
