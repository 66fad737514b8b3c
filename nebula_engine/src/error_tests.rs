//! Unit tests for error.rs
//!
//! Tests the Error variants and their implementations (Display, Clone, std::error::Error).

use crate::error::{Error, Result};

// ============================================================================
// DISPLAY
// ============================================================================

#[test]
fn test_error_display_messages() {
    let err = Error::BackendError("vkCreateDevice failed".to_string());
    assert!(format!("{}", err).contains("Backend error"));
    assert!(format!("{}", err).contains("vkCreateDevice failed"));

    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");

    let err = Error::InvalidResource("texture has no color usage".to_string());
    assert!(format!("{}", err).contains("Invalid resource"));

    let err = Error::InitializationFailed("no graphics queue family".to_string());
    assert!(format!("{}", err).contains("Initialization failed"));
    assert!(format!("{}", err).contains("no graphics queue family"));
}

// ============================================================================
// TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_debug_and_clone() {
    let err = Error::BackendError("swapchain lost".to_string());
    assert!(format!("{:?}", err).contains("BackendError"));

    let cloned = err.clone();
    assert_eq!(format!("{}", err), format!("{}", cloned));
}

// ============================================================================
// RESULT / PROPAGATION
// ============================================================================

#[test]
fn test_error_propagation_with_question_mark() {
    fn inner() -> Result<u32> {
        Err(Error::InvalidResource("missing attachment".to_string()))
    }

    fn outer() -> Result<u32> {
        let v = inner()?;
        Ok(v + 1)
    }

    assert!(outer().is_err());
}

#[test]
fn test_result_type_ok() {
    fn returns_ok() -> Result<i32> {
        Ok(42)
    }

    assert_eq!(returns_ok().unwrap(), 42);
}
