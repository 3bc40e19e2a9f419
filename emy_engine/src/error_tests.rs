//! Unit tests for error.rs

use crate::error::{Error, Result};

// ============================================================================
// Display
// ============================================================================

#[test]
fn test_display_carries_message() {
    let cases = [
        (Error::BackendError("vkQueueSubmit returned -4".to_string()), "Backend error", "-4"),
        (Error::InvalidResource("mesh 'cube' not registered".to_string()), "Invalid resource", "cube"),
        (Error::InitializationFailed("no GPU".to_string()), "Initialization failed", "no GPU"),
        (Error::InvalidState("command list not recording".to_string()), "Invalid state", "not recording"),
    ];

    for (err, prefix, detail) in cases {
        let display = err.to_string();
        assert!(display.starts_with(prefix), "{}", display);
        assert!(display.contains(detail), "{}", display);
    }
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(Error::OutOfMemory.to_string(), "Out of GPU memory");
}

// ============================================================================
// Trait implementations
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::InvalidState("swapchain lost".to_string());
    let boxed: Box<dyn std::error::Error> = Box::new(err);
    assert!(boxed.to_string().contains("swapchain lost"));
}

#[test]
fn test_error_clone_keeps_variant() {
    let err = Error::InvalidResource("texture".to_string());
    let cloned = err.clone();
    assert!(matches!(cloned, Error::InvalidResource(ref msg) if msg == "texture"));
}

// ============================================================================
// Propagation
// ============================================================================

#[test]
fn test_question_mark_propagates_first_error() {
    fn create_stage(fail: bool) -> Result<u32> {
        if fail {
            Err(Error::BackendError("vkCreateShaderModule failed".to_string()))
        } else {
            Ok(1)
        }
    }

    fn create_pipeline() -> Result<u32> {
        let vertex = create_stage(false)?;
        let fragment = create_stage(true)?;
        Ok(vertex + fragment)
    }

    let err = create_pipeline().unwrap_err();
    assert!(err.to_string().contains("vkCreateShaderModule"));
}
