/// Emy Engine - process-wide services
///
/// Holds the global logger and the single-renderer guard. Everything else
/// (device, swapchain, scene) is owned by an explicitly constructed
/// `Renderer` and passed around by the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use crate::error::{Error, Result};
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Set while a renderer is alive
static RENDERER_ALIVE: AtomicBool = AtomicBool::new(false);

fn logger() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

// ===== PUBLIC API =====

/// Token proving that the holder is the only live renderer.
///
/// Released on drop, after which a new renderer can be constructed.
#[derive(Debug)]
pub struct RendererSlot {
    _private: (),
}

impl Drop for RendererSlot {
    fn drop(&mut self) {
        RENDERER_ALIVE.store(false, Ordering::Release);
    }
}

/// Process-wide engine services
pub struct Engine;

impl Engine {
    /// Claim the renderer slot.
    ///
    /// # Errors
    ///
    /// `InitializationFailed` if another renderer still holds the slot.
    pub fn claim_renderer_slot() -> Result<RendererSlot> {
        if RENDERER_ALIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            crate::engine_error!("emy::Engine", "There can't be two live renderers");
            return Err(Error::InitializationFailed(
                "A renderer already exists. Drop it before creating another one.".to_string(),
            ));
        }
        crate::engine_debug!("emy::Engine", "Renderer slot claimed");
        Ok(RendererSlot { _private: () })
    }

    /// Whether a renderer currently holds the slot
    pub fn renderer_alive() -> bool {
        RENDERER_ALIVE.load(Ordering::Acquire)
    }

    // ===== LOGGING API =====

    /// Replace the active logger
    ///
    /// # Example
    ///
    /// ```no_run
    /// use emy_engine::emy::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct Silent;
    /// impl Logger for Silent {
    ///     fn log(&self, _entry: &LogEntry) {}
    /// }
    ///
    /// Engine::set_logger(Silent);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger_impl: L) {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(logger_impl);
        }
    }

    /// Restore the DefaultLogger
    pub fn reset_logger() {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(DefaultLogger);
        }
    }

    /// Log without source location (used by engine_info!, engine_warn!, ...)
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        if let Ok(lock) = logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Log with file:line (used by engine_error!, engine_err!, ...)
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if let Ok(lock) = logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
