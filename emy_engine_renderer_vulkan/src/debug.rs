/// Vulkan Debug Messenger - Handles validation layer messages
///
/// Console output goes through the engine logger; file output is appended
/// as plain text. Compiled only with the `vulkan-validation` feature.

use ash::vk;
use colored::*;
use emy_engine::emy::render::{DebugSeverity, DebugOutput, DebugMessageFilter, ValidationStats};
use emy_engine::{engine_debug, engine_info, engine_warn, engine_error};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Log source of validation layer messages
const VALIDATION_SOURCE: &str = "emy::vulkan::validation";

/// Global debug configuration (shared across callbacks)
static DEBUG_CONFIG: Mutex<Option<Config>> = Mutex::new(None);

/// Global validation statistics (thread-safe atomic counters)
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Global message tracker for grouping identical messages
static MESSAGE_TRACKER: Mutex<Option<MessageTracker>> = Mutex::new(None);

/// Debug configuration for the callback
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub severity: DebugSeverity,
    pub output: DebugOutput,
    pub message_filter: DebugMessageFilter,
    pub break_on_error: bool,
    pub panic_on_error: bool,
    pub enable_stats: bool,
}

/// Thread-safe validation statistics tracker
struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn increment(&self, level: MessageLevel) {
        let counter = match level {
            MessageLevel::Error => &self.errors,
            MessageLevel::Warning => &self.warnings,
            MessageLevel::Info => &self.info,
            MessageLevel::Verbose => &self.verbose,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Message tracker for grouping identical messages
#[derive(Default)]
struct MessageTracker {
    messages: FxHashMap<String, u32>,
}

impl MessageTracker {
    fn track_message(&mut self, message: &str) -> u32 {
        let count = self.messages.entry(message.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn duplicate_count(&self) -> usize {
        self.messages.values().filter(|&&count| count > 1).count()
    }
}

/// Severity of a validation message, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageLevel {
    Error,
    Warning,
    Info,
    Verbose,
}

impl MessageLevel {
    pub(crate) fn from_vk(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            MessageLevel::Error
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            MessageLevel::Warning
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            MessageLevel::Info
        } else {
            MessageLevel::Verbose
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MessageLevel::Error => "ERROR",
            MessageLevel::Warning => "WARNING",
            MessageLevel::Info => "INFO",
            MessageLevel::Verbose => "VERBOSE",
        }
    }
}

/// Message category label ("Validation", "Performance" or "General")
pub(crate) fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

/// Messenger severity mask for a configured severity
pub(crate) fn severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

/// Whether a message passes the configured severity and category filters
pub(crate) fn should_display(
    config: &Config,
    level: MessageLevel,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
) -> bool {
    let severity_ok = match config.severity {
        DebugSeverity::ErrorsOnly => level == MessageLevel::Error,
        DebugSeverity::ErrorsAndWarnings => matches!(level, MessageLevel::Error | MessageLevel::Warning),
        DebugSeverity::All => true,
    };
    if !severity_ok {
        return false;
    }

    match message_type_label(message_type) {
        "Validation" => config.message_filter.show_validation,
        "Performance" => config.message_filter.show_performance,
        _ => config.message_filter.show_general,
    }
}

/// Initialize debug configuration
pub(crate) fn init_debug_config(config: Config) {
    // Reset statistics when initializing
    VALIDATION_STATS.reset();

    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = Some(MessageTracker::default());
    }
    if let Ok(mut debug_config) = DEBUG_CONFIG.lock() {
        *debug_config = Some(config);
    }
}

/// Drop the configuration so late callbacks are ignored
pub(crate) fn cleanup_debug_config() {
    if let Ok(mut debug_config) = DEBUG_CONFIG.lock() {
        *debug_config = None;
    }
}

/// Get current validation statistics
pub fn get_validation_stats() -> ValidationStats {
    VALIDATION_STATS.get_stats()
}

/// Print validation statistics report
pub fn print_validation_stats_report() {
    let stats = get_validation_stats();

    if stats.total() == 0 {
        println!("\n{}", "No validation messages".green().bold());
        return;
    }

    println!("\n{}", "=== Validation Statistics Report ===".bright_blue().bold());

    if stats.errors > 0 {
        println!("  {} {}", "Errors:".red().bold(), stats.errors);
    }
    if stats.warnings > 0 {
        println!("  {} {}", "Warnings:".yellow().bold(), stats.warnings);
    }
    if stats.info > 0 {
        println!("  {} {}", "Info:".cyan(), stats.info);
    }
    if stats.verbose > 0 {
        println!("  {} {}", "Verbose:".bright_black(), stats.verbose);
    }

    println!("  {} {}", "Total:".white().bold(), stats.total());

    let duplicates = MESSAGE_TRACKER
        .lock()
        .ok()
        .and_then(|tracker| tracker.as_ref().map(MessageTracker::duplicate_count))
        .unwrap_or(0);
    if duplicates > 0 {
        println!("\n  {} message(s) appeared multiple times", duplicates);
    }

    println!("{}\n", "====================================".bright_blue().bold());
}

/// Vulkan debug messenger callback
///
/// Called by the validation layers. Filters, counts and routes the message
/// according to the configuration set by `init_debug_config`.
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    let config = match DEBUG_CONFIG.lock() {
        Ok(guard) => match guard.as_ref() {
            Some(cfg) => cfg.clone(),
            None => return vk::FALSE,
        },
        Err(_) => return vk::FALSE,
    };

    let level = MessageLevel::from_vk(message_severity);
    if !should_display(&config, level, message_type) {
        return vk::FALSE;
    }

    let type_str = message_type_label(message_type);

    let occurrence_count = if config.enable_stats {
        VALIDATION_STATS.increment(level);
        match MESSAGE_TRACKER.lock() {
            Ok(mut guard) => guard.get_or_insert_with(MessageTracker::default).track_message(message),
            Err(_) => 1,
        }
    } else {
        1
    };

    let repeat_indicator = if occurrence_count > 1 {
        format!(" [x{}]", occurrence_count)
    } else {
        String::new()
    };

    match &config.output {
        DebugOutput::Console => {
            log_to_engine(level, type_str, &repeat_indicator, message_id_name, message);
        }
        DebugOutput::File(path) => {
            write_to_file(path, &format_file_message(level, type_str, &repeat_indicator, message_id_name, message));
        }
        DebugOutput::Both(path) => {
            log_to_engine(level, type_str, &repeat_indicator, message_id_name, message);
            write_to_file(path, &format_file_message(level, type_str, &repeat_indicator, message_id_name, message));
        }
    }

    if level == MessageLevel::Error {
        // Strict mode
        if config.panic_on_error {
            panic!(
                "Vulkan validation error (panic_on_error)\nMessage ID: {}\nType: {}\nMessage: {}",
                message_id_name, type_str, message
            );
        }

        // Debugger attachment point
        if config.break_on_error {
            eprintln!(
                "\n{}\n  Context: {} [{}]\n  Message: {}\n",
                "BREAK ON VALIDATION ERROR - Aborting execution".red().bold(),
                message_id_name.yellow(),
                type_str.cyan(),
                message.white()
            );
            std::process::abort();
        }
    }

    vk::FALSE
}

fn log_to_engine(level: MessageLevel, type_str: &str, repeat_indicator: &str, message_id: &str, message: &str) {
    match level {
        MessageLevel::Error => engine_error!(VALIDATION_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id, message),
        MessageLevel::Warning => engine_warn!(VALIDATION_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id, message),
        MessageLevel::Info => engine_info!(VALIDATION_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id, message),
        MessageLevel::Verbose => engine_debug!(VALIDATION_SOURCE, "[{}]{} {}: {}", type_str, repeat_indicator, message_id, message),
    }
}

/// Plain-text form of a message for the log file
pub(crate) fn format_file_message(
    level: MessageLevel,
    type_str: &str,
    repeat_indicator: &str,
    message_id: &str,
    message: &str,
) -> String {
    format!(
        "[VULKAN {}] [{}]{}\n  Message ID: {}\n  {}\n",
        level.label(), type_str, repeat_indicator, message_id, message
    )
}

/// Append message to log file
fn write_to_file(path: &str, message: &str) {
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        let _ = writeln!(file, "{}", message);
    }
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
