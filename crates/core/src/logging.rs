//! Centralized logging configuration for the emulation core.
//!
//! The core never writes to stderr on its own; every diagnostic goes
//! through a category/level gate so a frontend (or a test) can switch on
//! exactly the subsystem it is chasing without recompiling.
//!
//! # Architecture
//!
//! - **LogConfig**: thread-safe global configuration using atomic operations
//! - **LogLevel**: hierarchical log levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: one per chip plus the driver
//!
//! # Usage
//!
//! ```rust
//! use vcs_core::logging::{LogConfig, LogLevel, LogCategory};
//!
//! LogConfig::global().set_level(LogCategory::Tia, LogLevel::Debug);
//!
//! if LogConfig::global().should_log(LogCategory::Tia, LogLevel::Info) {
//!     eprintln!("TIA: something happened");
//! }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(val: u8) -> Self {
        match val {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category, one per emulated chip plus the master clock driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    /// 6507 execution (instruction flow, faults)
    Cpu,
    /// Address decoding and floating-bus traffic
    Bus,
    /// Pixel pipeline, strobes, HMOVE, audio registers
    Tia,
    /// RAM, timer, ports
    Riot,
    /// Mapper hot-spots and coprocessor activity
    Cartridge,
    /// Frame detection and specification changes
    Television,
    /// Master clock, rewind, replay
    Driver,
}

/// Global logging configuration
pub struct LogConfig {
    /// Global log level (applies to all categories unless overridden)
    global_level: AtomicU8,
    cpu_level: AtomicU8,
    bus_level: AtomicU8,
    tia_level: AtomicU8,
    riot_level: AtomicU8,
    cartridge_level: AtomicU8,
    television_level: AtomicU8,
    driver_level: AtomicU8,
}

impl LogConfig {
    const fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            cpu_level: AtomicU8::new(LogLevel::Off as u8),
            bus_level: AtomicU8::new(LogLevel::Off as u8),
            tia_level: AtomicU8::new(LogLevel::Off as u8),
            riot_level: AtomicU8::new(LogLevel::Off as u8),
            cartridge_level: AtomicU8::new(LogLevel::Off as u8),
            television_level: AtomicU8::new(LogLevel::Off as u8),
            driver_level: AtomicU8::new(LogLevel::Off as u8),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        static INSTANCE: LogConfig = LogConfig::new();
        &INSTANCE
    }

    /// Set the global log level (applies to all categories unless overridden)
    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level.to_u8(), Ordering::Relaxed);
    }

    /// Get the global log level
    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    fn slot(&self, category: LogCategory) -> &AtomicU8 {
        match category {
            LogCategory::Cpu => &self.cpu_level,
            LogCategory::Bus => &self.bus_level,
            LogCategory::Tia => &self.tia_level,
            LogCategory::Riot => &self.riot_level,
            LogCategory::Cartridge => &self.cartridge_level,
            LogCategory::Television => &self.television_level,
            LogCategory::Driver => &self.driver_level,
        }
    }

    /// Set log level for a specific category
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.slot(category).store(level.to_u8(), Ordering::Relaxed);
    }

    /// Get log level for a specific category
    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.slot(category).load(Ordering::Relaxed))
    }

    /// Check if a message should be logged for the given category and level
    ///
    /// Returns true if:
    /// 1. The category-specific level is set and >= the message level, OR
    /// 2. The category-specific level is Off AND the global level >= the message level
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in [
            LogCategory::Cpu,
            LogCategory::Bus,
            LogCategory::Tia,
            LogCategory::Riot,
            LogCategory::Cartridge,
            LogCategory::Television,
            LogCategory::Driver,
        ] {
            self.set_level(category, LogLevel::Off);
        }
    }
}

/// Convenience macro for logging
#[macro_export]
macro_rules! log {
    ($category:expr, $level:expr, $($arg:tt)*) => {
        if $crate::logging::LogConfig::global().should_log($category, $level) {
            eprintln!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::parse("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::parse("ERR"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::parse("4"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("TRACE"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("invalid"), None);
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_category_level_overrides_global() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Error);
        config.set_level(LogCategory::Tia, LogLevel::Debug);

        assert!(config.should_log(LogCategory::Tia, LogLevel::Debug));

        // RIOT has no specific level set, falls back to global
        assert!(!config.should_log(LogCategory::Riot, LogLevel::Warn));
        assert!(config.should_log(LogCategory::Riot, LogLevel::Error));
    }

    #[test]
    fn test_reset() {
        let config = LogConfig::new();
        config.set_global_level(LogLevel::Trace);
        config.set_level(LogCategory::Cpu, LogLevel::Debug);

        config.reset();

        assert_eq!(config.get_global_level(), LogLevel::Off);
        assert_eq!(config.get_level(LogCategory::Cpu), LogLevel::Off);
    }
}
