//! Logging utilities and structured logging support
//!
//! The engine logs through the `log` facade. Per-frame code paths that can hit
//! the same data problem every frame (an unknown semantic name, a texture on
//! an unsupported UV channel) use [`warn_once!`](crate::warn_once) and
//! [`log_once!`](crate::log_once), which remember the id of every message
//! already emitted and drop repeats.

pub use log::{debug, info, warn, error, trace};

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

/// Initialize the logging system
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize the logging system with a default filter, still honoring `RUST_LOG`
pub fn init_with_level(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

fn once_registry() -> &'static Mutex<HashSet<String>> {
    static REGISTRY: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Record `id`; returns true the first time an id is seen.
pub fn first_time(id: &str) -> bool {
    match once_registry().lock() {
        Ok(mut seen) => seen.insert(id.to_string()),
        Err(poisoned) => poisoned.into_inner().insert(id.to_string()),
    }
}

/// Forget `id` so its next once-message is emitted again.
pub fn forget_once(id: &str) {
    match once_registry().lock() {
        Ok(mut seen) => seen.remove(id),
        Err(poisoned) => poisoned.into_inner().remove(id),
    };
}

/// Emit a `warn!` only the first time `id` is seen.
#[macro_export]
macro_rules! warn_once {
    ($id:expr, $($arg:tt)+) => {
        if $crate::foundation::logging::first_time(&$id) {
            $crate::foundation::logging::warn!($($arg)+);
        }
    };
}

/// Emit an `info!` only the first time `id` is seen.
#[macro_export]
macro_rules! log_once {
    ($id:expr, $($arg:tt)+) => {
        if $crate::foundation::logging::first_time(&$id) {
            $crate::foundation::logging::info!($($arg)+);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_time_only_once_per_id() {
        assert!(first_time("logging-test-a"));
        assert!(!first_time("logging-test-a"));
        assert!(first_time("logging-test-b"));
    }

    #[test]
    fn test_once_macros_record_their_id() {
        crate::warn_once!("logging-test-warn", "first {}", 1);
        crate::log_once!(String::from("logging-test-info"), "first");
        assert!(!first_time("logging-test-warn"));
        assert!(!first_time("logging-test-info"));
    }

    #[test]
    fn test_forget_once_rearms_id() {
        assert!(first_time("logging-test-forget"));
        forget_once("logging-test-forget");
        assert!(first_time("logging-test-forget"));
        assert!(!first_time("logging-test-forget"));
    }

    #[test]
    fn test_init_is_repeatable() {
        init();
        init_with_level("debug");
    }
}
