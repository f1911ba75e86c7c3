//! Global panic hook
//!
//! Routes every panic through `tracing` before the default hook prints it.
//! Engine panics are caught by the supervisor and turned into restarts, so
//! the hook only logs; it never terminates the process.
//!
//! # Usage
//!
//! ```no_run
//! use tickfan_core::resilience::install_panic_handler;
//!
//! install_panic_handler();
//! ```

use std::panic;
use tracing::error;

/// Install a panic hook that logs location and message via tracing
pub fn install_panic_handler() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown location>".to_string());

        let message = panic_message(panic_info.payload());
        let thread = std::thread::current();

        error!(
            location = %location,
            message = %message,
            thread = thread.name().unwrap_or("<unnamed>"),
            "panic"
        );

        default_hook(panic_info);
    }));

    tracing::debug!("Panic handler installed");
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<no message>".to_string()
    }
}
