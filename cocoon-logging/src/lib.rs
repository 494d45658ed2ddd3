// Copyright (c) 2023 The Cocoon Authors
//! Logging helpers shared by every cocoon component.
#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]

pub use serde_json;
pub use tracing;

use tracing_subscriber::EnvFilter;

/// Structured trace event: `cocoon_trace!("orderer.put", {"ledger": name})`
#[macro_export]
macro_rules! cocoon_trace {
    ($evt:expr, $params:tt) => {
        $crate::tracing::trace!(
            "cocoon_trace:{}:{}",
            $evt,
            $crate::serde_json::json!($params)
        );
    };
}

/// Maps the numeric `logging.level` setting onto a tracing directive.
/// ```
/// assert_eq!(cocoon_logging::level_directive(2), "info");
/// assert_eq!(cocoon_logging::level_directive(9), "trace");
/// ```
pub fn level_directive(level: usize) -> &'static str {
    match level {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init(level: usize) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(level)));
    // a subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
