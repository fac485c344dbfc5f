//! Tracing setup for reltag binaries.
//!
//! Logs always go to stderr: stdout is reserved for the `key=value`
//! result lines a calling pipeline captures as step outputs.

use std::io;

use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter for `level`, overridable through `RUST_LOG`. Unparseable
/// directives in `RUST_LOG` are dropped rather than failing startup.
fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy()
}

/// Install the global subscriber. JSON lines carry the enclosing
/// `reltag.assign` span so each event can be tied to its tag.
///
/// Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let (json_layer, text_layer) = if json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(io::stderr);
        (Some(layer), None)
    } else {
        let layer = fmt::layer().with_target(false).with_writer(io::stderr);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(filter_for(level))
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!(event = "tag.planned", "still logging");
    }
}
