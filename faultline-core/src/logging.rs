//! Structured logging for simulation debugging
//!
//! All crates of the workspace log through `tracing`. This module only wires
//! up a subscriber and offers span helpers; logging never influences the
//! outcome of a run.
//!
//! # Controlling output
//!
//! ```bash
//! RUST_LOG=debug cargo test
//! RUST_LOG=faultline_components::mesh=trace,faultline_core=debug cargo test
//! ```
//!
//! Level guidelines used across the workspace:
//! - **TRACE**: per-event state changes (scheduling, CPU bursts, transitions)
//! - **DEBUG**: balancing decisions, dependency fan-out, component setup
//! - **INFO**: run start/stop, fault injections, instance lifecycle
//! - **WARN**: failed requests and aborted runs

use crate::{EventId, SimTime};
use tracing::{info, Span};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging at `info` level unless `RUST_LOG` says otherwise.
pub fn init_simulation_logging() {
    init_simulation_logging_with_level("info")
}

/// Initialize logging with a specific default level.
///
/// `RUST_LOG` takes precedence when set. Calling this more than once is
/// harmless; only the first subscriber is installed.
///
/// # Example
/// ```rust
/// use faultline_core::logging::init_simulation_logging_with_level;
///
/// init_simulation_logging_with_level("debug");
/// ```
pub fn init_simulation_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{level},faultline_core::scheduler=info,faultline_components={level}").into()
    });

    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        info!("Simulation logging initialized at level: {}", level);
    }
}

/// Everything at `trace`, pretty-printed.
pub fn init_detailed_simulation_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "trace,faultline_core=trace,faultline_components=trace".into());

    let installed = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_file(true)
                .with_line_number(true)
                .pretty(),
        )
        .with(filter)
        .try_init()
        .is_ok();

    if installed {
        info!("Detailed simulation logging initialized");
    }
}

/// Span covering a whole run.
pub fn simulation_span(name: &str, seed: u64) -> Span {
    tracing::info_span!("simulation", name = name, seed = seed)
}

/// Span covering one component's handling of an event.
pub fn component_span(component_name: &str, component_id: &str) -> Span {
    tracing::debug_span!("component", name = component_name, id = component_id)
}

/// Span covering the execution of one event.
pub fn event_span(event_id: EventId, time: SimTime) -> Span {
    tracing::trace_span!("event", id = %event_id, time = %time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_initialization_is_idempotent() {
        init_simulation_logging_with_level("debug");
        init_simulation_logging_with_level("debug");
        init_detailed_simulation_logging();
        tracing::debug!("still fine");
    }

    #[test]
    fn test_span_creation() {
        let span = simulation_span("test_simulation", 7);
        let _entered = span.enter();
        let _comp = component_span("mesh", "c-1");
        let _event = event_span(EventId(1), SimTime::from_millis(100));
    }
}
