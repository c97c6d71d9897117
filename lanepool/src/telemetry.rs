//! Tracing subscriber setup for binaries embedding the pools.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Build the filter from `RUST_LOG`, else from `LANEPOOL_LOG` (default `info`).
fn build_filter(rust_log: Option<&str>, lanepool_log: Option<&str>) -> EnvFilter {
    if let Some(directives) = rust_log {
        return EnvFilter::new(directives);
    }

    let level = match lanepool_log {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    EnvFilter::new(format!("lanepool={level},lanepool_demo={level}"))
}

/// Install a global subscriber writing to stderr.
///
/// `LOG_FORMAT=json` switches to JSON lines. Calling this twice is harmless;
/// the second install is ignored.
pub fn init_tracing() {
    let rust_log = std::env::var("RUST_LOG").ok();
    let lanepool_log = std::env::var("LANEPOOL_LOG").ok();
    let filter = build_filter(rust_log.as_deref(), lanepool_log.as_deref());

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}
