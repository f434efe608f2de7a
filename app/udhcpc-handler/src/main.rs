//! The "script" udhcpc(6) invokes on each state transition.
//!
//! Reads the event type from argv[1] and the lease fields from the
//! environment, and emits exactly one JSON line on stdout for bound/renew.
//! Logs go to stderr, which the plugin forwards into its own log stream.

use std::process::ExitCode;

use tracing::{debug, error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use netdhcp_udhcpc::{assemble_event, HandlerEnv, SILENT_EVENTS};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "udhcpc-handler".to_string());
    let Some(kind) = args.next() else {
        error!("usage: {program} <event type>");
        return ExitCode::FAILURE;
    };

    let env = HandlerEnv::from_process_env();
    match assemble_event(&kind, &env) {
        Some(event) => match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                error!("failed to encode udhcpc event: {e}");
                return ExitCode::FAILURE;
            }
        },
        None if SILENT_EVENTS.contains(&kind.as_str()) => {
            debug!("ignoring `{kind}` event");
        }
        None => {
            warn!("ignoring unknown event type `{kind}`");
        }
    }

    ExitCode::SUCCESS
}
