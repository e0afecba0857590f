// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use tracing::error;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .try_init();
}

/// Logs a fatal error with its whole cause chain, outermost first.
pub fn report_fatal(err: &anyhow::Error) {
    error!("fatal: {err}");
    for (depth, cause) in err.chain().skip(1).enumerate() {
        error!("  {}: {cause}", depth + 1);
    }
}
