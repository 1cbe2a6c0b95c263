//! Diagnostic logging setup.

use crate::domain::error::FxsweepError;

pub const LOG_ENV_VAR: &str = "FXSWEEP_LOG";

/// Install the global subscriber. `FXSWEEP_LOG` overrides `log_level`.
///
/// A second call leaves the first subscriber in place.
pub fn init_tracing(log_level: &str, log_format: &str) -> Result<(), FxsweepError> {
    let filter = std::env::var(LOG_ENV_VAR).unwrap_or_else(|_| log_level.to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter)
        .map_err(|err| FxsweepError::invalid("logging", "level", format!("invalid log filter: {err}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    let installed = match log_format.trim().to_lowercase().as_str() {
        "json" => builder.json().try_init(),
        "text" | "" => builder.try_init(),
        other => {
            return Err(FxsweepError::invalid(
                "logging",
                "format",
                format!("unknown log format '{other}', expected text or json"),
            ));
        }
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}
