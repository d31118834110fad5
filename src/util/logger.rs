use log::SetLoggerError;

/// The environment variable holding the log filter, in `env_logger` syntax.
pub const LOG_FILTER_ENV: &str = "SATBGC_LOG";
/// The environment variable controlling colored output.
pub const LOG_STYLE_ENV: &str = "SATBGC_LOG_STYLE";

/// Attempt to install an `env_logger` for the collector.
///
/// The filter is read from `SATBGC_LOG` and defaults to `info`. Timestamps are printed with
/// microsecond precision so pauses can be read off the log. Does nothing if the
/// "builtin_env_logger" feature is disabled, in which case the embedder installs its own logger.
pub fn try_init() -> Result<(), SetLoggerError> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            env_logger::Builder::from_env(
                env_logger::Env::new()
                    .filter_or(LOG_FILTER_ENV, "info")
                    .write_style(LOG_STYLE_ENV),
            )
            .format_timestamp_micros()
            .try_init()
        } else {
            Ok(())
        }
    }
}
