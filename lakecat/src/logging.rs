//! Log output of the server
use tracing_subscriber::{EnvFilter, fmt};

/// Logging options
#[derive(Debug, Clone, clap::Parser)]
pub(crate) struct LoggingConfig {
    /// Logs: filter directive, e.g. "info,lakecat_cache=debug".
    ///
    /// Takes precedence over `-v`.
    #[clap(long = "log-filter", env = "LOG_FILTER", action)]
    pub(crate) log_filter: Option<String>,

    /// Logs: more verbose output, `-v` for debug and `-vv` for trace.
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,
}

impl LoggingConfig {
    pub(crate) fn filter(&self) -> &str {
        match (&self.log_filter, self.verbose) {
            (Some(filter), _) => filter,
            (None, 0) => "info",
            (None, 1) => "debug",
            (None, _) => "trace",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("cannot install the log subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Install the global subscriber writing logs to stdout
pub(crate) fn init(config: &LoggingConfig) -> Result<(), Error> {
    let filter = EnvFilter::try_new(config.filter())?;
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(Error::Install)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn verbosity() {
        let parse = |args: &[&str]| LoggingConfig::try_parse_from(args).unwrap();
        assert_eq!(parse(&["serve"]).filter(), "info");
        assert_eq!(parse(&["serve", "-v"]).filter(), "debug");
        assert_eq!(parse(&["serve", "-vvv"]).filter(), "trace");
        assert_eq!(
            parse(&["serve", "-v", "--log-filter", "warn,lakecat_server=debug"]).filter(),
            "warn,lakecat_server=debug"
        );
    }
}
