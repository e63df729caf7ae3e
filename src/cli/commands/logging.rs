//! Shared `--verbose` flag, attached globally so every subcommand accepts it.

use clap::{Arg, ArgAction, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Accepts a level name or a repeat count up to 5.
fn parse_verbosity(raw: &str) -> std::result::Result<u8, String> {
    match raw.to_ascii_lowercase().as_str() {
        "error" => Ok(0),
        "warn" => Ok(1),
        "info" => Ok(2),
        "debug" => Ok(3),
        "trace" => Ok(4),
        other => other
            .parse::<u8>()
            .ok()
            .filter(|count| *count <= 5)
            .ok_or_else(|| format!("unknown log level '{raw}'")),
    }
}

#[must_use]
pub fn verbosity_parser() -> ValueParser {
    ValueParser::from(|raw: &str| parse_verbosity(raw))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("TESSERA_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(verbosity_parser()),
    )
}

#[cfg(test)]
mod tests {
    use super::parse_verbosity;

    #[test]
    fn named_levels_map_to_counts() {
        assert_eq!(parse_verbosity("error"), Ok(0));
        assert_eq!(parse_verbosity("WARN"), Ok(1));
        assert_eq!(parse_verbosity("Info"), Ok(2));
        assert_eq!(parse_verbosity("debug"), Ok(3));
        assert_eq!(parse_verbosity("trace"), Ok(4));
    }

    #[test]
    fn numeric_counts_pass_through_up_to_five() {
        assert_eq!(parse_verbosity("0"), Ok(0));
        assert_eq!(parse_verbosity("5"), Ok(5));
        assert!(parse_verbosity("6").is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_verbosity("loud").is_err());
        assert!(parse_verbosity("-1").is_err());
    }
}
