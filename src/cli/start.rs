use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;
use tracing::Level;

/// `-v` count to log level. Zero keeps errors only.
const fn level_for(count: u8) -> Option<Level> {
    match count {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Parse the command line, bring up logging, and resolve the action to run.
/// The binary executes the returned action.
///
/// # Errors
///
/// Fails when the subscriber cannot be installed or the arguments do not
/// resolve to an action.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let count = matches
        .get_one::<u8>(commands::logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or_default();
    telemetry::init(level_for(count))?;

    dispatch::handler(&matches)
}
