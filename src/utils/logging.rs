//! Logger initialisation for the `log` facade

use log::debug;

/// Initialise env_logger; `RUST_LOG` still overrides the default level.
///
/// Quiet silences everything, verbose enables debug output, otherwise only
/// warnings (non-convergence and similar) are shown.
pub fn init_logger(verbose: bool, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Off
    } else if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };

    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .try_init();

    debug!("Logger initialized with level: {level:?}");
}
