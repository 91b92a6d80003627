//! Stderr logging for `-v`/`-q`.
//!
//! The library logs through the `log` facade; `tracing-subscriber` picks
//! those records up through its `tracing-log` bridge. `RUST_LOG`, when set,
//! takes precedence over the flags.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Maps the verbosity flags to a level filter.
pub fn level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Installs the subscriber. A second call keeps the first one.
pub fn init(level: LevelFilter) {
    let installed = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(console::colors_enabled_stderr())
        .with_target(false)
        .without_time()
        .with_env_filter(filter(level))
        .try_init();
    if let Err(e) = installed {
        eprintln!("logging already initialized: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels() {
        assert_eq!(level(0, true), LevelFilter::ERROR);
        assert_eq!(level(3, true), LevelFilter::ERROR);
        assert_eq!(level(0, false), LevelFilter::WARN);
        assert_eq!(level(2, false), LevelFilter::DEBUG);
    }

    #[test]
    fn test_filter_uses_flag_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert_eq!(filter(LevelFilter::INFO).max_level_hint(), Some(LevelFilter::INFO));
    }
}
