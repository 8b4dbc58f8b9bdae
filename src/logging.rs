use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

static TRACING_INIT: Once = Once::new();

/// Map `-v`/`-q` counts to a default level for this crate.
pub fn default_level(verbose: u8, quiet: u8) -> &'static str {
    match (verbose as i16) - (quiet as i16) {
        i16::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initializes the global tracing subscriber, logging to stderr.
///
/// `RUST_LOG` wins over the given level when set.
pub fn init_tracing(level: &str) {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("dkb2ynab={}", level)));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(0, 0), "info");
        assert_eq!(default_level(1, 0), "debug");
        assert_eq!(default_level(3, 0), "trace");
        assert_eq!(default_level(0, 1), "warn");
        assert_eq!(default_level(0, 5), "error");
        assert_eq!(default_level(2, 1), "debug");
    }
}
