//! Tracing subscriber setup for binaries embedding the exchange.

use kolmarket_types::{KolmarketError, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// `json` switches from human-readable lines to one JSON object per event.
pub fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_target(true);
        tracing::subscriber::set_global_default(registry.with(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stdout()))
            .with_file(true)
            .with_line_number(true);
        tracing::subscriber::set_global_default(registry.with(layer))
    };
    installed.map_err(|e| KolmarketError::Configuration(format!("tracing init: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_reported() {
        // Whichever call wins, the other must fail cleanly.
        let first = init_tracing(true);
        let second = init_tracing(false);
        assert!(first.is_ok() || second.is_err());
        assert!(second.is_err() || first.is_err());
    }
}
