// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parse a level name (trace, debug, info, warn, error), ignoring case.
pub fn parse_log_level(name: &str) -> Option<Level> {
    name.trim().parse::<Level>().ok()
}

/// Initialize logging with an optional level from the CLI or config.
/// Falls back to INFO if the level is missing or not recognized.
pub fn init_logging(log_level: Option<&str>) {
    let level = log_level.and_then(parse_log_level).unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_target(false)
        .with_max_level(level)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_log_level(" WARN "), Some(Level::WARN));
        assert_eq!(parse_log_level("loud"), None);
    }
}
