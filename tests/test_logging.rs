//! Tests for logging configuration and format parsing

use iot_session::observability::logging::{init_logging, parse_level, LogFormat};
use iot_session::session_span;
use tracing::Level;

#[test]
fn test_log_format_parse() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
    assert_eq!(LogFormat::parse("xml"), LogFormat::Json);
}

#[test]
fn test_parse_level_defaults_to_info() {
    assert_eq!(parse_level("debug"), Level::DEBUG);
    assert_eq!(parse_level("verbose"), Level::INFO);
    assert_eq!(parse_level(""), Level::INFO);
}

#[test]
fn test_init_logging_twice_does_not_panic() {
    init_logging(Level::DEBUG, LogFormat::Compact, true);
    init_logging(Level::INFO, LogFormat::Json, false);

    let span = session_span!(client_id = "dev1");
    let _entered = span.enter();
    tracing::info!("logging initialized");
}
