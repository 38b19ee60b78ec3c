// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Subscriber setup. Events go to stderr so stdout only carries command
//! results; `CLEPS_LOG_FILE` adds a second, non-blocking file sink.

use std::env;
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, Registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const FILTER_ENV_VAR: &str = "CLEPS_LOG";
const FORMAT_ENV_VAR: &str = "CLEPS_LOG_FORMAT";
const SPAN_EVENTS_ENV_VAR: &str = "CLEPS_LOG_SPAN_EVENTS";
const FILE_ENV_VAR: &str = "CLEPS_LOG_FILE";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
    Compact,
}

pub fn init(verbose: bool) {
    let filter = build_filter(env::var(FILTER_ENV_VAR).ok().as_deref(), verbose);
    let span_events = parse_span_events(env::var(SPAN_EVENTS_ENV_VAR).ok().as_deref());
    let format = parse_format(env::var(FORMAT_ENV_VAR).ok().as_deref());
    let registry = Registry::default()
        .with(filter)
        .with(tracing_error::ErrorLayer::default());
    let file_writer = build_file_writer();

    match format {
        LogFormat::Json => {
            let stderr_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_timer(UtcTime::rfc_3339())
                .with_span_events(span_events.clone());
            match file_writer {
                Some((writer, guard)) => {
                    let file_layer = tracing_subscriber::fmt::layer()
                        .json()
                        .with_ansi(false)
                        .with_timer(UtcTime::rfc_3339())
                        .with_span_events(span_events)
                        .with_writer(writer);
                    registry.with(stderr_layer).with(file_layer).init();
                    let _ = FILE_GUARD.set(guard);
                }
                None => registry.with(stderr_layer).init(),
            }
        }
        LogFormat::Pretty => {
            let stderr_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr)
                .with_timer(UtcTime::rfc_3339())
                .with_span_events(span_events.clone());
            match file_writer {
                Some((writer, guard)) => {
                    let file_layer = tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(false)
                        .with_timer(UtcTime::rfc_3339())
                        .with_span_events(span_events)
                        .with_writer(writer);
                    registry.with(stderr_layer).with(file_layer).init();
                    let _ = FILE_GUARD.set(guard);
                }
                None => registry.with(stderr_layer).init(),
            }
        }
        LogFormat::Compact => {
            let stderr_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_timer(UtcTime::rfc_3339())
                .with_span_events(span_events.clone());
            match file_writer {
                Some((writer, guard)) => {
                    let file_layer = tracing_subscriber::fmt::layer()
                        .compact()
                        .with_ansi(false)
                        .with_timer(UtcTime::rfc_3339())
                        .with_span_events(span_events)
                        .with_writer(writer);
                    registry.with(stderr_layer).with(file_layer).init();
                    let _ = FILE_GUARD.set(guard);
                }
                None => registry.with(stderr_layer).init(),
            }
        }
    }
}

/// `CLEPS_LOG` wins; otherwise this crate logs at info (debug when verbose)
/// and dependencies only surface warnings unless verbose.
fn build_filter(directive: Option<&str>, verbose: bool) -> EnvFilter {
    match directive.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => EnvFilter::new(value),
        None if verbose => EnvFilter::new("debug"),
        None => EnvFilter::new("warn,cleps=info"),
    }
}

fn normalized(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_ascii_lowercase())
}

fn parse_format(value: Option<&str>) -> LogFormat {
    match normalized(value).as_deref() {
        Some("json") => LogFormat::Json,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::Compact,
    }
}

fn parse_span_events(value: Option<&str>) -> FmtSpan {
    match normalized(value).as_deref() {
        Some("new") => FmtSpan::NEW,
        Some("enter") => FmtSpan::ENTER,
        Some("exit") => FmtSpan::EXIT,
        Some("close") => FmtSpan::CLOSE,
        _ => FmtSpan::NONE,
    }
}

fn build_file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let file_path = env::var(FILE_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;

    let path = Path::new(&file_path);
    let file_name = path.file_name()?.to_string_lossy().to_string();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_defaults_to_compact() {
        assert_eq!(parse_format(None), LogFormat::Compact);
        assert_eq!(parse_format(Some("  JSON ")), LogFormat::Json);
        assert_eq!(parse_format(Some("pretty")), LogFormat::Pretty);
        assert_eq!(parse_format(Some("xml")), LogFormat::Compact);
    }

    #[test]
    fn span_events_parse_case_insensitively() {
        assert_eq!(parse_span_events(Some("Close")), FmtSpan::CLOSE);
        assert_eq!(parse_span_events(Some("new")), FmtSpan::NEW);
        assert_eq!(parse_span_events(Some("")), FmtSpan::NONE);
        assert_eq!(parse_span_events(None), FmtSpan::NONE);
    }

    #[test]
    fn filter_prefers_explicit_directive() {
        assert_eq!(build_filter(Some("trace"), false).to_string(), "trace");
        assert_eq!(build_filter(None, true).to_string(), "debug");
        assert_eq!(build_filter(Some("  "), true).to_string(), "debug");
        assert!(build_filter(None, false).to_string().contains("cleps=info"));
    }
}
