use std::env::var;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer,
    filter::{EnvFilter, filter_fn},
    fmt::writer::BoxMakeWriter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::AUDIT_TARGET;

pub fn init() {
    init_with_level(LevelFilter::INFO);
}

/// Initialize the main log stream and the audit stream.
///
/// `RUST_LOG` filters the main stream, `RUST_LOG_FORMAT=json` switches it to
/// JSON. The audit stream is always JSON and goes to `AUDIT_LOG_PATH` when
/// set, stderr otherwise.
pub fn init_with_level(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let not_audit = filter_fn(|meta| meta.target() != AUDIT_TARGET);
    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_filter(not_audit)
            .with_filter(env_filter)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_filter(not_audit)
            .with_filter(env_filter)
            .boxed(),
    };

    let (audit_writer, audit_error) = audit_writer();
    let audit_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(audit_writer)
        .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET))
        .boxed();

    tracing_subscriber::registry().with(log_layer).with(audit_layer).init();

    if let Some(error) = audit_error {
        warn!("Failed to open AUDIT_LOG_PATH, audit events go to stderr: {error}");
    }
}

fn audit_writer() -> (BoxMakeWriter, Option<std::io::Error>) {
    let Ok(path) = var("AUDIT_LOG_PATH") else {
        return (BoxMakeWriter::new(std::io::stderr), None);
    };

    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), None),
        Err(error) => (BoxMakeWriter::new(std::io::stderr), Some(error)),
    }
}
