// Declare all our modules
mod client;
mod config;
mod error;
mod fetcher;
mod models;
mod notifier;
mod parsers;
mod pipeline;
mod report;

// Publicly export the parts of our library that users will need
pub use client::{LOGIN_FAILURE_MARKERS, PortalClient, Session, login_failure_marker};
pub use config::{Config, DEFAULT_LOGIN_URL, DEFAULT_TIMEOUT_SECS, NotifierConfig};
pub use error::{Failure, Result, ScraperError};
pub use fetcher::{CommandFetcher, Fetcher, HttpFetcher, Page, parse_render_output};
pub use models::*; // Exposes all structs like AttendanceRecord, LoginForm, etc.
pub use notifier::{
    Delivery, NotificationRouter, Notifier, StdoutNotifier, TelegramNotifier, WebhookNotifier,
};
pub use parsers::attendance::{
    PLACEHOLDER_SUBJECT, dedupe_and_cap, extract, parse_percentage, scan_elements,
    scan_free_text, scan_tables,
};
pub use parsers::endpoint::{
    DEFAULT_ATTENDANCE_PATH, Resolution, ResolutionSource, candidate_links, resolve,
};
pub use parsers::login_form::{classify_field, classify_fields, detect_login_form};
pub use pipeline::{Pipeline, RunOutcome, RunReport};
pub use report::{
    audience_for, average, compose_message, format_diagnostic, format_report, plain_text,
};

/// Builds the notifier named in the configuration.
pub fn notifier_from_config(config: &Config) -> Result<Box<dyn Notifier>> {
    notifier::from_config(config)
}
