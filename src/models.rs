use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest subject label kept on a record, in characters.
pub const MAX_SUBJECT_CHARS: usize = 50;

/// Most records a single extraction may return.
pub const MAX_RECORDS: usize = 20;

/// The student's portal login.
#[derive(Clone)]
pub struct Credential {
    /// The username, roll number or email used to sign in.
    pub identifier: String,
    /// The password. Never printed.
    pub secret: String,
}

impl Credential {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    /// The identifier with everything past the first two characters hidden, for log lines.
    pub fn masked_identifier(&self) -> String {
        let visible: String = self.identifier.chars().take(2).collect();
        format!("{}***", visible)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.masked_identifier())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// What a login form input is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldRole {
    Username,
    Password,
    /// Echoed back verbatim (anti-forgery tokens and the like).
    Hidden,
    Other,
}

/// An `<input>` as read from the page, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    /// Lowercased `type` attribute; `"text"` when the attribute is absent.
    pub declared_type: String,
    pub default_value: Option<String>,
    /// Whether a checkbox/radio input carries the `checked` attribute.
    pub checked: bool,
}

impl FormField {
    pub fn new(name: &str, declared_type: &str, default_value: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            declared_type: declared_type.to_ascii_lowercase(),
            default_value: default_value.map(str::to_string),
            checked: false,
        }
    }

    pub fn is_text_like(&self) -> bool {
        matches!(self.declared_type.as_str(), "text" | "email")
    }
}

/// A form input with its role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedField {
    pub name: String,
    pub role: FieldRole,
    /// Value to send; the page default for the password field.
    pub value: Option<String>,
}

/// A detected login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    action_url: String,
    fields: Vec<ClassifiedField>,
}

impl LoginForm {
    /// Builds a form, keeping only the first username and first password field.
    pub fn new(action_url: impl Into<String>, fields: Vec<ClassifiedField>) -> Self {
        let mut seen_username = false;
        let mut seen_password = false;
        let fields = fields
            .into_iter()
            .map(|mut field| {
                let seen = match field.role {
                    FieldRole::Username => &mut seen_username,
                    FieldRole::Password => &mut seen_password,
                    _ => return field,
                };
                if *seen {
                    field.role = FieldRole::Other;
                }
                *seen = true;
                field
            })
            .collect();

        Self {
            action_url: action_url.into(),
            fields,
        }
    }

    /// The form used when the page offers nothing recognisable:
    /// `username` and `password` posted to `action_url`.
    pub fn fallback(action_url: impl Into<String>) -> Self {
        Self::new(
            action_url,
            vec![
                ClassifiedField {
                    name: "username".to_string(),
                    role: FieldRole::Username,
                    value: None,
                },
                ClassifiedField {
                    name: "password".to_string(),
                    role: FieldRole::Password,
                    value: None,
                },
            ],
        )
    }

    pub fn action_url(&self) -> &str {
        &self.action_url
    }

    pub fn fields(&self) -> &[ClassifiedField] {
        &self.fields
    }

    pub fn role_of(&self, name: &str) -> Option<FieldRole> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.role)
    }

    /// Field name → role, in page order.
    pub fn field_roles(&self) -> Vec<(&str, FieldRole)> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), f.role))
            .collect()
    }

    /// Hidden field name → literal value, in page order.
    pub fn hidden_values(&self) -> Vec<(&str, &str)> {
        self.fields
            .iter()
            .filter(|f| f.role == FieldRole::Hidden)
            .map(|f| (f.name.as_str(), f.value.as_deref().unwrap_or("")))
            .collect()
    }

    pub fn username_field(&self) -> Option<&str> {
        self.field_named_by(FieldRole::Username)
    }

    pub fn password_field(&self) -> Option<&str> {
        self.field_named_by(FieldRole::Password)
    }

    fn field_named_by(&self, role: FieldRole) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.role == role)
            .map(|f| f.name.as_str())
    }

    /// The POST body for this form, filled with `credential`.
    pub fn payload(&self, credential: &Credential) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter_map(|field| {
                let value = match field.role {
                    FieldRole::Username => Some(credential.identifier.clone()),
                    FieldRole::Password if !credential.secret.is_empty() => {
                        Some(credential.secret.clone())
                    }
                    FieldRole::Password => Some(field.value.clone().unwrap_or_default()),
                    FieldRole::Hidden => Some(field.value.clone().unwrap_or_default()),
                    FieldRole::Other => field.value.clone(),
                }?;
                Some((field.name.clone(), value))
            })
            .collect()
    }
}

/// One subject's attendance figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Subject label, at most 50 characters.
    pub subject: String,
    /// Percentage in `[0, 100]`.
    pub percentage: f64,
}

impl AttendanceRecord {
    /// Builds a record, or `None` when the percentage is outside `[0, 100]`.
    pub fn new(subject: &str, percentage: f64) -> Option<Self> {
        if !(0.0..=100.0).contains(&percentage) {
            return None;
        }

        let collapsed = subject.split_whitespace().collect::<Vec<_>>().join(" ");
        Some(Self {
            subject: collapsed.chars().take(MAX_SUBJECT_CHARS).collect(),
            percentage,
        })
    }

    pub fn tier(&self) -> Tier {
        Tier::from_percentage(self.percentage)
    }
}

/// The outcome of running the extractor over a page.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// At least one record, in first-seen order.
    Found(Vec<AttendanceRecord>),
    NotFound,
}

impl ExtractionResult {
    /// Wraps `records`, mapping an empty list to `NotFound`.
    pub fn from_records(records: Vec<AttendanceRecord>) -> Self {
        if records.is_empty() {
            ExtractionResult::NotFound
        } else {
            ExtractionResult::Found(records)
        }
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        match self {
            ExtractionResult::Found(records) => records,
            ExtractionResult::NotFound => &[],
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ExtractionResult::Found(_))
    }
}

/// Attendance band used in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// 75% and above.
    Good,
    /// 65% up to, but not including, 75%.
    Warn,
    /// Below 65%.
    Critical,
}

impl Tier {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 75.0 {
            Tier::Good
        } else if percentage >= 65.0 {
            Tier::Warn
        } else {
            Tier::Critical
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tier::Good => "good",
            Tier::Warn => "warn",
            Tier::Critical => "critical",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Tier::Good => "✅",
            Tier::Warn => "⚠️",
            Tier::Critical => "🔴",
        }
    }
}

/// How a run ended. Exactly one per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Ok,
    LoginPageError,
    LoginFailed,
    EndpointNotFound,
    AttendancePageError,
    ExtractionEmpty,
    NetworkTimeout,
    ConnectionError,
    UnexpectedError,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Ok => "ok",
            PipelineStatus::LoginPageError => "login_page_error",
            PipelineStatus::LoginFailed => "login_failed",
            PipelineStatus::EndpointNotFound => "endpoint_not_found",
            PipelineStatus::AttendancePageError => "attendance_page_error",
            PipelineStatus::ExtractionEmpty => "extraction_empty",
            PipelineStatus::NetworkTimeout => "network_timeout",
            PipelineStatus::ConnectionError => "connection_error",
            PipelineStatus::UnexpectedError => "unexpected_error",
        }
    }

    /// Process exit code for the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineStatus::Ok => 0,
            PipelineStatus::LoginPageError | PipelineStatus::LoginFailed => 3,
            PipelineStatus::EndpointNotFound
            | PipelineStatus::AttendancePageError
            | PipelineStatus::NetworkTimeout
            | PipelineStatus::ConnectionError => 4,
            PipelineStatus::ExtractionEmpty => 5,
            PipelineStatus::UnexpectedError => 6,
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a notification is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Audience {
    /// The student.
    Primary,
    /// The operator watching for failures.
    Diagnostic,
}

/// A message ready for the notifier. Created once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub body: String,
    pub audience: Audience,
}

/// Configuration for spacing out requests with randomized delays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Minimum sleep duration in milliseconds before a request.
    pub min_delay_ms: u64,
    /// Maximum sleep duration in milliseconds before a request.
    pub max_delay_ms: u64,
    /// Whether the randomized delay logic is active.
    pub enabled: bool,
}

impl Default for DelayConfig {
    /// Default configuration: 1000ms - 3000ms, disabled.
    fn default() -> Self {
        Self {
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            enabled: false,
        }
    }
}

impl DelayConfig {
    /// Parses `"min-max"` (milliseconds) or a single value used for both bounds.
    pub fn from_range(spec: &str) -> Option<Self> {
        let (min, max) = match spec.split_once('-') {
            Some((min, max)) => (min.trim().parse().ok()?, max.trim().parse().ok()?),
            None => {
                let value = spec.trim().parse().ok()?;
                (value, value)
            }
        };
        if min > max {
            return None;
        }

        Some(Self {
            min_delay_ms: min,
            max_delay_ms: max,
            enabled: true,
        })
    }
}
