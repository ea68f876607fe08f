// tests/pipeline_test.rs

use async_trait::async_trait;
use attendance_notifier::{
    Audience, Config, Delivery, Fetcher, NotificationMessage, NotificationRouter, Notifier, Page,
    Pipeline, PipelineStatus, PortalClient, Result, RunReport, ScraperError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const LOGIN_URL: &str = "https://portal.test/index.php";
const DEFAULT_URL: &str =
    "https://portal.test/index.php?option=com_base_studentinfo&task=details&schoolid=1&Itemid=324";

const LOGIN_PAGE: &str = r#"
    <html><body>
      <form id="login-form" action="/index.php" method="post">
        <input type="text" name="username">
        <input type="password" name="password">
        <input type="hidden" name="return" value="aW5kZXgucGhw">
        <input type="hidden" name="csrf_9f1c" value="1">
      </form>
    </body></html>"#;

const LANDING_WITH_LINK: &str = r#"
    <html><body>
      <p>Welcome, Ravi</p>
      <a href="/index.php?view=attendance">My Attendance</a>
    </body></html>"#;

const LANDING_WITHOUT_LINK: &str = r#"
    <html><body>
      <p>Welcome, Ravi</p>
      <a href="/student/profile">Student Profile</a>
    </body></html>"#;

const ATTENDANCE_PAGE: &str = r#"
    <html><body>
      <table>
        <tr><th>Subject</th><th>Percentage</th></tr>
        <tr><td>Mathematics</td><td>82%</td></tr>
        <tr><td>Physics</td><td>68.5%</td></tr>
      </table>
    </body></html>"#;

#[derive(Clone)]
enum Reply {
    Page(u16, &'static str),
    Timeout,
    Refused,
}

#[derive(Debug, Clone)]
struct Request {
    method: &'static str,
    url: String,
    form: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

/// Answers from a fixed table keyed by method and URL; anything else is a 404.
#[derive(Default)]
struct ScriptedFetcher {
    replies: HashMap<(&'static str, String), Reply>,
    log: Arc<Mutex<Vec<Request>>>,
}

impl ScriptedFetcher {
    fn reply(mut self, method: &'static str, url: &str, reply: Reply) -> Self {
        self.replies.insert((method, url.to_string()), reply);
        self
    }

    fn answer(
        &self,
        method: &'static str,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Page> {
        self.log.lock().unwrap().push(Request {
            method,
            url: url.to_string(),
            form: form.to_vec(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });

        match self.replies.get(&(method, url.to_string())) {
            Some(Reply::Page(status_code, body)) => Ok(Page {
                status_code: *status_code,
                body: body.to_string(),
                final_url: url.to_string(),
            }),
            Some(Reply::Timeout) => Err(ScraperError::Timeout(format!("{} timed out", url))),
            Some(Reply::Refused) => Err(ScraperError::Connection(format!("{} refused", url))),
            None => Ok(Page {
                status_code: 404,
                body: "<h1>Not Found</h1>".to_string(),
                final_url: url.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Page> {
        self.answer("GET", url, &[], headers)
    }

    async fn post(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Page> {
        self.answer("POST", url, form, headers)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<NotificationMessage>>>,
    diagnostic: bool,
    fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        if self.fail {
            return Err(ScraperError::Notify("gateway down".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn reaches(&self, audience: Audience) -> bool {
        audience == Audience::Primary || self.diagnostic
    }
}

fn config(extra: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = [
        ("PORTAL_USERNAME", "21R01A0501"),
        ("PORTAL_PASSWORD", "s3cret"),
        ("LOGIN_URL", LOGIN_URL),
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("TELEGRAM_CHAT_ID", "42"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in extra {
        env.insert(k.to_string(), v.to_string());
    }

    Config::from_lookup(|key| env.get(key).cloned()).unwrap()
}

struct Harness {
    log: Arc<Mutex<Vec<Request>>>,
    sent: Arc<Mutex<Vec<NotificationMessage>>>,
}

impl Harness {
    fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().unwrap().clone()
    }
}

async fn run(
    config: &Config,
    fetcher: ScriptedFetcher,
    notifier: RecordingNotifier,
) -> (RunReport, Harness) {
    let harness = Harness {
        log: fetcher.log.clone(),
        sent: notifier.sent.clone(),
    };

    let pipeline = Pipeline::new(
        config,
        PortalClient::new(Box::new(fetcher)),
        NotificationRouter::new(Box::new(notifier)),
    );
    (pipeline.run().await, harness)
}

fn portal() -> ScriptedFetcher {
    ScriptedFetcher::default()
        .reply("GET", LOGIN_URL, Reply::Page(200, LOGIN_PAGE))
        .reply("POST", LOGIN_URL, Reply::Page(200, LANDING_WITH_LINK))
}

#[tokio::test]
async fn test_successful_check_notifies_primary() {
    let config = config(&[]);
    let fetcher = portal().reply(
        "GET",
        "https://portal.test/index.php?view=attendance",
        Reply::Page(200, ATTENDANCE_PAGE),
    );

    let (report, harness) = run(&config, fetcher, RecordingNotifier::default()).await;

    assert_eq!(report.outcome.status, PipelineStatus::Ok);
    assert_eq!(report.delivery, Delivery::Delivered);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        report.outcome.attendance_url.as_deref(),
        Some("https://portal.test/index.php?view=attendance")
    );

    let requests = harness.requests();
    assert_eq!(requests.len(), 3);

    let login = &requests[1];
    assert_eq!(login.method, "POST");
    assert!(login.form.contains(&("username".to_string(), "21R01A0501".to_string())));
    assert!(login.form.contains(&("password".to_string(), "s3cret".to_string())));
    assert!(login.form.contains(&("csrf_9f1c".to_string(), "1".to_string())));
    assert!(login.form.contains(&("return".to_string(), "aW5kZXgucGhw".to_string())));
    assert_eq!(
        login.headers,
        vec![("Referer".to_string(), LOGIN_URL.to_string())]
    );

    let attendance = &requests[2];
    assert_eq!(attendance.method, "GET");
    assert_eq!(
        attendance.headers,
        vec![("Referer".to_string(), LOGIN_URL.to_string())]
    );

    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].audience, Audience::Primary);
    assert!(sent[0].body.contains("Mathematics: <b>82.00%</b>"));
    assert!(sent[0].body.contains("Physics: <b>68.50%</b>"));
    assert!(sent[0].body.contains("Average: <b>75.25%</b>"));
}

#[tokio::test]
async fn test_rejected_login_stops_before_attendance() {
    let config = config(&[]);
    let fetcher = ScriptedFetcher::default()
        .reply("GET", LOGIN_URL, Reply::Page(200, LOGIN_PAGE))
        .reply(
            "POST",
            LOGIN_URL,
            Reply::Page(200, "<div class=\"alert\">Invalid credentials</div>"),
        );

    let (report, harness) = run(&config, fetcher, RecordingNotifier::default()).await;

    assert_eq!(report.outcome.status, PipelineStatus::LoginFailed);
    assert_eq!(report.delivery, Delivery::Suppressed);
    assert_eq!(report.exit_code(), 3);
    assert!(!report.outcome.extraction.is_found());
    assert_eq!(harness.requests().len(), 2);
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn test_failure_goes_to_diagnostic_destination() {
    let config = config(&[]);
    let fetcher = ScriptedFetcher::default()
        .reply("GET", LOGIN_URL, Reply::Page(200, LOGIN_PAGE))
        .reply("POST", LOGIN_URL, Reply::Page(200, "Login failed. Try again."));
    let notifier = RecordingNotifier {
        diagnostic: true,
        ..Default::default()
    };

    let (report, harness) = run(&config, fetcher, notifier).await;

    assert_eq!(report.delivery, Delivery::Delivered);
    let sent = harness.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].audience, Audience::Diagnostic);
    assert!(sent[0].body.contains("login_failed"));
}

#[tokio::test]
async fn test_default_endpoint_404_lists_candidates() {
    let config = config(&[]);
    let fetcher = ScriptedFetcher::default()
        .reply("GET", LOGIN_URL, Reply::Page(200, LOGIN_PAGE))
        .reply("POST", LOGIN_URL, Reply::Page(200, LANDING_WITHOUT_LINK));

    let (report, harness) = run(&config, fetcher, RecordingNotifier::default()).await;

    assert_eq!(report.outcome.status, PipelineStatus::EndpointNotFound);
    assert_eq!(report.exit_code(), 4);
    assert_eq!(report.outcome.attendance_url.as_deref(), Some(DEFAULT_URL));
    let detail = report.outcome.detail.unwrap_or_default();
    assert!(detail.contains("https://portal.test/student/profile"), "{}", detail);
    assert_eq!(harness.requests()[2].url, DEFAULT_URL);
}

#[tokio::test]
async fn test_discovered_endpoint_404_is_page_error() {
    let config = config(&[]);

    let (report, _) = run(&config, portal(), RecordingNotifier::default()).await;

    assert_eq!(report.outcome.status, PipelineStatus::AttendancePageError);
}

#[tokio::test]
async fn test_attendance_server_error() {
    let config = config(&[]);
    let fetcher = portal().reply(
        "GET",
        "https://portal.test/index.php?view=attendance",
        Reply::Page(500, "<h1>Internal Server Error</h1>"),
    );

    let (report, _) = run(&config, fetcher, RecordingNotifier::default()).await;

    assert_eq!(report.outcome.status, PipelineStatus::AttendancePageError);
    assert!(report.outcome.detail.unwrap_or_default().contains("500"));
}

#[tokio::test]
async fn test_transport_failures() {
    let config = config(&[]);

    let fetcher = portal().reply(
        "GET",
        "https://portal.test/index.php?view=attendance",
        Reply::Timeout,
    );
    let (report, _) = run(&config, fetcher, RecordingNotifier::default()).await;
    assert_eq!(report.outcome.status, PipelineStatus::NetworkTimeout);

    let fetcher = portal().reply(
        "GET",
        "https://portal.test/index.php?view=attendance",
        Reply::Refused,
    );
    let (report, _) = run(&config, fetcher, RecordingNotifier::default()).await;
    assert_eq!(report.outcome.status, PipelineStatus::ConnectionError);

    let fetcher = ScriptedFetcher::default().reply("GET", LOGIN_URL, Reply::Timeout);
    let (report, harness) = run(&config, fetcher, RecordingNotifier::default()).await;
    assert_eq!(report.outcome.status, PipelineStatus::LoginPageError);
    assert_eq!(harness.requests().len(), 1);
}

#[tokio::test]
async fn test_page_without_figures_is_extraction_empty() {
    let config = config(&[]);
    let fetcher = portal().reply(
        "GET",
        "https://portal.test/index.php?view=attendance",
        Reply::Page(200, "<html><body><p>No records yet.</p></body></html>"),
    );

    let (report, _) = run(&config, fetcher, RecordingNotifier::default()).await;

    assert_eq!(report.outcome.status, PipelineStatus::ExtractionEmpty);
    assert_eq!(report.exit_code(), 5);
}

#[tokio::test]
async fn test_configured_attendance_url_skips_discovery() {
    let config = config(&[("ATTENDANCE_URL", "https://portal.test/custom/att")]);
    let fetcher = portal().reply(
        "GET",
        "https://portal.test/custom/att",
        Reply::Page(200, ATTENDANCE_PAGE),
    );

    let (report, harness) = run(&config, fetcher, RecordingNotifier::default()).await;

    assert_eq!(report.outcome.status, PipelineStatus::Ok);
    let urls: Vec<String> = harness.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        vec![LOGIN_URL, LOGIN_URL, "https://portal.test/custom/att"]
    );
}

#[tokio::test]
async fn test_undelivered_success_exits_with_seven() {
    let config = config(&[]);
    let fetcher = portal().reply(
        "GET",
        "https://portal.test/index.php?view=attendance",
        Reply::Page(200, ATTENDANCE_PAGE),
    );
    let notifier = RecordingNotifier {
        fail: true,
        ..Default::default()
    };

    let (report, _) = run(&config, fetcher, notifier).await;

    assert_eq!(report.outcome.status, PipelineStatus::Ok);
    assert_eq!(report.delivery, Delivery::Failed);
    assert_eq!(report.exit_code(), 7);
}
