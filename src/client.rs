use crate::config::Config;
use crate::error::{Failure, Result};
use crate::fetcher::{self, Fetcher, Page};
use crate::models::{Credential, LoginForm, PipelineStatus};
use crate::parsers::login_form::detect_login_form;
use tracing::{debug, info, warn};

/// Phrases in a login response that mean the portal turned us away.
///
/// Login success is never confirmed positively: a response without any of
/// these counts as signed in, so an unrecognised rejection page is treated as
/// success and surfaces later as a missing report.
pub const LOGIN_FAILURE_MARKERS: [&str; 6] = [
    "invalid",
    "incorrect",
    "unauthorized",
    "login failed",
    "captcha",
    "please login",
];

/// An authenticated portal session. Cookies stay inside the fetcher; this
/// keeps the page the login landed on.
#[derive(Debug, Clone)]
pub struct Session {
    pub login_url: String,
    pub landing: Page,
}

pub struct PortalClient {
    fetcher: Box<dyn Fetcher>,
}

impl PortalClient {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(fetcher::from_config(config)?))
    }

    /// Logs into the portal at `login_url`.
    ///
    /// Loads the login page, detects its form (falling back to plain
    /// `username`/`password` fields posted back to `login_url`), posts the
    /// credential together with every hidden field, then checks the response
    /// for [`LOGIN_FAILURE_MARKERS`].
    pub async fn authenticate(
        &self,
        login_url: &str,
        credential: &Credential,
    ) -> std::result::Result<Session, Failure> {
        info!("Loading login page {}", login_url);
        let login_page = self.fetcher.get(login_url, &[]).await.map_err(|e| {
            Failure::new(
                PipelineStatus::LoginPageError,
                format!("Could not load login page: {}", e),
            )
        })?;

        if !login_page.is_success() {
            return Err(Failure::new(
                PipelineStatus::LoginPageError,
                format!("Login page answered HTTP {}", login_page.status_code),
            ));
        }

        let form = detect_login_form(&login_page.body, &login_page.final_url).unwrap_or_else(|| {
            warn!("No login form found on {}, posting default fields", login_page.final_url);
            LoginForm::fallback(login_url)
        });
        debug!(
            "Login form posts to {} (username field: {:?}, password field: {:?}, {} hidden)",
            form.action_url(),
            form.username_field(),
            form.password_field(),
            form.hidden_values().len()
        );

        info!("Signing in as {}", credential.masked_identifier());
        let response = self
            .fetcher
            .post(
                form.action_url(),
                &form.payload(credential),
                &[("Referer", login_url)],
            )
            .await
            .map_err(Failure::from_transport)?;

        if let Some(marker) = login_failure_marker(&response.body) {
            return Err(Failure::new(
                PipelineStatus::LoginFailed,
                format!("Login response mentions \"{}\"", marker),
            ));
        }
        if !response.is_success() {
            warn!(
                "Login answered HTTP {} without a failure message, continuing",
                response.status_code
            );
        }

        info!("Signed in, landed on {}", response.final_url);
        Ok(Session {
            login_url: login_url.to_string(),
            landing: response,
        })
    }

    /// Loads `url` within the session.
    pub async fn fetch(&self, url: &str, referer: &str) -> std::result::Result<Page, Failure> {
        self.fetcher
            .get(url, &[("Referer", referer)])
            .await
            .map_err(Failure::from_transport)
    }
}

/// The first failure marker found in `body`, ignoring case.
pub fn login_failure_marker(body: &str) -> Option<&'static str> {
    let body = body.to_lowercase();
    LOGIN_FAILURE_MARKERS
        .iter()
        .copied()
        .find(|marker| body.contains(marker))
}
