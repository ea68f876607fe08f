use crate::client::PortalClient;
use crate::config::Config;
use crate::error::Failure;
use crate::models::{AttendanceRecord, ExtractionResult, PipelineStatus};
use crate::notifier::{Delivery, NotificationRouter};
use crate::parsers::attendance::extract;
use crate::parsers::endpoint::{self, Resolution, ResolutionSource};
use crate::report::compose_message;
use chrono::Local;
use tracing::{info, warn};

/// How a check ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: PipelineStatus,
    /// `Found` exactly when `status` is `Ok`.
    pub extraction: ExtractionResult,
    /// Error text captured from the failing step.
    pub detail: Option<String>,
    /// The attendance page the run used, once one was chosen.
    pub attendance_url: Option<String>,
}

/// A check plus what happened to its notification.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub delivery: Delivery,
}

impl RunReport {
    /// Process exit code: the status code, or 7 when a successful check could
    /// not be delivered.
    pub fn exit_code(&self) -> i32 {
        match (self.outcome.status, self.delivery) {
            (PipelineStatus::Ok, Delivery::Failed | Delivery::Suppressed) => 7,
            (status, _) => status.exit_code(),
        }
    }
}

pub struct Pipeline<'a> {
    config: &'a Config,
    client: PortalClient,
    router: NotificationRouter,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config, client: PortalClient, router: NotificationRouter) -> Self {
        Self {
            config,
            client,
            router,
        }
    }

    /// Checks attendance and sends the resulting message.
    pub async fn run(&self) -> RunReport {
        let outcome = self.check().await;
        match outcome.status {
            PipelineStatus::Ok => info!(
                "Found {} attendance record(s)",
                outcome.extraction.records().len()
            ),
            status => warn!(
                "Check ended with {}: {}",
                status,
                outcome.detail.as_deref().unwrap_or("")
            ),
        }

        let message = compose_message(&outcome, Local::now().naive_local());
        let delivery = self.router.dispatch(&message).await;

        RunReport { outcome, delivery }
    }

    /// Logs in, finds the report and extracts it, without notifying anyone.
    pub async fn check(&self) -> RunOutcome {
        let mut attendance_url = None;

        match self.steps(&mut attendance_url).await {
            Ok(records) => RunOutcome {
                status: PipelineStatus::Ok,
                extraction: ExtractionResult::Found(records),
                detail: None,
                attendance_url,
            },
            Err(failure) => RunOutcome {
                status: failure.status,
                extraction: ExtractionResult::NotFound,
                detail: Some(failure.detail),
                attendance_url,
            },
        }
    }

    async fn steps(
        &self,
        attendance_url: &mut Option<String>,
    ) -> Result<Vec<AttendanceRecord>, Failure> {
        let config = self.config;

        let session = self
            .client
            .authenticate(&config.login_url, &config.credential)
            .await?;

        let resolution = match &config.attendance_url {
            Some(url) => Resolution {
                url: url.clone(),
                source: ResolutionSource::Configured,
            },
            None => endpoint::resolve(
                &session.landing.body,
                &config.login_url,
                &config.default_attendance_path,
            ),
        };
        info!(
            "Attendance page {} ({:?})",
            resolution.url, resolution.source
        );
        *attendance_url = Some(resolution.url.clone());

        let page = self
            .client
            .fetch(&resolution.url, &session.landing.final_url)
            .await?;

        if page.status_code == 404 {
            let status = if resolution.source == ResolutionSource::Default {
                PipelineStatus::EndpointNotFound
            } else {
                PipelineStatus::AttendancePageError
            };
            let candidates = endpoint::candidate_links(&session.landing.body, &config.login_url);
            let hint = if candidates.is_empty() {
                "no candidate links on the portal page".to_string()
            } else {
                format!("candidate links: {}", candidates.join(", "))
            };
            return Err(Failure::new(
                status,
                format!("{} answered HTTP 404; {}", resolution.url, hint),
            ));
        }
        if !page.is_success() {
            return Err(Failure::new(
                PipelineStatus::AttendancePageError,
                format!("{} answered HTTP {}", resolution.url, page.status_code),
            ));
        }

        match extract(&page.body) {
            ExtractionResult::Found(records) => Ok(records),
            ExtractionResult::NotFound => Err(Failure::new(
                PipelineStatus::ExtractionEmpty,
                format!("No attendance figures found on {}", page.final_url),
            )),
        }
    }
}
