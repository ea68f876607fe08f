use crate::config::Config;
use crate::error::{Result, ScraperError};
use crate::models::DelayConfig;
use async_trait::async_trait;
use rand::Rng;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub status_code: u16,
    pub body: String,
    /// The URL after redirects.
    pub final_url: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Performs the portal requests for one run.
///
/// Session state (cookies) lives inside the implementation and is shared by
/// every call on the same instance.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Page>;

    async fn post(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Page>;
}

/// Picks the fetcher the configuration asks for.
pub fn from_config(config: &Config) -> Result<Box<dyn Fetcher>> {
    match (config.use_browser, &config.browser_command) {
        (true, Some(command)) => Ok(Box::new(CommandFetcher::new(command, config.timeout)?)),
        (true, None) => Err(ScraperError::ConfigMissing(vec!["BROWSER_COMMAND".to_string()])),
        (false, _) => Ok(Box::new(HttpFetcher::new(config.timeout, config.delay.clone())?)),
    }
}

/// Plain HTTP with a cookie jar.
pub struct HttpFetcher {
    client: reqwest::Client,
    delay: DelayConfig,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, delay: DelayConfig) -> Result<Self> {
        let cookie_jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let client = reqwest::Client::builder()
            .cookie_provider(cookie_jar)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, delay })
    }

    async fn pause(&self) {
        if !self.delay.enabled {
            return;
        }

        let millis = rand::rng().random_range(self.delay.min_delay_ms..=self.delay.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    async fn into_page(response: reqwest::Response) -> Result<Page> {
        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;

        Ok(Page {
            status_code,
            body,
            final_url,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Page> {
        self.pause().await;
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        Self::into_page(request.send().await?).await
    }

    async fn post(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Page> {
        self.pause().await;
        debug!("POST {} ({} fields)", url, form.len());

        let mut request = self.client.post(url).form(form);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        Self::into_page(request.send().await?).await
    }
}

/// Delegates page loads to an external browser-automation command.
///
/// The command is invoked as `<command> get <url>` or `<command> post <url>`
/// with `{"headers": {...}, "form": {...}}` on stdin. It prints either a
/// [`Page`] as JSON or the rendered HTML. The command owns the browser and its
/// session; this type only bounds each call by the configured timeout.
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandFetcher {
    pub fn new(command_line: &str, timeout: Duration) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| ScraperError::ConfigInvalid {
            key: "BROWSER_COMMAND".to_string(),
            value: command_line.to_string(),
        })?;

        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    async fn render(
        &self,
        method: &str,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Page> {
        debug!("{} {} via {}", method, url, self.program);

        let request = serde_json::json!({
            "headers": headers
                .iter()
                .map(|(name, value)| (name.to_string(), serde_json::Value::from(*value)))
                .collect::<serde_json::Map<_, _>>(),
            "form": form
                .iter()
                .map(|(name, value)| (name.clone(), serde_json::Value::from(value.as_str())))
                .collect::<serde_json::Map<_, _>>(),
        });

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(method)
            .arg(url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScraperError::Renderer(format!("could not start {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A command that ignores stdin may already have closed it.
            if let Err(e) = stdin.write_all(request.to_string().as_bytes()).await {
                debug!("{} did not read the request: {}", self.program, e);
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ScraperError::Timeout(format!("{} did not finish within {:?}", url, self.timeout))
            })?
            .map_err(|e| ScraperError::Renderer(e.to_string()))?;

        if !output.status.success() {
            return Err(ScraperError::Renderer(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(parse_render_output(&String::from_utf8_lossy(&output.stdout), url))
    }
}

#[async_trait]
impl Fetcher for CommandFetcher {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Page> {
        self.render("get", url, &[], headers).await
    }

    async fn post(
        &self,
        url: &str,
        form: &[(String, String)],
        headers: &[(&str, &str)],
    ) -> Result<Page> {
        self.render("post", url, form, headers).await
    }
}

/// Reads a render command's stdout: a JSON [`Page`], or else raw HTML for `url`.
pub fn parse_render_output(stdout: &str, url: &str) -> Page {
    serde_json::from_str::<Page>(stdout.trim()).unwrap_or_else(|_| Page {
        status_code: 200,
        body: stdout.to_string(),
        final_url: url.to_string(),
    })
}
