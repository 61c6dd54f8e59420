use anyhow::{Context, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_LIFF_ID: &str = "1657635807-1GX23pBJ";
pub const DEFAULT_LINE_API_BASE: &str = "https://api.line.me";
pub const DEFAULT_CONTENT_ENDPOINT: &str = "https://script.google.com/macros/s/AKfycbw3EC1QzymI_4DaA8orwKIlf9_sjEV6Q-_pQONgcjifnL0KFhQRdc21ZPmPXj7mp8Gj7A/exec";

/// Runtime configuration for the portal page and its preview host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub liff_id: String,
    pub line_api_base: Url,
    pub content_endpoint: Url,
    pub sink: SinkConfig,
    pub page_template: Option<PathBuf>,
    pub enable_cors: bool,
    /// Zero leaves the transport default in place.
    pub http_timeout: Duration,
}

/// Which submission sink this deployment is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    Direct,
    PlainText,
    Webhook,
    Form,
}

impl std::str::FromStr for SinkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "plain-text" | "plaintext" => Ok(Self::PlainText),
            "webhook" => Ok(Self::Webhook),
            "form" => Ok(Self::Form),
            other => Err(anyhow!("unknown SUBMIT_SINK {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SinkConfig {
    Direct { endpoint: Url },
    PlainText { endpoint: Url },
    Webhook { endpoint: Url },
    Form { form_url: Url, fields: FormFields },
}

impl SinkConfig {
    pub fn kind(&self) -> SinkKind {
        match self {
            SinkConfig::Direct { .. } => SinkKind::Direct,
            SinkConfig::PlainText { .. } => SinkKind::PlainText,
            SinkConfig::Webhook { .. } => SinkKind::Webhook,
            SinkConfig::Form { .. } => SinkKind::Form,
        }
    }
}

/// Field names the external form expects, without the `prefill_` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFields {
    pub user_id: String,
    pub display_name: String,
    pub text: String,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            user_id: "userId".into(),
            display_name: "displayName".into(),
            text: "text".into(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr: SocketAddr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .context("failed to parse BIND_ADDR")?;

        let liff_id = lookup("LIFF_ID").unwrap_or_else(|| DEFAULT_LIFF_ID.to_string());
        if liff_id.trim().is_empty() {
            bail!("LIFF_ID must not be empty");
        }

        let line_api_base = parse_url(
            "LINE_API_BASE",
            lookup("LINE_API_BASE").unwrap_or_else(|| DEFAULT_LINE_API_BASE.to_string()),
        )?;
        let content_endpoint = parse_url(
            "CONTENT_ENDPOINT",
            lookup("CONTENT_ENDPOINT").unwrap_or_else(|| DEFAULT_CONTENT_ENDPOINT.to_string()),
        )?;

        let kind: SinkKind = lookup("SUBMIT_SINK")
            .unwrap_or_else(|| "direct".to_string())
            .parse()?;
        let sink = match kind {
            SinkKind::Direct | SinkKind::PlainText => {
                let endpoint = match lookup("SUBMIT_ENDPOINT") {
                    Some(raw) => parse_url("SUBMIT_ENDPOINT", raw)?,
                    None => content_endpoint.clone(),
                };
                if kind == SinkKind::Direct {
                    SinkConfig::Direct { endpoint }
                } else {
                    SinkConfig::PlainText { endpoint }
                }
            }
            SinkKind::Webhook => {
                let raw = lookup("WEBHOOK_ENDPOINT")
                    .ok_or_else(|| anyhow!("WEBHOOK_ENDPOINT is required for the webhook sink"))?;
                SinkConfig::Webhook {
                    endpoint: parse_url("WEBHOOK_ENDPOINT", raw)?,
                }
            }
            SinkKind::Form => {
                let raw = lookup("FORM_URL")
                    .ok_or_else(|| anyhow!("FORM_URL is required for the form sink"))?;
                let defaults = FormFields::default();
                SinkConfig::Form {
                    form_url: parse_url("FORM_URL", raw)?,
                    fields: FormFields {
                        user_id: lookup("FORM_FIELD_USER_ID").unwrap_or(defaults.user_id),
                        display_name: lookup("FORM_FIELD_DISPLAY_NAME")
                            .unwrap_or(defaults.display_name),
                        text: lookup("FORM_FIELD_TEXT").unwrap_or(defaults.text),
                    },
                }
            }
        };

        let page_template = lookup("PAGE_TEMPLATE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let enable_cors = lookup("ENABLE_CORS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let http_timeout = lookup("HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(0));

        Ok(Self {
            bind_addr,
            liff_id,
            line_api_base,
            content_endpoint,
            sink,
            page_template,
            enable_cors,
            http_timeout,
        })
    }

    /// Shared HTTP client for every outbound call the page makes.
    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if !self.http_timeout.is_zero() {
            builder = builder.timeout(self.http_timeout);
        }
        builder.build().context("failed to build HTTP client")
    }
}

fn parse_url(key: &str, raw: String) -> anyhow::Result<Url> {
    Url::parse(raw.trim()).with_context(|| format!("failed to parse {key}"))
}
