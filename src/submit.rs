use crate::bootstrap::PageContext;
use crate::config::{FormFields, SinkConfig};
use crate::content::Envelope;
use crate::error::SubmitError;
use crate::identity::{SdkSession, ViewerIdentity};
use crate::page::{PageState, StatusTone, SubmitLock, Trigger};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;

pub const EMPTY_TEXT_MESSAGE: &str = "相談内容を入力してください。";
pub const MISSING_VIEWER_MESSAGE: &str =
    "ユーザー情報の取得に失敗しました。ページを再読み込みしてください。";
pub const SENDING_MESSAGE: &str = "送信中...";
pub const SUCCESS_MESSAGE: &str = "ご相談ありがとうございます。内容を受け付けました。";
pub const FAILURE_MESSAGE: &str = "送信中にエラーが発生しました。";

pub const SUBMIT_ACTION: &str = "submitConsultation";
/// Workflow label every webhook record starts in ("unhandled").
pub const WEBHOOK_INITIAL_STATUS: &str = "未対応";

/// How the viewer learns what happened to their submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    /// Validated, control disabled while in flight, result on the status line.
    StatusLine,
    /// Fire-and-forget handoff to an external page.
    Handoff,
}

/// One validated consultation ready for a sink.
#[derive(Debug, Clone, Copy)]
pub struct Consultation<'a> {
    pub viewer: &'a ViewerIdentity,
    pub text: &'a str,
}

#[async_trait]
pub trait ConsultationSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn trigger(&self) -> Trigger;
    fn feedback(&self) -> Feedback;
    async fn deliver(
        &self,
        consultation: Consultation<'_>,
        host: &dyn SdkSession,
    ) -> Result<(), SubmitError>;
}

pub fn sink_from_config(client: reqwest::Client, cfg: &SinkConfig) -> Arc<dyn ConsultationSink> {
    match cfg {
        SinkConfig::Direct { endpoint } => Arc::new(DirectPostSink::new(client, endpoint.clone())),
        SinkConfig::PlainText { endpoint } => {
            Arc::new(PlainTextPostSink::new(client, endpoint.clone()))
        }
        SinkConfig::Webhook { endpoint } => Arc::new(WebhookSink::new(client, endpoint.clone())),
        SinkConfig::Form { form_url, fields } => {
            Arc::new(FormHandoffSink::new(form_url.clone(), fields.clone()))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionBody<'a> {
    action: &'static str,
    user_id: &'a str,
    display_name: &'a str,
    text: &'a str,
}

impl<'a> From<Consultation<'a>> for SubmissionBody<'a> {
    fn from(c: Consultation<'a>) -> Self {
        Self {
            action: SUBMIT_ACTION,
            user_id: &c.viewer.id,
            display_name: &c.viewer.display_name,
            text: c.text,
        }
    }
}

/// POSTs the consultation as JSON and checks the response envelope.
pub struct DirectPostSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl DirectPostSink {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl ConsultationSink for DirectPostSink {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn trigger(&self) -> Trigger {
        Trigger::FormSubmit
    }

    fn feedback(&self) -> Feedback {
        Feedback::StatusLine
    }

    async fn deliver(
        &self,
        consultation: Consultation<'_>,
        _host: &dyn SdkSession,
    ) -> Result<(), SubmitError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&SubmissionBody::from(consultation))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SubmitError::Status {
                status,
                detail: None,
            });
        }
        let body = resp.bytes().await?;
        let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&body)?;
        if !envelope.success {
            return Err(SubmitError::Rejected(envelope.message));
        }
        Ok(())
    }
}

/// Same body as [`DirectPostSink`] sent as `text/plain` so the endpoint needs no
/// CORS preflight. The response is never inspected: delivery is best-effort.
pub struct PlainTextPostSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl PlainTextPostSink {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl ConsultationSink for PlainTextPostSink {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn trigger(&self) -> Trigger {
        Trigger::FormSubmit
    }

    fn feedback(&self) -> Feedback {
        Feedback::StatusLine
    }

    async fn deliver(
        &self,
        consultation: Consultation<'_>,
        _host: &dyn SdkSession,
    ) -> Result<(), SubmitError> {
        let body = serde_json::to_string(&SubmissionBody::from(consultation))?;
        let resp = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "text/plain;charset=utf-8")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            warn!(
                status = %resp.status(),
                "plain-text sink got a non-success status; reporting success anyway"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRecord<'a> {
    submitted_at: String,
    user_id: &'a str,
    display_name: &'a str,
    text: &'a str,
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct WebhookError {
    #[serde(default)]
    msg: Option<String>,
}

/// Posts a fixed-shape record to a workspace automation webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookSink {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl ConsultationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn trigger(&self) -> Trigger {
        Trigger::FormSubmit
    }

    fn feedback(&self) -> Feedback {
        Feedback::StatusLine
    }

    async fn deliver(
        &self,
        consultation: Consultation<'_>,
        _host: &dyn SdkSession,
    ) -> Result<(), SubmitError> {
        let record = WebhookRecord {
            submitted_at: chrono::Utc::now().to_rfc3339(),
            user_id: &consultation.viewer.id,
            display_name: &consultation.viewer.display_name,
            text: consultation.text,
            status: WEBHOOK_INITIAL_STATUS,
        };
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&record)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = resp
            .bytes()
            .await
            .ok()
            .and_then(|b| serde_json::from_slice::<WebhookError>(&b).ok())
            .and_then(|e| e.msg);
        Err(SubmitError::Status { status, detail })
    }
}

/// Opens an external form with the consultation prefilled.
pub struct FormHandoffSink {
    form_url: Url,
    fields: FormFields,
}

impl FormHandoffSink {
    pub fn new(form_url: Url, fields: FormFields) -> Self {
        Self { form_url, fields }
    }

    pub fn prefilled_url(&self, consultation: Consultation<'_>) -> Url {
        let mut query = self.form_url.query().unwrap_or_default().to_string();
        let values = [
            (&self.fields.user_id, consultation.viewer.id.as_str()),
            (&self.fields.display_name, consultation.viewer.display_name.as_str()),
            (&self.fields.text, consultation.text),
        ];
        for (field, value) in values {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str("prefill_");
            query.push_str(&encode_component(field));
            query.push('=');
            query.push_str(&encode_component(value));
        }
        let mut url = self.form_url.clone();
        url.set_query(Some(&query));
        url
    }
}

/// Percent-encodes like `encodeURIComponent` for the characters we care about:
/// spaces become `%20`, never `+`.
fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[async_trait]
impl ConsultationSink for FormHandoffSink {
    fn name(&self) -> &'static str {
        "form"
    }

    fn trigger(&self) -> Trigger {
        Trigger::ButtonClick
    }

    fn feedback(&self) -> Feedback {
        Feedback::Handoff
    }

    async fn deliver(
        &self,
        consultation: Consultation<'_>,
        host: &dyn SdkSession,
    ) -> Result<(), SubmitError> {
        let url = self.prefilled_url(consultation);
        host.open_external(url).await?;
        Ok(())
    }
}

/// Runs a user-triggered submission against the configured sink.
#[derive(Clone)]
pub struct Submitter {
    sink: Arc<dyn ConsultationSink>,
}

impl Submitter {
    pub fn new(sink: Arc<dyn ConsultationSink>) -> Self {
        Self { sink }
    }

    pub fn trigger(&self) -> Trigger {
        self.sink.trigger()
    }

    pub async fn submit(&self, page: &mut PageState, ctx: &PageContext) -> Result<(), SubmitError> {
        match self.sink.feedback() {
            Feedback::StatusLine => self.submit_with_status(page, ctx).await,
            Feedback::Handoff => self.hand_off(page, ctx).await,
        }
    }

    async fn submit_with_status(
        &self,
        page: &mut PageState,
        ctx: &PageContext,
    ) -> Result<(), SubmitError> {
        let text = page.form.draft.trim().to_string();
        if text.is_empty() {
            page.set_status(EMPTY_TEXT_MESSAGE, StatusTone::Error);
            return Err(SubmitError::EmptyText);
        }
        let Some((viewer, host)) = ctx.viewer_session() else {
            page.set_status(MISSING_VIEWER_MESSAGE, StatusTone::Error);
            return Err(SubmitError::MissingViewer);
        };

        let mut lock = SubmitLock::acquire(page);
        lock.set_status(SENDING_MESSAGE, StatusTone::Pending);
        let consultation = Consultation {
            viewer,
            text: &text,
        };
        match self.sink.deliver(consultation, host).await {
            Ok(()) => {
                info!(sink = self.sink.name(), user_id = %viewer.id, "consultation delivered");
                lock.form.draft.clear();
                lock.set_status(SUCCESS_MESSAGE, StatusTone::Success);
                Ok(())
            }
            Err(err) => {
                error!(sink = self.sink.name(), ?err, "error submitting consultation");
                lock.set_status(FAILURE_MESSAGE, StatusTone::Error);
                Err(err)
            }
        }
    }

    async fn hand_off(&self, page: &mut PageState, ctx: &PageContext) -> Result<(), SubmitError> {
        let Some((viewer, host)) = ctx.viewer_session() else {
            page.alert(MISSING_VIEWER_MESSAGE);
            return Err(SubmitError::MissingViewer);
        };
        let text = page.form.draft.trim().to_string();
        let consultation = Consultation {
            viewer,
            text: &text,
        };
        let delivered = self.sink.deliver(consultation, host).await;
        if let Err(err) = &delivered {
            error!(sink = self.sink.name(), ?err, "external handoff failed");
        }
        delivered
    }
}
