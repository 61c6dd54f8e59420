use crate::error::IdentityError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use url::Url;

/// The authenticated viewer, resolved once per page load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerIdentity {
    #[serde(rename = "userId")]
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
}

/// Whatever the embedded frame handed us to prove who the viewer is.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub access_token: Option<String>,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
        }
    }
}

#[async_trait]
pub trait IdentitySdk: Send + Sync {
    async fn init(
        &self,
        app_id: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn SdkSession>, IdentityError>;
}

/// An initialised SDK bound to one page load.
#[async_trait]
pub trait SdkSession: Send + Sync {
    async fn get_profile(&self) -> Result<ViewerIdentity, IdentityError>;

    /// Ask the host shell to open `url` outside the embedded frame.
    async fn open_external(&self, url: Url) -> Result<(), IdentityError>;

    /// URLs queued by `open_external` that the host shell has not launched yet.
    fn take_external_launches(&self) -> Vec<Url>;
}

/// LINE Platform backed SDK: verifies the LIFF access token and reads the profile.
pub struct LineSdk {
    client: reqwest::Client,
    api_base: Url,
}

impl LineSdk {
    pub fn new(client: reqwest::Client, api_base: Url) -> Self {
        Self { client, api_base }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    client_id: String,
    expires_in: i64,
}

#[async_trait]
impl IdentitySdk for LineSdk {
    async fn init(
        &self,
        app_id: &str,
        credentials: &Credentials,
    ) -> Result<Arc<dyn SdkSession>, IdentityError> {
        let token = credentials
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| IdentityError::Init("no access token supplied".into()))?;
        let channel_id = channel_id(app_id);

        let mut verify_url = self.api_base.join("/oauth2/v2.1/verify")?;
        verify_url
            .query_pairs_mut()
            .append_pair("access_token", &token);
        let resp = self.client.get(verify_url).send().await?;
        if resp.status() == StatusCode::BAD_REQUEST || resp.status() == StatusCode::UNAUTHORIZED {
            return Err(IdentityError::Init("access token rejected".into()));
        }
        if !resp.status().is_success() {
            return Err(IdentityError::Status(resp.status()));
        }
        let verified: VerifyResponse = resp.json().await?;
        if verified.client_id != channel_id {
            return Err(IdentityError::Init(format!(
                "token issued for channel {} not {channel_id}",
                verified.client_id
            )));
        }
        if verified.expires_in <= 0 {
            return Err(IdentityError::Init("access token expired".into()));
        }
        debug!(%channel_id, expires_in = verified.expires_in, "liff access token verified");

        Ok(Arc::new(LineSession {
            client: self.client.clone(),
            api_base: self.api_base.clone(),
            token,
            launches: Mutex::new(Vec::new()),
        }))
    }
}

/// LIFF ids are `<channel id>-<suffix>`.
fn channel_id(app_id: &str) -> &str {
    app_id.split('-').next().unwrap_or(app_id)
}

struct LineSession {
    client: reqwest::Client,
    api_base: Url,
    token: String,
    launches: Mutex<Vec<Url>>,
}

#[async_trait]
impl SdkSession for LineSession {
    async fn get_profile(&self) -> Result<ViewerIdentity, IdentityError> {
        let url = self.api_base.join("/v2/profile")?;
        let resp = self.client.get(url).bearer_auth(&self.token).send().await?;
        if !resp.status().is_success() {
            return Err(IdentityError::Status(resp.status()));
        }
        let profile: ViewerIdentity = resp.json().await?;
        if profile.id.is_empty() {
            return Err(IdentityError::Profile("profile has no user id".into()));
        }
        Ok(profile)
    }

    async fn open_external(&self, url: Url) -> Result<(), IdentityError> {
        info!(host = ?url.host_str(), "queued external launch");
        queue_launch(&self.launches, url);
        Ok(())
    }

    fn take_external_launches(&self) -> Vec<Url> {
        drain_launches(&self.launches)
    }
}

fn queue_launch(queue: &Mutex<Vec<Url>>, url: Url) {
    match queue.lock() {
        Ok(mut guard) => guard.push(url),
        Err(poisoned) => poisoned.into_inner().push(url),
    }
}

fn drain_launches(queue: &Mutex<Vec<Url>>) -> Vec<Url> {
    match queue.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    }
}

/// Fixed-profile SDK for local preview and tests.
#[derive(Clone)]
pub struct StaticSdk {
    outcome: Result<ViewerIdentity, String>,
}

impl StaticSdk {
    pub fn viewer(identity: ViewerIdentity) -> Self {
        Self {
            outcome: Ok(identity),
        }
    }

    #[allow(dead_code)]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
        }
    }
}

#[async_trait]
impl IdentitySdk for StaticSdk {
    async fn init(
        &self,
        _app_id: &str,
        _credentials: &Credentials,
    ) -> Result<Arc<dyn SdkSession>, IdentityError> {
        match &self.outcome {
            Ok(identity) => Ok(Arc::new(StaticSession {
                identity: identity.clone(),
                launches: Mutex::new(Vec::new()),
            })),
            Err(reason) => Err(IdentityError::Init(reason.clone())),
        }
    }
}

struct StaticSession {
    identity: ViewerIdentity,
    launches: Mutex<Vec<Url>>,
}

#[async_trait]
impl SdkSession for StaticSession {
    async fn get_profile(&self) -> Result<ViewerIdentity, IdentityError> {
        Ok(self.identity.clone())
    }

    async fn open_external(&self, url: Url) -> Result<(), IdentityError> {
        queue_launch(&self.launches, url);
        Ok(())
    }

    fn take_external_launches(&self) -> Vec<Url> {
        drain_launches(&self.launches)
    }
}
