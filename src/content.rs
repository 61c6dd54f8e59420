use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// `{success, message?, ...payload}` wrapper used by every endpoint the page talks to.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentPayload {
    #[serde(default)]
    pub rank: Option<RankValue>,
    #[serde(default)]
    pub contents: Option<Vec<ContentItem>>,
}

/// Rank is displayed exactly as the endpoint sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RankValue {
    Text(String),
    Number(serde_json::Number),
}

impl RankValue {
    /// Empty text counts as missing, the way the page treats a falsy rank.
    pub fn display(&self) -> Option<String> {
        match self {
            RankValue::Text(s) if s.is_empty() => None,
            RankValue::Text(s) => Some(s.clone()),
            RankValue::Number(n) if n.as_f64() == Some(0.0) => None,
            RankValue::Number(n) => Some(n.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "type")]
    pub kind: Option<ItemKind>,
}

/// A single category label or an ordered list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemKind {
    One(String),
    Many(Vec<String>),
}

impl ItemKind {
    pub fn primary(&self) -> Option<&str> {
        match self {
            ItemKind::One(label) => Some(label.as_str()),
            ItemKind::Many(labels) => labels.first().map(String::as_str),
        }
    }

    pub fn joined(&self) -> String {
        match self {
            ItemKind::One(label) => label.clone(),
            ItemKind::Many(labels) => labels.join(", "),
        }
    }
}

/// Rank and content list returned for one viewer.
#[derive(Debug, Clone, Default)]
pub struct ViewerContent {
    pub rank: Option<RankValue>,
    pub items: Vec<ContentItem>,
}

pub struct ContentFetcher {
    client: reqwest::Client,
    endpoint: Url,
}

impl ContentFetcher {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub async fn fetch(&self, user_id: &str) -> Result<ViewerContent, FetchError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("userId", user_id);
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let body = resp.bytes().await?;
        let envelope: Envelope<ContentPayload> = serde_json::from_slice(&body)?;
        if !envelope.success {
            return Err(FetchError::Rejected(envelope.message));
        }
        let items = envelope.payload.contents.unwrap_or_default();
        debug!(%user_id, items = items.len(), "fetched viewer content");
        Ok(ViewerContent {
            rank: envelope.payload.rank,
            items,
        })
    }
}
