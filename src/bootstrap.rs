use crate::content::{ContentFetcher, ViewerContent};
use crate::error::{FetchError, IdentityError};
use crate::identity::{Credentials, IdentitySdk, SdkSession, ViewerIdentity};
use crate::page::{LOAD_ERROR_MESSAGE, LoadingGuard, PageState};
use crate::render;
use crate::submit::Submitter;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// What one page load learned about the viewer; read by the renderer and submitter.
#[derive(Clone, Default)]
pub struct PageContext {
    viewer: Option<ViewerIdentity>,
    session: Option<Arc<dyn SdkSession>>,
}

impl PageContext {
    pub fn resolved(viewer: ViewerIdentity, session: Arc<dyn SdkSession>) -> Self {
        Self {
            viewer: Some(viewer),
            session: Some(session),
        }
    }

    /// No viewer could be resolved.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn viewer(&self) -> Option<&ViewerIdentity> {
        self.viewer.as_ref()
    }

    pub fn session(&self) -> Option<&Arc<dyn SdkSession>> {
        self.session.as_ref()
    }

    pub(crate) fn viewer_session(&self) -> Option<(&ViewerIdentity, &dyn SdkSession)> {
        match (&self.viewer, &self.session) {
            (Some(viewer), Some(session)) => Some((viewer, session.as_ref())),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageContext")
            .field("viewer", &self.viewer)
            .field("session", &self.session.is_some())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Runs the page-load sequence: identity, content fetch, render, trigger wiring.
#[derive(Clone)]
pub struct Bootstrapper {
    app_id: String,
    sdk: Arc<dyn IdentitySdk>,
    fetcher: Arc<ContentFetcher>,
    submitter: Submitter,
}

impl Bootstrapper {
    pub fn new(
        app_id: impl Into<String>,
        sdk: Arc<dyn IdentitySdk>,
        fetcher: Arc<ContentFetcher>,
        submitter: Submitter,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            sdk,
            fetcher,
            submitter,
        }
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Never fails: any error ends up as the generic banner, and the page always
    /// leaves its loading state.
    pub async fn load(&self, page: &mut PageState, credentials: &Credentials) -> PageContext {
        let mut loading = LoadingGuard::acquire(page);
        let mut ctx = PageContext::anonymous();
        match self.resolve_and_fetch(credentials, &mut ctx).await {
            Ok(content) => {
                if let Some(viewer) = ctx.viewer() {
                    render::update_page(
                        &mut loading,
                        viewer,
                        content.rank.as_ref(),
                        &content.items,
                    );
                    loading.form.trigger = Some(self.submitter.trigger());
                    loading.form.access_token = credentials.access_token.clone();
                    info!(user_id = %viewer.id, cards = loading.cards().len(), "page loaded");
                }
            }
            Err(err) => {
                error!(?err, "page load failed");
                loading.display_error(LOAD_ERROR_MESSAGE);
            }
        }
        ctx
    }

    async fn resolve_and_fetch(
        &self,
        credentials: &Credentials,
        ctx: &mut PageContext,
    ) -> Result<ViewerContent, LoadError> {
        let session = self.sdk.init(&self.app_id, credentials).await?;
        let viewer = session.get_profile().await?;
        *ctx = PageContext::resolved(viewer.clone(), session);
        let content = self.fetcher.fetch(&viewer.id).await?;
        Ok(content)
    }
}
