//! In-memory state of the page for one load, plus the loading/error helpers.
//!
//! Every lifecycle step mutates a [`PageState`]; the HTML shell is only produced
//! from it at the very end (see `template`).

use std::ops::{Deref, DerefMut};

/// Banner text for any load failure, whatever the cause.
pub const LOAD_ERROR_MESSAGE: &str = "エラーが発生しました。時間をおいて再度お試しください。";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub loading_visible: bool,
    pub main_visible: bool,
    pub error_banner: Option<String>,
    pub picture_src: String,
    pub user_name: String,
    pub rank_text: String,
    pub content_list: ContentList,
    pub form: ConsultationForm,
    /// Blocking alerts raised by the page, oldest first.
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentList {
    /// Nothing rendered yet.
    Pending,
    Empty(String),
    Cards(Vec<Card>),
}

/// One outbound content link as shown in the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    pub href: String,
    pub icon: &'static str,
    pub title: String,
    pub type_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultationForm {
    pub draft: String,
    pub submit_disabled: bool,
    pub status: Option<StatusLine>,
    pub trigger: Option<Trigger>,
    /// Verified token the form posts back so the next load can resolve the same viewer.
    pub access_token: Option<String>,
}

/// How the submit control hands control to the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    FormSubmit,
    ButtonClick,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub tone: StatusTone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Error,
    Pending,
    Success,
}

impl StatusTone {
    pub fn color(self) -> &'static str {
        match self {
            StatusTone::Error => "#e74c3c",
            StatusTone::Pending => "#3498db",
            StatusTone::Success => "#2ecc71",
        }
    }
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            loading_visible: true,
            main_visible: false,
            error_banner: None,
            picture_src: String::new(),
            user_name: String::new(),
            rank_text: String::new(),
            content_list: ContentList::Pending,
            form: ConsultationForm {
                draft: String::new(),
                submit_disabled: false,
                status: None,
                trigger: None,
                access_token: None,
            },
            alerts: Vec::new(),
        }
    }
}

impl PageState {
    /// A freshly loaded page with the viewer's draft already typed in.
    pub fn with_draft(draft: impl Into<String>) -> Self {
        let mut page = Self::default();
        page.form.draft = draft.into();
        page
    }

    /// Swap the loading placeholder for the main content. Idempotent.
    pub fn hide_loading(&mut self) {
        self.loading_visible = false;
        self.main_visible = true;
    }

    /// Show `message` in the error banner; leaves every other region alone.
    pub fn display_error(&mut self, message: impl Into<String>) {
        self.error_banner = Some(message.into());
    }

    pub fn set_status(&mut self, text: impl Into<String>, tone: StatusTone) {
        self.form.status = Some(StatusLine {
            text: text.into(),
            tone,
        });
    }

    pub fn alert(&mut self, message: impl Into<String>) {
        self.alerts.push(message.into());
    }

    pub fn cards(&self) -> &[Card] {
        match &self.content_list {
            ContentList::Cards(cards) => cards.as_slice(),
            _ => &[],
        }
    }
}

/// Holds the page in its loading state; dropping it always reveals the main content.
pub struct LoadingGuard<'a> {
    page: &'a mut PageState,
}

impl<'a> LoadingGuard<'a> {
    pub fn acquire(page: &'a mut PageState) -> Self {
        page.loading_visible = true;
        Self { page }
    }
}

impl Deref for LoadingGuard<'_> {
    type Target = PageState;

    fn deref(&self) -> &PageState {
        &*self.page
    }
}

impl DerefMut for LoadingGuard<'_> {
    fn deref_mut(&mut self) -> &mut PageState {
        &mut *self.page
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.page.hide_loading();
    }
}

/// Disables the submit control while held; re-enabled on every exit path.
pub struct SubmitLock<'a> {
    page: &'a mut PageState,
}

impl<'a> SubmitLock<'a> {
    pub fn acquire(page: &'a mut PageState) -> Self {
        page.form.submit_disabled = true;
        Self { page }
    }
}

impl Deref for SubmitLock<'_> {
    type Target = PageState;

    fn deref(&self) -> &PageState {
        &*self.page
    }
}

impl DerefMut for SubmitLock<'_> {
    fn deref_mut(&mut self) -> &mut PageState {
        &mut *self.page
    }
}

impl Drop for SubmitLock<'_> {
    fn drop(&mut self) {
        self.page.form.submit_disabled = false;
    }
}
