use crate::page::{Card, ContentList, PageState, Trigger};
use kuchiki::traits::*;
use kuchiki::{ElementData, NodeDataRef, NodeRef};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

const EMBEDDED_SHELL: &str = include_str!("../assets/index.html");

const CARD_MARKUP: &str = "<a class=\"content-card\" target=\"_blank\" rel=\"noopener\">\
<div class=\"content-icon\"></div>\
<div class=\"content-details\"><h3></h3><p></p></div></a>";

const TOKEN_MARKUP: &str = "<input type=\"hidden\" name=\"access_token\">";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("page shell has no element matching {0}")]
    MissingElement(&'static str),
}

/// The HTML page shell that page state is projected into.
#[derive(Debug, Clone)]
pub struct PageTemplate {
    shell: String,
}

impl Default for PageTemplate {
    fn default() -> Self {
        Self {
            shell: EMBEDDED_SHELL.to_string(),
        }
    }
}

impl PageTemplate {
    /// Reads the shell from `path`, falling back to the embedded copy.
    pub async fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match tokio::fs::read_to_string(path).await {
            Ok(shell) => Self { shell },
            Err(err) => {
                warn!(?path, ?err, "page template not readable; using embedded shell");
                Self::default()
            }
        }
    }

    pub fn render(&self, page: &PageState) -> Result<String, TemplateError> {
        let document = kuchiki::parse_html().one(self.shell.clone());

        set_display(&select(&document, "#loading")?, page.loading_visible);
        set_display(&select(&document, "#main-content")?, page.main_visible);

        let banner = select(&document, "#error-display")?;
        set_display(&banner, page.error_banner.is_some());
        set_text(banner.as_node(), page.error_banner.as_deref().unwrap_or_default());

        let alerts = select(&document, "#page-alerts")?;
        clear(alerts.as_node());
        for alert in &page.alerts {
            let p = element("<p></p>", "p")?;
            set_text(&p, alert);
            alerts.as_node().append(p);
        }

        set_attr(&select(&document, "#user-picture")?, "src", &page.picture_src);
        set_text(select(&document, "#user-name")?.as_node(), &page.user_name);
        set_text(select(&document, "#user-rank")?.as_node(), &page.rank_text);

        let list = select(&document, "#content-list")?;
        clear(list.as_node());
        match &page.content_list {
            ContentList::Pending => {}
            ContentList::Empty(message) => {
                let p = element("<p></p>", "p")?;
                set_text(&p, message);
                list.as_node().append(p);
            }
            ContentList::Cards(cards) => {
                for card in cards {
                    list.as_node().append(card_node(card)?);
                }
            }
        }

        let form = select(&document, "#consultation-form")?;
        match page.form.trigger {
            Some(trigger) => {
                set_attr(&form, "action", "/consult");
                set_attr(&form, "method", "post");
                set_attr(
                    &form,
                    "data-trigger",
                    match trigger {
                        Trigger::FormSubmit => "submit",
                        Trigger::ButtonClick => "click",
                    },
                );
                if let Some(token) = &page.form.access_token {
                    let input = element(TOKEN_MARKUP, "input")?;
                    if let Some(el) = input.as_element() {
                        el.attributes.borrow_mut().insert("value", token.clone());
                    }
                    form.as_node().prepend(input);
                }
            }
            None => {
                form.attributes.borrow_mut().remove("action");
            }
        }
        set_text(select(&document, "#consultation-text")?.as_node(), &page.form.draft);

        let button = select(&document, "#submit-button")?;
        if page.form.submit_disabled {
            set_attr(&button, "disabled", "");
        } else {
            button.attributes.borrow_mut().remove("disabled");
        }

        let status = select(&document, "#submit-status")?;
        match &page.form.status {
            Some(line) => {
                set_text(status.as_node(), &line.text);
                set_attr(&status, "style", &format!("color:{}", line.tone.color()));
            }
            None => set_text(status.as_node(), ""),
        }

        Ok(document.to_string())
    }
}

fn card_node(card: &Card) -> Result<NodeRef, TemplateError> {
    let anchor = element(CARD_MARKUP, "a.content-card")?;
    if let Some(el) = anchor.as_element() {
        el.attributes.borrow_mut().insert("href", card.href.clone());
    }
    set_text(
        anchor
            .select_first(".content-icon")
            .map_err(|_| TemplateError::MissingElement(".content-icon"))?
            .as_node(),
        card.icon,
    );
    set_text(
        anchor
            .select_first("h3")
            .map_err(|_| TemplateError::MissingElement("h3"))?
            .as_node(),
        &card.title,
    );
    set_text(
        anchor
            .select_first("p")
            .map_err(|_| TemplateError::MissingElement("p"))?
            .as_node(),
        &format!("種類: {}", card.type_text),
    );
    Ok(anchor)
}

/// Parses fixed markup and detaches the first node matching `selector`.
fn element(markup: &str, selector: &'static str) -> Result<NodeRef, TemplateError> {
    let fragment = kuchiki::parse_html().one(markup);
    let node = fragment
        .select_first(selector)
        .map_err(|_| TemplateError::MissingElement(selector))?
        .as_node()
        .clone();
    node.detach();
    Ok(node)
}

fn select(
    document: &NodeRef,
    selector: &'static str,
) -> Result<NodeDataRef<ElementData>, TemplateError> {
    document
        .select_first(selector)
        .map_err(|_| TemplateError::MissingElement(selector))
}

fn clear(node: &NodeRef) {
    let existing: Vec<_> = node.children().collect();
    for child in existing {
        child.detach();
    }
}

fn set_text(node: &NodeRef, text: &str) {
    clear(node);
    if !text.is_empty() {
        node.append(NodeRef::new_text(text));
    }
}

fn set_attr(el: &NodeDataRef<ElementData>, name: &str, value: &str) {
    el.attributes.borrow_mut().insert(name, value.to_string());
}

fn set_display(el: &NodeDataRef<ElementData>, visible: bool) {
    set_attr(el, "style", if visible { "display:block" } else { "display:none" });
}
