use crate::bootstrap::Bootstrapper;
use crate::config::AppConfig;
use crate::identity::Credentials;
use crate::page::PageState;
use crate::template::PageTemplate;
use axum::Router;
use axum::extract::{Form, Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use http::{HeaderMap, StatusCode, header};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub bootstrapper: Bootstrapper,
    pub template: Arc<PageTemplate>,
}

impl AppState {
    pub fn new(config: AppConfig, bootstrapper: Bootstrapper, template: PageTemplate) -> Self {
        Self {
            config: Arc::new(config),
            bootstrapper,
            template: Arc::new(template),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(page_load))
        .route("/consult", post(consult))
        .route("/healthz", get(|| async { "ok" }));
    if state.config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

pub async fn run(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, sink = ?state.config.sink.kind(), "portal listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(?err, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsultForm {
    #[serde(default)]
    pub text: String,
    pub access_token: Option<String>,
}

async fn page_load(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Response {
    let credentials = credentials_from(&headers, query.access_token);
    let mut page = PageState::default();
    state.bootstrapper.load(&mut page, &credentials).await;
    render(&state, &page)
}

async fn consult(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ConsultForm>,
) -> Response {
    let credentials = credentials_from(&headers, form.access_token);
    let mut page = PageState::with_draft(form.text);
    let ctx = state.bootstrapper.load(&mut page, &credentials).await;
    if page.form.trigger.is_none() {
        debug!("submission ignored: page has no attached trigger");
        return render(&state, &page);
    }

    if let Err(err) = state.bootstrapper.submitter().submit(&mut page, &ctx).await {
        debug!(validation = err.is_validation(), "consultation not delivered");
    }
    if let Some(url) = ctx
        .session()
        .and_then(|s| s.take_external_launches().into_iter().next())
    {
        return Redirect::to(url.as_str()).into_response();
    }
    render(&state, &page)
}

fn render(state: &AppState, page: &PageState) -> Response {
    match state.template.render(page) {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            error!(?err, "page shell render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn credentials_from(headers: &HeaderMap, fallback: Option<String>) -> Credentials {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());
    bearer
        .or(fallback)
        .filter(|t| !t.is_empty())
        .map(Credentials::bearer)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FormFields, SinkConfig};
    use crate::content::ContentFetcher;
    use crate::identity::{IdentitySdk, LineSdk, StaticSdk, ViewerIdentity};
    use crate::page::LOAD_ERROR_MESSAGE;
    use crate::submit::{ConsultationSink, FormHandoffSink, Submitter, sink_from_config};
    use crate::test_support::spawn_router;
    use axum::Json;
    use axum::body::{Body, to_bytes};
    use axum::extract::Query;
    use http::Request;
    use kuchiki::traits::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tower::ServiceExt;
    use url::Url;

    fn taro() -> ViewerIdentity {
        ViewerIdentity {
            id: "U1".into(),
            display_name: "Taro".into(),
            picture_url: None,
        }
    }

    async fn backend() -> Url {
        let router = Router::new().route(
            "/exec",
            get(|| async {
                Json(json!({
                    "success": true,
                    "rank": "Gold",
                    "contents": [{"title": "Video A", "url": "https://x/a", "type": "動画"}]
                }))
            })
            .post(|| async { Json(json!({"success": true})) }),
        );
        spawn_router(router).await.join("exec").unwrap()
    }

    fn app(endpoint: Url, sink: Arc<dyn ConsultationSink>) -> Router {
        app_with_sdk(Arc::new(StaticSdk::viewer(taro())), endpoint, sink)
    }

    fn app_with_sdk(
        sdk: Arc<dyn IdentitySdk>,
        endpoint: Url,
        sink: Arc<dyn ConsultationSink>,
    ) -> Router {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let client = reqwest::Client::new();
        let bootstrapper = Bootstrapper::new(
            config.liff_id.clone(),
            sdk,
            Arc::new(ContentFetcher::new(client, endpoint)),
            Submitter::new(sink),
        );
        router(AppState::new(config, bootstrapper, PageTemplate::default()))
    }

    /// LINE verify/profile plus the content endpoint on one fake host.
    async fn line_backend() -> Url {
        let router = Router::new()
            .route(
                "/oauth2/v2.1/verify",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    match q.get("access_token").map(String::as_str) {
                        Some("good") => (
                            StatusCode::OK,
                            Json(json!({"client_id": "1657635807", "expires_in": 3600})),
                        ),
                        _ => (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": "invalid_request"})),
                        ),
                    }
                }),
            )
            .route(
                "/v2/profile",
                get(|| async { Json(json!({"userId": "U1", "displayName": "Taro"})) }),
            )
            .route(
                "/exec",
                get(|| async {
                    Json(json!({
                        "success": true,
                        "rank": "Gold",
                        "contents": [{"title": "Video A", "url": "https://x/a", "type": "動画"}]
                    }))
                })
                .post(|| async { Json(json!({"success": true})) }),
            );
        spawn_router(router).await
    }

    /// Every named input, textarea and hidden field of the rendered form, as a browser would post it.
    fn form_submission(html: &str, text: &str) -> String {
        let document = kuchiki::parse_html().one(html);
        let mut body = url::form_urlencoded::Serializer::new(String::new());
        for input in document.select("#consultation-form input").unwrap() {
            let attrs = input.attributes.borrow();
            if let Some(name) = attrs.get("name") {
                body.append_pair(name, attrs.get("value").unwrap_or_default());
            }
        }
        let textarea = document.select_first("#consultation-form textarea").unwrap();
        let name = textarea.attributes.borrow().get("name").unwrap().to_string();
        body.append_pair(&name, text);
        body.finish()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn consult_request(text: &str) -> Request<Body> {
        Request::post("/consult")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("text={text}")))
            .unwrap()
    }

    #[tokio::test]
    async fn get_renders_loaded_page() {
        let endpoint = backend().await;
        let sink = sink_from_config(
            reqwest::Client::new(),
            &SinkConfig::Direct {
                endpoint: endpoint.clone(),
            },
        );
        let resp = app(endpoint, sink)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_text(resp).await;
        assert!(html.contains("Video A"));
        assert!(html.contains(">Gold<"));
        assert!(html.contains("action=\"/consult\""));
    }

    #[tokio::test]
    async fn consult_reports_success_on_status_line() {
        let endpoint = backend().await;
        let sink = sink_from_config(
            reqwest::Client::new(),
            &SinkConfig::Direct {
                endpoint: endpoint.clone(),
            },
        );
        let resp = app(endpoint, sink)
            .oneshot(consult_request("need+advice"))
            .await
            .unwrap();
        let html = body_text(resp).await;
        assert!(html.contains(crate::submit::SUCCESS_MESSAGE));
        assert!(!html.contains("need advice"));
    }

    #[tokio::test]
    async fn consult_with_form_sink_redirects_externally() {
        let endpoint = backend().await;
        let sink = Arc::new(FormHandoffSink::new(
            Url::parse("https://forms.example.com/f").unwrap(),
            FormFields::default(),
        ));
        let resp = app(endpoint, sink)
            .oneshot(consult_request("help+me"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            resp.headers()[header::LOCATION],
            "https://forms.example.com/f?prefill_userId=U1&prefill_displayName=Taro&prefill_text=help%20me"
        );
    }

    #[tokio::test]
    async fn served_form_carries_the_token_into_consult() {
        let base = line_backend().await;
        let endpoint = base.join("exec").unwrap();
        let sdk = Arc::new(LineSdk::new(reqwest::Client::new(), base));
        let sink = sink_from_config(
            reqwest::Client::new(),
            &SinkConfig::Direct {
                endpoint: endpoint.clone(),
            },
        );
        let app = app_with_sdk(sdk, endpoint, sink);

        let resp = app
            .clone()
            .oneshot(
                Request::get("/?access_token=good")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let html = body_text(resp).await;
        let body = form_submission(&html, "help");
        assert!(body.contains("access_token=good"));

        let resp = app
            .oneshot(
                Request::post("/consult")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let html = body_text(resp).await;
        assert!(html.contains(crate::submit::SUCCESS_MESSAGE));
        assert!(!html.contains(LOAD_ERROR_MESSAGE));
    }

    #[test]
    fn bearer_header_wins_over_form_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        let creds = credentials_from(&headers, Some("from-form".into()));
        assert_eq!(creds.access_token.as_deref(), Some("from-header"));
        let creds = credentials_from(&HeaderMap::new(), Some(String::new()));
        assert!(creds.access_token.is_none());
    }
}
