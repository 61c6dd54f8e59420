use axum::Router;
use url::Url;

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_router(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve test router");
    });
    Url::parse(&format!("http://{addr}/")).expect("test base url")
}
