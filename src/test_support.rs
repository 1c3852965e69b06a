use axum::Router;
use url::Url;

/// Serves `router` on an ephemeral local port for the lifetime of the test runtime.
pub async fn spawn_stub(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    Url::parse(&format!("http://{addr}")).expect("stub url")
}
