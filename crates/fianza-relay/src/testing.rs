//! Throwaway HTTP servers standing in for outbound collaborators.

use axum::Router;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
    .await
    .expect("bind ephemeral port");
  let addr = listener.local_addr().expect("local addr");
  tokio::spawn(async move {
    axum::serve(listener, router).await.expect("test server");
  });
  format!("http://{addr}")
}

/// A base URL nothing listens on.
pub async fn unreachable_url() -> String {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
    .await
    .expect("bind ephemeral port");
  let addr = listener.local_addr().expect("local addr");
  drop(listener);
  format!("http://{addr}")
}
