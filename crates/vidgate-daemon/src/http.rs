use axum::routing::get;
use axum::Router;
use eyre::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tower_http::services::ServeDir;

/// Static playback endpoint: the storage directory mounted at `/media`.
/// `ServeDir` handles byte-range requests, which is what playback clients
/// seek with.
pub(crate) async fn serve_media(storage_dir: PathBuf, port: u16) -> Result<()> {
    let app = Router::new()
        .route(
            "/",
            get(|| async { "vidgate media endpoint; files are served under /media/" }),
        )
        .nest_service("/media", ServeDir::new(storage_dir));

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding media port {port}"))?;
    axum::serve(listener, app)
        .await
        .context("serving static media")?;
    Ok(())
}
