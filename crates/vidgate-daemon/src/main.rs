mod http;
mod runtime;
mod service;

use clap::Parser;
use eyre::{Context, Result};
use log::{error, info, warn};
use runtime::{load_runtime, DaemonArgs};
use service::{VideoLibraryService, VideoUploadService};
use std::sync::Arc;
use tonic::transport::Server;
use vidgate_core::generated::video_library_server::VideoLibraryServer;
use vidgate_core::generated::video_upload_server::VideoUploadServer;
use vidgate_core::{worker, IngestPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = DaemonArgs::parse();
    let rt = load_runtime(&args)?;
    for warning in &rt.warnings {
        warn!("{warning}");
    }

    tokio::fs::create_dir_all(&rt.settings.storage_dir)
        .await
        .with_context(|| {
            format!(
                "creating storage directory {}",
                rt.settings.storage_dir.display()
            )
        })?;

    let pipeline = Arc::new(IngestPipeline::new(rt.settings.clone()));
    let _workers = worker::spawn_workers(&pipeline);

    let media_dir = rt.settings.storage_dir.clone();
    let http_port = rt.http_port;
    tokio::spawn(async move {
        if let Err(err) = http::serve_media(media_dir, http_port).await {
            error!("static media server failed: {err:#}");
        }
    });

    let addr = format!("{}:{}", rt.bind_host, rt.grpc_port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", rt.bind_host, rt.grpc_port))?;
    info!(
        "vidgated listening on {} (gRPC); media on port {}; capacity {}, {} workers",
        addr,
        rt.http_port,
        rt.settings.admission_capacity,
        rt.settings.worker_count
    );

    Server::builder()
        .add_service(VideoUploadServer::new(VideoUploadService::new(Arc::clone(
            &pipeline,
        ))))
        .add_service(VideoLibraryServer::new(VideoLibraryService::new(
            Arc::clone(&pipeline),
        )))
        .serve(addr)
        .await
        .context("running gRPC server")?;

    Ok(())
}
