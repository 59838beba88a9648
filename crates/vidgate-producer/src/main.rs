//! Producer: watches input folders and streams new files to the ingest
//! daemon, retrying with backoff when the server reports it is full.

use clap::Parser;
use eyre::{eyre, Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tonic::transport::Endpoint;
use vidgate_core::client::{upload_with_retries, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES};
use vidgate_core::generated::video_upload_client::VideoUploadClient;
use vidgate_core::TEMP_SUFFIX;

/// Appended to a file once the server has confirmed the upload, so the next
/// scan skips it.
const UPLOADED_SUFFIX: &str = ".uploaded";

#[derive(Parser, Debug)]
#[command(
    name = "vidgate-producer",
    about = "Watches input folders and streams new videos to vidgated"
)]
struct ProducerArgs {
    /// Number of concurrent producer loops (each watches <base-folder>/producer<N>)
    #[arg(long, default_value_t = 1)]
    producers: usize,
    /// Base folder containing the per-producer watch directories
    #[arg(long, default_value = "producer_inputs")]
    base_folder: PathBuf,
    /// Address of the vidgated gRPC endpoint
    #[arg(long, default_value = "http://localhost:5001")]
    server: String,
    /// Chunk size in bytes for streamed uploads
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// Maximum attempts per file before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,
    /// Seconds between scans of an idle watch folder
    #[arg(long, default_value_t = 2)]
    poll_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = ProducerArgs::parse();
    if args.producers == 0 {
        return Err(eyre!("at least one producer is required"));
    }

    let mut handles = Vec::new();
    for id in 1..=args.producers {
        let folder = args.base_folder.join(format!("producer{id}"));
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("creating watch folder {}", folder.display()))?;

        let server = args.server.clone();
        let chunk_size = args.chunk_size;
        let max_retries = args.max_retries;
        let poll_interval = Duration::from_secs(args.poll_interval);
        handles.push(tokio::spawn(async move {
            run_producer(id, folder, server, chunk_size, max_retries, poll_interval).await
        }));
    }

    info!("{} producer(s) running; stop with ctrl-c", args.producers);
    for handle in handles {
        handle.await??;
    }
    Ok(())
}

async fn run_producer(
    id: usize,
    folder: PathBuf,
    server: String,
    chunk_size: usize,
    max_retries: u32,
    poll_interval: Duration,
) -> Result<()> {
    let channel = Endpoint::from_shared(server.clone())
        .with_context(|| format!("invalid server address {server}"))?
        .connect_lazy();
    let mut client = VideoUploadClient::new(channel);
    let producer_id = format!("producer{id}");

    info!("producer {id} watching {}", folder.display());
    loop {
        let files = scan_pending(&folder);
        if files.is_empty() {
            tokio::time::sleep(poll_interval).await;
            continue;
        }

        for file in files {
            info!("producer {id} uploading {}", file.display());
            match upload_with_retries(&mut client, &file, &producer_id, chunk_size, max_retries)
                .await
            {
                Ok(response) if response.success => {
                    info!(
                        "producer {id} uploaded {} (job {})",
                        file.display(),
                        response.job_id
                    );
                    if let Err(err) = mark_uploaded(&file) {
                        warn!("could not mark {} as uploaded: {err:#}", file.display());
                    }
                }
                Ok(response) => {
                    warn!(
                        "producer {id}: upload of {} rejected: {}",
                        file.display(),
                        response.message
                    );
                }
                Err(err) => {
                    warn!(
                        "producer {id}: upload of {} failed: {err:#}",
                        file.display()
                    );
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }
}

/// Files waiting to be uploaded, oldest first. In-progress (`.part`) and
/// already-confirmed (`.uploaded`) files are skipped.
fn scan_pending(folder: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("cannot read watch folder {}: {}", folder.display(), err);
            return Vec::new();
        }
    };

    let mut files: Vec<(std::time::SystemTime, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            if name.ends_with(TEMP_SUFFIX) || name.ends_with(UPLOADED_SUFFIX) {
                return None;
            }
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let created = meta.created().or_else(|_| meta.modified()).ok()?;
            Some((created, path))
        })
        .collect();

    files.sort_by_key(|(created, _)| *created);
    files.into_iter().map(|(_, path)| path).collect()
}

fn mark_uploaded(path: &Path) -> Result<()> {
    let mut renamed = path.as_os_str().to_owned();
    renamed.push(UPLOADED_SUFFIX);
    std::fs::rename(path, &renamed)
        .with_context(|| format!("renaming {} after upload", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn scan_skips_partial_and_uploaded_files() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("new.mp4")).unwrap();
        File::create(dir.path().join("busy.part")).unwrap();
        File::create(dir.path().join("done.mp4.uploaded")).unwrap();
        File::create(dir.path().join("SHOUTY.MP4.UPLOADED")).unwrap();

        let pending = scan_pending(dir.path());
        assert_eq!(pending.len(), 1);
        assert!(pending[0].ends_with("new.mp4"));
    }

    #[test]
    fn scan_of_missing_folder_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_pending(&dir.path().join("absent")).is_empty());
    }

    #[test]
    fn mark_uploaded_renames_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("clip.mp4");
        File::create(&original).unwrap();

        mark_uploaded(&original).unwrap();
        assert!(!original.exists());
        assert!(dir.path().join("clip.mp4.uploaded").exists());
    }
}
