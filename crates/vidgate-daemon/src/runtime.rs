use clap::Parser;
use eyre::{eyre, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use vidgate_core::IngestSettings;

#[derive(Debug)]
pub(crate) struct DaemonRuntime {
    pub(crate) bind_host: String,
    pub(crate) grpc_port: u16,
    pub(crate) http_port: u16,
    pub(crate) settings: IngestSettings,
    pub(crate) warnings: Vec<String>,
}

#[derive(Parser, Debug)]
#[command(name = "vidgated", about = "Streaming video ingest daemon")]
pub(crate) struct DaemonArgs {
    /// Path to the daemon configuration file (TOML). Defaults to
    /// /etc/vidgate/config.toml when present.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Host/IP address to bind (overrides config file)
    #[arg(long)]
    pub(crate) bind: Option<String>,
    /// gRPC port for the upload and library services (overrides config file)
    #[arg(long)]
    pub(crate) grpc_port: Option<u16>,
    /// HTTP port for static media playback (overrides config file)
    #[arg(long)]
    pub(crate) http_port: Option<u16>,
    /// Directory accepted uploads are persisted into
    #[arg(long)]
    pub(crate) storage_dir: Option<PathBuf>,
    /// Public base URL used when constructing playback URLs
    #[arg(long)]
    pub(crate) base_url: Option<String>,
    /// Maximum number of concurrently admitted uploads
    #[arg(long)]
    pub(crate) capacity: Option<usize>,
    /// Number of finalization workers
    #[arg(long)]
    pub(crate) workers: Option<usize>,
    /// Seconds an upload call waits for its verdict before returning the
    /// accepted-in-background response
    #[arg(long)]
    pub(crate) response_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    daemon: RawDaemonSection,
}

#[derive(Debug, Default, Deserialize)]
struct RawDaemonSection {
    bind: Option<String>,
    grpc_port: Option<u16>,
    http_port: Option<u16>,
    storage_dir: Option<PathBuf>,
    base_url: Option<String>,
    capacity: Option<usize>,
    workers: Option<usize>,
    response_timeout_secs: Option<u64>,
}

fn default_config_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\ProgramData\Vidgate\config.toml")
    } else {
        PathBuf::from("/etc/vidgate/config.toml")
    }
}

pub(crate) fn load_runtime(args: &DaemonArgs) -> Result<DaemonRuntime> {
    let mut warnings = Vec::new();

    let config_path = if let Some(path) = &args.config {
        Some(path.clone())
    } else {
        let candidate = default_config_path();
        if candidate.exists() {
            Some(candidate)
        } else {
            None
        }
    };

    let raw = if let Some(ref path) = config_path {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str::<RawConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?
    } else {
        RawConfig::default()
    };

    let bind_host = args
        .bind
        .clone()
        .or_else(|| raw.daemon.bind.clone())
        .unwrap_or_else(|| "0.0.0.0".to_string());
    let grpc_port = args.grpc_port.or(raw.daemon.grpc_port).unwrap_or(5001);
    let http_port = args.http_port.or(raw.daemon.http_port).unwrap_or(5000);

    let storage_dir = match args.storage_dir.clone().or(raw.daemon.storage_dir.clone()) {
        Some(dir) => dir,
        None => {
            let fallback = std::env::current_dir()
                .context("failed to determine working directory")?
                .join("uploads");
            warnings.push(format!(
                "no storage directory configured; using {}",
                fallback.display()
            ));
            fallback
        }
    };

    let base_url = args
        .base_url
        .clone()
        .or_else(|| raw.daemon.base_url.clone())
        .unwrap_or_else(|| format!("http://localhost:{http_port}"));

    let capacity = args.capacity.or(raw.daemon.capacity).unwrap_or(10);
    if capacity == 0 {
        warnings.push("admission capacity is 0; every upload will be rejected".to_string());
    }

    let workers = args.workers.or(raw.daemon.workers).unwrap_or(4);
    if workers == 0 {
        return Err(eyre!("worker count must be at least 1"));
    }

    let response_timeout = Duration::from_secs(
        args.response_timeout
            .or(raw.daemon.response_timeout_secs)
            .unwrap_or(30),
    );

    let mut settings = IngestSettings::new(storage_dir, base_url);
    settings.admission_capacity = capacity;
    settings.worker_count = workers;
    settings.response_timeout = response_timeout;

    Ok(DaemonRuntime {
        bind_host,
        grpc_port,
        http_port,
        settings,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args() -> DaemonArgs {
        DaemonArgs {
            config: None,
            bind: None,
            grpc_port: None,
            http_port: None,
            storage_dir: None,
            base_url: None,
            capacity: None,
            workers: None,
            response_timeout: None,
        }
    }

    #[test]
    fn defaults_apply_without_a_config_file() {
        let mut defaults = args();
        defaults.storage_dir = Some(PathBuf::from("/srv/videos"));

        let runtime = load_runtime(&defaults).unwrap();
        assert_eq!(runtime.bind_host, "0.0.0.0");
        assert_eq!(runtime.grpc_port, 5001);
        assert_eq!(runtime.http_port, 5000);
        assert_eq!(runtime.settings.admission_capacity, 10);
        assert_eq!(runtime.settings.worker_count, 4);
        assert_eq!(runtime.settings.response_timeout, Duration::from_secs(30));
        assert_eq!(runtime.settings.public_base_url, "http://localhost:5000");
    }

    #[test]
    fn cli_flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            "[daemon]\ngrpc_port = 7001\ncapacity = 3\nstorage_dir = \"/srv/from-config\"\nbase_url = \"http://cdn.example\""
        )
        .unwrap();

        let mut overridden = args();
        overridden.config = Some(config_path);
        overridden.capacity = Some(8);

        let runtime = load_runtime(&overridden).unwrap();
        assert_eq!(runtime.grpc_port, 7001);
        assert_eq!(runtime.settings.admission_capacity, 8);
        assert_eq!(
            runtime.settings.storage_dir,
            PathBuf::from("/srv/from-config")
        );
        assert_eq!(runtime.settings.public_base_url, "http://cdn.example");
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut invalid = args();
        invalid.storage_dir = Some(PathBuf::from("/srv/videos"));
        invalid.workers = Some(0);
        assert!(load_runtime(&invalid).is_err());
    }
}
