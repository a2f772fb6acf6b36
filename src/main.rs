use clap::Parser;
use staticsync_lib::core::Reporter;
use staticsync_lib::logging::{get_log_dir, init_logging, LogConfig};
use staticsync_lib::{dirs, storage, RunOptions, SyncEngine, SyncError, SyncReport, SyncSettings};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "staticsync", version)]
#[command(about = "Mirror a local static directory into a remote object-storage container")]
struct Cli {
    /// Settings file (JSON)
    #[arg(long, env = "STATICSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Delete every object in the container before syncing
    #[arg(short, long)]
    wipe: bool,

    /// Report what would change without touching the container
    #[arg(short, long)]
    test_run: bool,

    /// Only upload files missing remotely; no updates or deletes
    #[arg(short, long)]
    add_only: bool,

    /// Never delete remote objects
    #[arg(short, long)]
    no_delete: bool,

    /// 0 = quiet, 1 = summary, 2+ = per-object lines and container details
    #[arg(short, long, default_value_t = 1)]
    verbosity: u8,

    /// Local directory to mirror (overrides localRoot)
    #[arg(long)]
    local_root: Option<PathBuf>,

    /// Public URL of the static files (overrides staticUrl)
    #[arg(long)]
    static_url: Option<String>,

    /// Target container (overrides remote.container)
    #[arg(long)]
    container: Option<String>,

    /// Concurrent uploads (overrides maxConcurrentTransfers)
    #[arg(long)]
    jobs: Option<usize>,

    /// Swift username
    #[arg(long, env = "STATICSYNC_USERNAME")]
    username: Option<String>,

    /// Swift API key
    #[arg(long, env = "STATICSYNC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            wipe: self.wipe,
            dry_run: self.test_run,
            add_only: self.add_only,
            no_delete: self.no_delete,
            verbosity: self.verbosity,
        }
    }

    /// 命令行/环境变量覆盖配置文件
    fn apply_overrides(&self, settings: &mut SyncSettings) {
        if let Some(root) = &self.local_root {
            settings.local_root = Some(root.clone());
        }
        if let Some(url) = &self.static_url {
            settings.static_url = url.clone();
        }
        if let Some(container) = &self.container {
            settings.remote.container = Some(container.clone());
        }
        if let Some(jobs) = self.jobs {
            settings.max_concurrent_transfers = jobs;
        }
        if let Some(username) = &self.username {
            settings.remote.username = Some(username.clone());
        }
        if let Some(api_key) = &self.api_key {
            settings.remote.api_key = Some(api_key.clone());
        }
    }
}

fn load_settings(cli: &Cli, config_file: &Path) -> staticsync_lib::Result<SyncSettings> {
    let mut settings = SyncSettings::load(config_file)?;
    cli.apply_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

async fn run(cli: &Cli, settings: &SyncSettings) -> anyhow::Result<SyncReport> {
    let engine = SyncEngine::new(settings, cli.run_options())?;
    let conn = storage::connect(&settings.remote)
        .await
        .map_err(SyncError::remote_unavailable)?;
    let reporter = Reporter::new(cli.verbosity, cli.test_run);
    Ok(engine.run(conn.as_ref(), reporter).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_file = cli.config.clone().unwrap_or_else(dirs::default_config_file);
    init_logging(&LogConfig::load(&config_file), &get_log_dir(), cli.verbosity);

    let settings = match load_settings(&cli, &config_file) {
        Ok(settings) => settings,
        Err(e) => {
            error!("配置无效: {}", e);
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };
    info!("使用配置文件: {}", config_file.display());

    match run(&cli, &settings).await {
        Ok(report) if report.is_clean() => ExitCode::SUCCESS,
        Ok(report) => {
            error!("{} 个对象同步失败", report.errors.len());
            ExitCode::from(2)
        }
        Err(e) => {
            error!("同步中止: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}
