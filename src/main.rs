//! overlayd daemon entry point.
//!
//! ```text
//!   CLI args ──▶ config path ──▶ ensure_config ──▶ DaemonContext::start
//!                                                        │
//!                         SIGINT / SIGTERM / SIGHUP ─────┤ (request_stop)
//!                                                        ▼
//!                                     DaemonContext::shutdown ──▶ exit code
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::Parser;

use overlayd::config::loader::{default_config_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use overlayd::config::ensure_config;
use overlayd::observability::logging;
use overlayd::subsystem::DefaultSubsystems;
use overlayd::{DaemonContext, DaemonError, Threading};

#[derive(Parser, Debug)]
#[command(name = "overlayd")]
#[command(about = "Overlay network daemon", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Generate the config file and exit
    #[arg(short = 'g', short_alias = 'c', long)]
    genconfig: bool,

    /// Generate a relay config (with a [bind] section)
    #[arg(short, long)]
    relay: bool,

    /// Overwrite an existing config file
    #[arg(short, long)]
    force: bool,

    /// Config file path
    config: Option<PathBuf>,
}

fn main() {
    let code = match parse_args(std::env::args_os()) {
        Ok(cli) => run(cli),
        Err(code) => code,
    };
    std::process::exit(code);
}

/// Parse the command line. Help and version output exit 0; any usage
/// error is a startup failure and exits 1.
fn parse_args<I, T>(args: I) -> Result<Cli, i32>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|err| {
        let _ = err.print();
        match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
            _ => 1,
        }
    })
}

fn run(cli: Cli) -> i32 {
    logging::init(cli.verbose);
    let threading = Threading::from_env();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), threading = ?threading, "overlayd starting");

    let config_path = match prepare_config(&cli) {
        Ok(path) => path,
        Err(err) => {
            tracing::error!(error = %err, kind = err.kind(), "Config preparation failed");
            return err.exit_code();
        }
    };

    if cli.genconfig {
        return 0;
    }

    let mut ctx = DaemonContext::with_factory(DefaultSubsystems, threading);
    match ctx.start(&config_path) {
        Ok(()) => tracing::info!("Mainloop exited"),
        // Already logged and recorded as the exit code by the context.
        Err(err) => tracing::debug!(kind = err.kind(), "Start returned early"),
    }
    ctx.shutdown()
}

/// Resolve the config path, create its directory and write a default
/// file when none exists (or when forced).
fn prepare_config(cli: &Cli) -> Result<PathBuf, DaemonError> {
    let (path, basedir) = match &cli.config {
        Some(path) => {
            let basedir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf);
            (path.clone(), basedir)
        }
        None => {
            let path = default_config_path().ok_or_else(|| DaemonError::DirectoryCreate {
                path: PathBuf::from(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "home directory is not set",
                ),
            })?;
            let basedir = path.parent().map(Path::to_path_buf);
            (path, basedir)
        }
    };

    if let Some(dir) = &basedir {
        std::fs::create_dir_all(dir).map_err(|source| DaemonError::DirectoryCreate {
            path: dir.clone(),
            source,
        })?;
    }

    ensure_config(&path, basedir.as_deref(), cli.force, cli.relay).map_err(|source| {
        DaemonError::ConfigLoad {
            path: path.clone(),
            source,
        }
    })?;

    Ok(path)
}
