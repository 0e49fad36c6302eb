mod server;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use dirdav_proto::{read_config, DavConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(short, long, env = "DIRDAV_CONFIG")]
    /// Optional TOML configuration file, flags take precedence over it
    config: Option<PathBuf>,

    #[clap(short, long, env = "DIRDAV_DIR")]
    /// Directory to serve (defaults to the current one)
    dir: Option<PathBuf>,

    #[clap(short, long, env = "DIRDAV_LISTEN")]
    /// Address to listen on, eg. `127.0.0.1:8080` or `:8080`
    listen: Option<String>,

    #[clap(short, long, env = "DIRDAV_USER")]
    user: Option<String>,

    #[clap(short, long, env = "DIRDAV_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[clap(long, env = "DIRDAV_LOCK_TIMEOUT")]
    /// Lock lifetime in seconds when the client does not request one
    lock_timeout: Option<u64>,

    #[clap(long, env = "DIRDAV_MAX_BODY_SIZE")]
    /// Largest request body accepted, in bytes
    max_body_size: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<DavConfig> {
        let mut config = match self.config {
            Some(path) => read_config(path)?,
            None => DavConfig::default(),
        };

        if let Some(dir) = self.dir {
            config.root = dir;
        }
        if let Some(listen) = self.listen {
            config.bind_addr = Some(listen);
        }
        if let Some(user) = self.user {
            config.user = Some(user);
        }
        if let Some(password) = self.password {
            config.password = Some(password);
        }
        if let Some(secs) = self.lock_timeout {
            config.lock_timeout_secs = secs;
        }
        if let Some(size) = self.max_body_size {
            config.max_body_size = size;
        }

        if !config.root.is_dir() {
            bail!("{} is not a directory", config.root.display());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "main=info,dirdav=info,dirdav_proto=info")
    }

    // Abort on panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    tracing_subscriber::fmt::init();

    let config = Args::parse().into_config()?;
    if config.listen_addr().is_none() {
        eprintln!("-listen must be specified");
        std::process::exit(1);
    }

    server::run(config).await
}
