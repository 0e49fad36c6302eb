use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DavConfig {
    /// Directory exposed as the root collection
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Listening address, `:8080` is understood as every interface
    pub bind_addr: Option<String>,

    /// Lifetime of a lock when the client does not ask for a specific one
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,

    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for DavConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            bind_addr: None,
            lock_timeout_secs: default_lock_timeout(),
            max_body_size: default_max_body_size(),
            user: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl DavConfig {
    /// Basic Auth is only enabled when both a user and a password are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(Credentials {
                    user: user.into(),
                    password: password.into(),
                })
            }
            _ => None,
        }
    }

    pub fn listen_addr(&self) -> Option<String> {
        match self.bind_addr.as_deref() {
            None | Some("") => None,
            Some(port_only) if port_only.starts_with(':') => {
                Some(format!("0.0.0.0{}", port_only))
            }
            Some(addr) => Some(addr.to_string()),
        }
    }
}

pub fn read_config(config_file: PathBuf) -> Result<DavConfig> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())
        .with_context(|| format!("unable to open {}", config_file.display()))?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}

fn default_root() -> PathBuf {
    "./".into()
}

fn default_lock_timeout() -> u64 {
    3600
}

fn default_max_body_size() -> u64 {
    1 << 30
}
