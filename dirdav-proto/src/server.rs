use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use hyper::server::conn::http1 as http;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::codec;
use crate::config::{Credentials, DavConfig};
use crate::controller::{Controller, DavState};
use crate::middleware;

/// How long in-flight requests may run once shutdown is requested
const DRAIN_GRACE: Duration = Duration::from_secs(10);

pub struct Server {
    bind_addr: String,
    state: Arc<DavState>,
    credentials: Option<Credentials>,
}

impl Server {
    pub fn new(config: &DavConfig) -> Result<Self> {
        let bind_addr = config
            .listen_addr()
            .ok_or(anyhow!("-listen must be specified"))?;
        let state = DavState::from_config(config)?;
        Ok(Self::with_state(bind_addr, Arc::new(state), config.credentials()))
    }

    pub fn with_state(
        bind_addr: String,
        state: Arc<DavState>,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            bind_addr,
            state,
            credentials,
        }
    }

    pub async fn run(self, mut must_exit: watch::Receiver<bool>) -> Result<()> {
        let tcp = TcpListener::bind(&self.bind_addr)
            .await
            .with_context(|| format!("unable to listen on {}", self.bind_addr))?;
        tracing::info!(
            root = %self.state.fs.root().display(),
            auth = self.credentials.is_some(),
            "DAV server listening on {}",
            tcp.local_addr()?
        );

        let mut connections = FuturesUnordered::new();
        while !*must_exit.borrow() {
            let wait_conn_finished = async {
                if connections.is_empty() {
                    futures::future::pending().await
                } else {
                    connections.next().await
                }
            };
            let (socket, remote_addr) = tokio::select! {
                a = tcp.accept() => a?,
                _ = wait_conn_finished => continue,
                _ = must_exit.changed() => continue,
            };
            tracing::info!("Accepted connection from {}", remote_addr);

            let state = self.state.clone();
            let credentials = self.credentials.clone();
            let mut conn_exit = must_exit.clone();
            let conn = tokio::spawn(async move {
                let service = service_fn(|req: Request<hyper::body::Incoming>| {
                    let state = state.clone();
                    let credentials = credentials.clone();
                    tracing::info!("{:?} {:?}", req.method(), req.uri());
                    async move {
                        let res = middleware::auth(credentials.as_ref(), req, |request| {
                            Controller::route(state, request).boxed()
                        })
                        .await;
                        match res {
                            Ok(v) => Ok(v),
                            Err(e) => {
                                tracing::error!(err=?e, "internal error");
                                Response::builder()
                                    .status(500)
                                    .body(codec::text_body("Internal error"))
                            }
                        }
                    }
                });

                let conn = http::Builder::new().serve_connection(TokioIo::new(socket), service);
                tokio::pin!(conn);

                let mut draining = false;
                let res = loop {
                    tokio::select! {
                        res = conn.as_mut() => break res,
                        _ = conn_exit.changed(), if !draining => {
                            draining = true;
                            conn.as_mut().graceful_shutdown();
                        }
                    }
                };
                match res {
                    Err(e) => tracing::warn!(err=?e, "connection failed"),
                    Ok(()) => tracing::trace!("connection terminated with success"),
                }
            });
            connections.push(conn);
        }
        drop(tcp);

        tracing::info!("Server shutting down, draining remaining connections...");
        let drain = async { while connections.next().await.is_some() {} };
        if tokio::time::timeout(DRAIN_GRACE, drain).await.is_err() {
            tracing::warn!(
                remaining = connections.len(),
                "grace period elapsed, dropping connections"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_is_mandatory() {
        let dir = tempfile::tempdir().unwrap();
        let config = DavConfig {
            root: dir.path().to_path_buf(),
            ..DavConfig::default()
        };
        let err = Server::new(&config).err().unwrap();
        assert_eq!(err.to_string(), "-listen must be specified");

        let config = DavConfig {
            bind_addr: Some(":0".into()),
            ..config
        };
        let server = Server::new(&config).unwrap();
        assert_eq!(server.bind_addr, "0.0.0.0:0");
    }

    #[test]
    fn missing_root_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let config = DavConfig {
            root: dir.path().join("nope"),
            bind_addr: Some("127.0.0.1:0".into()),
            ..DavConfig::default()
        };
        assert!(Server::new(&config).is_err());
    }

    #[tokio::test]
    async fn stops_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let config = DavConfig {
            root: dir.path().to_path_buf(),
            bind_addr: Some("127.0.0.1:0".into()),
            ..DavConfig::default()
        };
        let server = Server::new(&config).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let res = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(res.is_ok());
    }
}
