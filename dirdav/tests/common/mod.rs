#![allow(dead_code)]
pub mod constants;

use anyhow::{bail, Context, Result};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::process::{Command, Output};
use std::thread;

use quick_xml::reader::NsReader;
use reqwest::blocking::{Client, RequestBuilder};

use dirdav_dav::xml as dxml;

use constants::SMALL_DELAY;

/// A server on a fresh temporary root and a free port
pub fn dirdav_daemon(
    extra_args: &[&str],
    mut fx: impl FnMut(&Client, &str, &Path) -> Result<()>,
) -> Result<()> {
    let root = tempfile::tempdir().context("temporary root")?;

    // Ask the OS for a free port, then release it for the daemon
    let addr = TcpListener::bind("127.0.0.1:0")?.local_addr()?;

    let mut daemon = Command::new(env!("CARGO_BIN_EXE_dirdav"))
        .env_remove("DIRDAV_CONFIG")
        .env_remove("DIRDAV_USER")
        .env_remove("DIRDAV_PASSWORD")
        .arg("--dir")
        .arg(root.path())
        .arg("--listen")
        .arg(addr.to_string())
        .args(extra_args)
        .spawn()?;

    // Check that our daemon is correctly listening
    let mut max_retry = 20;
    loop {
        max_retry -= 1;
        match (TcpStream::connect(addr), max_retry) {
            (Err(e), 0) => {
                let _ = daemon.kill();
                bail!("no more retry, last error is: {}", e)
            }
            (Err(e), _) => {
                println!("unable to connect: {} ; will retry soon...", e);
            }
            (Ok(_), _) => break,
        }
        thread::sleep(SMALL_DELAY);
    }

    println!("-- ready to test dav features --");
    let http = Client::new();
    let result = fx(&http, &format!("http://{}", addr), root.path());
    println!("-- test teardown --");

    daemon.kill().context("daemon should be killed")?;
    daemon.wait().context("daemon should be reaped")?;

    result.context("all tests passed")
}

/// Run the binary to completion, for startup failures
pub fn dirdav_oneshot(args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_dirdav"))
        .env_remove("DIRDAV_LISTEN")
        .env_remove("DIRDAV_CONFIG")
        .args(args)
        .output()?)
}

pub fn dav_req(http: &Client, method: &str, url: &str) -> Result<RequestBuilder> {
    Ok(http.request(reqwest::Method::from_bytes(method.as_bytes())?, url))
}

pub fn dav_deserialize<T: dxml::Node<T>>(src: &str) -> T {
    futures::executor::block_on(async {
        let mut rdr = dxml::Reader::new(NsReader::from_reader(src.as_bytes()))
            .await
            .expect("build xml reader");
        rdr.find().await.expect("parse xml")
    })
}

/// Strip the angle brackets of a Lock-Token header
pub fn lock_token(resp: &reqwest::blocking::Response) -> String {
    resp.headers()
        .get("Lock-Token")
        .expect("Lock-Token header must be set")
        .to_str()
        .expect("Lock-Token is ascii")
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}
