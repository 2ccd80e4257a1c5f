use std::{
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::Duration,
};

use clap::Parser;
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpStream,
};

use crate::Args;

/// A postbin app running on its own thread, bound to a random local port.
#[derive(Debug, Clone)]
pub(super) struct Runtime {
    addr: SocketAddr,
}

/// Minimal view on a raw HTTP/1.1 response.
#[derive(Debug)]
pub(super) struct RawResponse {
    pub status: u16,
    pub head: String,
    pub body: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then_some(value.trim())
        })
    }
}

impl Runtime {
    #[inline(always)]
    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Send a single request over a fresh connection and read until it closes.
    pub async fn send(&self, method: &str, path: &str, headers: &[(&str, &str)]) -> RawResponse {
        self.send_with_body(method, path, headers, "").await
    }

    pub async fn send_with_body(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> RawResponse {
        let mut stream = self.connect().await;

        let mut raw = format!(
            "{method} {path} HTTP/1.1\r\nhost: {}\r\nconnection: close\r\ncontent-length: {}\r\n",
            self.addr,
            body.len()
        );
        for (name, value) in headers {
            raw.push_str(&format!("{name}: {value}\r\n"));
        }
        raw.push_str("\r\n");
        raw.push_str(body);

        stream.write_all(raw.as_bytes()).await.unwrap();

        let mut buf = Vec::new();
        tokio::time::timeout(Duration::from_secs(30), stream.read_to_end(&mut buf))
            .await
            .unwrap()
            .unwrap();

        parse_raw_response(&String::from_utf8_lossy(&buf))
    }

    /// Send a body with `transfer-encoding: chunked`, one chunk per item.
    ///
    /// The server may answer and close before consuming every chunk,
    /// so a connection reset after the response ends the read.
    pub async fn send_chunked(&self, method: &str, path: &str, chunks: &[&str]) -> RawResponse {
        let mut stream = self.connect().await;

        let mut raw = format!(
            "{method} {path} HTTP/1.1\r\nhost: {}\r\nconnection: close\r\ntransfer-encoding: chunked\r\n\r\n",
            self.addr,
        );
        for chunk in chunks {
            raw.push_str(&format!("{:x}\r\n{chunk}\r\n", chunk.len()));
        }
        raw.push_str("0\r\n\r\n");

        stream.write_all(raw.as_bytes()).await.unwrap();

        let mut buf = Vec::new();
        let mut read_buf = [0u8; 4096];
        tokio::time::timeout(Duration::from_secs(30), async {
            while let Ok(n) = stream.read(&mut read_buf).await {
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&read_buf[..n]);
            }
        })
        .await
        .unwrap();

        parse_raw_response(&String::from_utf8_lossy(&buf))
    }
}

fn parse_raw_response(raw: &str) -> RawResponse {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("invalid status line in response: {head:?}"));
    RawResponse {
        status,
        head: head.to_owned(),
        body: body.to_owned(),
    }
}

pub(super) async fn spawn_with_args(extra_args: &[&str]) -> Runtime {
    let data_dir = spawn_postbin_app_with_args(extra_args);

    let addr = tokio::time::timeout(
        Duration::from_secs(60),
        read_file_or_wait(data_dir.join("postbin.addr.txt")),
    )
    .await
    .unwrap();

    let runtime = Runtime { addr };
    assert!(runtime.socket_addr().ip().is_loopback());

    runtime
}

async fn read_file_or_wait(path: PathBuf) -> SocketAddr {
    loop {
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => {
                let s = s.trim();
                if s.is_empty() {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
                match s.parse() {
                    Ok(addr) => return addr,
                    Err(err) => {
                        eprintln!("unexpected error parsing socket addr (content={s:?}): {err}");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                }
            }
            Err(err) => {
                if err.kind() == ErrorKind::NotFound {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                } else {
                    panic!("unexpected error: {err}");
                }
            }
        }
    }
}

fn spawn_postbin_app_with_args(extra_args: &[&str]) -> PathBuf {
    let data_dir = postbin_lib::utils::test::unique_data_dir("postbin_app_e2e").unwrap();
    eprintln!("postbin_app_e2e data stored under: {data_dir:?}");

    let data_dir_str = data_dir.display().to_string();

    let mut argv: Vec<&str> = vec![
        postbin_lib::utils::env::project_name(),
        "--bind",
        "127.0.0.1:0",
        "--data",
        &data_dir_str,
        "--graceful",
        "0.42",
    ];
    argv.extend(extra_args);

    let args = Args::try_parse_from(argv).unwrap();

    let wait_server_ready = Arc::new(OnceLock::new());
    let notify_server_ready = wait_server_ready.clone();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let server_future = crate::run_with_args(std::future::pending::<()>(), args);

        notify_server_ready.set(()).expect("waiter to be notified");

        rt.block_on(server_future).expect("serve without errors");
    });

    wait_server_ready.wait();

    data_dir
}
