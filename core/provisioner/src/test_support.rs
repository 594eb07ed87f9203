//! Test doubles: a minimal HTTP/1.1 server and a scripted command runner.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::errors::{ProvisionError, Result};
use crate::exec::{CommandRunner, ExecOutput};

/// Builds a scripted process result.
pub(crate) fn reply(exit_code: i32, stdout: &str, stderr: &str) -> Result<ExecOutput> {
    Ok(ExecOutput {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    })
}

/// Builds a scripted launch failure.
pub(crate) fn spawn_failure() -> Result<ExecOutput> {
    Err(ProvisionError::process_spawn(
        Path::new("infs"),
        &std::io::Error::from(std::io::ErrorKind::NotFound),
    ))
}

/// [`CommandRunner`] that answers calls from a script, in order, and records
/// the arguments it was called with. Calls past the end of the script fail
/// to launch.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    script: Mutex<VecDeque<Result<ExecOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub(crate) fn new(script: Vec<Result<ExecOutput>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::default(),
        }
    }

    /// Arguments of every call so far, space-joined.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, _program: &Path, args: &[&str], _timeout: Duration) -> Result<ExecOutput> {
        self.calls.lock().expect("calls lock").push(args.join(" "));
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(spawn_failure)
    }
}

/// Canned response for a request path.
pub(crate) enum Reply {
    Body {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    /// Declares `declared_len` bytes, sends `sent`, then goes silent.
    Stall { declared_len: usize, sent: Vec<u8> },
}

impl Reply {
    pub(crate) fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::Body {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self::Body {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub(crate) fn redirect(location: &str) -> Self {
        Self::Body {
            status: 302,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
        }
    }
}

/// Starts a server on an ephemeral localhost port that answers each request
/// with `handler(path)`.
pub(crate) async fn serve<F>(handler: F) -> SocketAddr
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("test server address");
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let _ = respond(socket, handler.as_ref()).await;
            });
        }
    });

    addr
}

async fn respond<F>(mut socket: TcpStream, handler: &F) -> std::io::Result<()>
where
    F: Fn(&str) -> Reply,
{
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let request = String::from_utf8_lossy(&request);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    match handler(&path) {
        Reply::Body {
            status,
            headers,
            body,
        } => {
            let mut head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
                reason(status),
                body.len()
            );
            for (name, value) in headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");
            socket.write_all(head.as_bytes()).await?;
            socket.write_all(&body).await?;
            socket.shutdown().await
        }
        Reply::Stall { declared_len, sent } => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {declared_len}\r\nConnection: close\r\n\r\n"
            );
            socket.write_all(head.as_bytes()).await?;
            socket.write_all(&sent).await?;
            socket.flush().await?;
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        302 => "Found",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}
