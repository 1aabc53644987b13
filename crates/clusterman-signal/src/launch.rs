//! Launching a signal worker: bind its control socket, spawn the
//! process, pump its output, and accept its one connection.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::error::{SignalError, SignalResult};

const SOCKET_TIMEOUT: Duration = Duration::from_secs(60);
const STARTUP_GRACE: Duration = Duration::from_secs(2);

/// A bound control socket, either an abstract-namespace socket (Linux)
/// or a temp-directory path socket (portable fallback), cleaned up on
/// drop in the fallback case.
pub struct ControlSocket {
    listener: UnixListener,
    path_to_clean: Option<PathBuf>,
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        if let Some(path) = &self.path_to_clean {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl ControlSocket {
    /// Bind the control socket named `\0<namespace>-<signal_name>-socket`.
    /// On Linux this is a true abstract-namespace socket, auto-cleaned
    /// by the kernel on process exit. Elsewhere, falls back to a
    /// temp-directory path socket that this struct removes on drop.
    pub fn bind(namespace: &str, signal_name: &str) -> SignalResult<Self> {
        let name = format!("{namespace}-{signal_name}-socket");
        #[cfg(target_os = "linux")]
        {
            use std::os::linux::net::SocketAddrExt;
            use std::os::unix::net::{SocketAddr, UnixListener as StdUnixListener};

            let addr = SocketAddr::from_abstract_name(name.as_bytes()).map_err(|e| SignalError::Connection(format!("failed to build abstract socket address: {e}")))?;
            let std_listener = StdUnixListener::bind_addr(&addr).map_err(|e| SignalError::Connection(format!("failed to bind abstract socket: {e}")))?;
            std_listener.set_nonblocking(true).map_err(|e| SignalError::Connection(e.to_string()))?;
            let listener = UnixListener::from_std(std_listener).map_err(|e| SignalError::Connection(e.to_string()))?;
            return Ok(Self { listener, path_to_clean: None });
        }

        #[cfg(not(target_os = "linux"))]
        {
            let path = std::env::temp_dir().join(format!("clusterman-{name}"));
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path).map_err(|e| SignalError::Connection(format!("failed to bind path socket: {e}")))?;
            Ok(Self { listener, path_to_clean: Some(path) })
        }
    }

    pub async fn accept_one(&self) -> SignalResult<UnixStream> {
        let (stream, _) = timeout(SOCKET_TIMEOUT, self.listener.accept())
            .await
            .map_err(|_| SignalError::Connection("timed out waiting for signal worker to connect".into()))?
            .map_err(|e| SignalError::Connection(format!("accept failed: {e}")))?;
        Ok(stream)
    }
}

/// Spawn the signal worker, pump its stdout/stderr to the logging
/// sink, and confirm it hasn't immediately died.
pub async fn spawn_worker(signal_dir: &std::path::Path, namespace: &str, signal_name: &str) -> SignalResult<Child> {
    let python = signal_dir.join("prodenv").join("bin").join("python");
    let mut child = Command::new(python)
        .args(["-m", "clusterman_signals.run", namespace, signal_name])
        .current_dir(signal_dir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| SignalError::Connection(format!("failed to spawn signal worker: {e}")))?;

    if let Some(stdout) = child.stdout.take() {
        let signal_name = signal_name.to_string();
        tokio::spawn(pump_lines(stdout, signal_name, false));
    }
    if let Some(stderr) = child.stderr.take() {
        let signal_name = signal_name.to_string();
        tokio::spawn(pump_lines(stderr, signal_name, true));
    }

    tokio::time::sleep(STARTUP_GRACE).await;
    if let Some(status) = child.try_wait().map_err(|e| SignalError::Connection(e.to_string()))? {
        return Err(SignalError::Connection(format!("signal worker {signal_name} exited immediately with {status}")));
    }

    Ok(child)
}

async fn pump_lines<R: tokio::io::AsyncRead + Unpin>(reader: R, signal_name: String, is_stderr: bool) {
    use tokio::io::{AsyncBufReadExt, BufReader};
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if is_stderr {
                    tracing::warn!(target: "signal.stderr", signal = %signal_name, "{line}");
                } else {
                    tracing::info!(target: "signal.stdout", signal = %signal_name, "{line}");
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(signal = %signal_name, error = %err, "signal output pipe read failed");
                break;
            }
        }
    }
}

/// Send the one unframed initial JSON message the worker consumes at
/// startup: `{cluster, pool, app, parameters}`.
pub async fn send_init_frame(stream: &mut UnixStream, payload: &serde_json::Value) -> SignalResult<()> {
    let bytes = serde_json::to_vec(payload).map_err(|e| SignalError::Unexpected(e.into()))?;
    stream.write_all(&bytes).await.map_err(|e| SignalError::Connection(e.to_string()))?;
    Ok(())
}
