//! Supervision of a udhcpc(6) child process.
//!
//! Each client is one invocation of the BusyBox DHCP client, wired to emit
//! JSON lease events through the handler sidecar on stdout. The client runs
//! either in one-shot mode (exit after the first lease) or persistently
//! (renew until told to finish).

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use netdhcp_net::NetnsGuard;

use crate::error::{DhcpError, Result};
use crate::event::{DhcpEvent, DhcpEventType, LeaseInfo};

/// Installed location of the udhcpc-handler sidecar.
pub const DEFAULT_HANDLER: &str = "/usr/lib/net-dhcp/udhcpc-handler";

/// DHCPv4 vendor class identifier.
pub const VENDOR_ID: &str = "docker-net-dhcp";

const EVENT_BUFFER: usize = 16;

/// Options for one udhcpc(6) invocation.
#[derive(Debug, Clone, Default)]
pub struct DhcpClientOptions {
    /// Hostname to request, when known.
    pub hostname: Option<String>,
    /// Run udhcpc6 and request an IPv6 lease.
    pub v6: bool,
    /// Exit after the first lease instead of renewing.
    pub once: bool,
    /// Network namespace to spawn the client in.
    pub namespace: Option<PathBuf>,
    /// Override for the handler script path.
    pub handler_script: Option<PathBuf>,
}

/// Builds the program name and argument list for a client invocation.
pub fn build_args(iface: &str, opts: &DhcpClientOptions) -> (String, Vec<String>) {
    let program = if opts.v6 { "udhcpc6" } else { "udhcpc" };
    let handler = opts
        .handler_script
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_HANDLER));

    let mut args = vec![
        "-f".to_string(),
        "-i".to_string(),
        iface.to_string(),
        "-s".to_string(),
        handler.to_string_lossy().into_owned(),
    ];

    if opts.once {
        // Exit after obtaining a lease.
        args.push("-q".to_string());
    } else {
        // Release the address on exit.
        args.push("-R".to_string());
    }

    if let Some(hostname) = &opts.hostname {
        let value = if opts.v6 {
            format!("0x27:{}", encode_fqdn(hostname))
        } else {
            format!("hostname:{hostname}")
        };
        args.push("-x".to_string());
        args.push(value);
    }

    // The vendor class option is not available in udhcpc6.
    if !opts.v6 {
        args.push("-V".to_string());
        args.push(VENDOR_ID.to_string());
    }

    (program.to_string(), args)
}

/// Encodes a DHCPv6 client FQDN option (RFC 4704, S bit set) as hex.
///
/// udhcpc6's builtin fqdn support mangles the option, so the raw bytes are
/// passed through `-x 0x27:<hex>` instead.
fn encode_fqdn(hostname: &str) -> String {
    let mut data = Vec::with_capacity(hostname.len() + 2);
    data.push(0b0001u8);
    data.push(hostname.len() as u8);
    data.extend_from_slice(hostname.as_bytes());
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// A running udhcpc(6) child.
pub struct DhcpClient {
    once: bool,
    child: Child,
    events: mpsc::Receiver<DhcpEvent>,
}

impl DhcpClient {
    /// Spawns the client, entering `opts.namespace` (when set) only for the
    /// fork+exec window.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace cannot be entered or the binary
    /// cannot be spawned.
    pub fn spawn(iface: &str, opts: DhcpClientOptions) -> Result<Self> {
        let (program, args) = build_args(iface, &opts);
        tracing::trace!(%program, ?args, "new udhcpc client");

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match &opts.namespace {
            Some(ns) => {
                let guard = NetnsGuard::enter(ns)?;
                let spawned = cmd.spawn();
                guard.restore()?;
                spawned.map_err(DhcpError::Spawn)?
            }
            None => cmd.spawn().map_err(DhcpError::Spawn)?,
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DhcpError::Pipe("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DhcpError::Pipe("stderr"))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(%line, "udhcpc handler line");
                match serde_json::from_str::<DhcpEvent>(&line) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!("failed to decode udhcpc event: {e}"),
                }
            }
        });

        // udhcpc logs to stderr; forward it at debug level.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "udhcpc", "{line}");
            }
        });

        Ok(Self {
            once: opts.once,
            child,
            events: rx,
        })
    }

    /// Receives the next lease event; `None` once the client's stdout closes.
    pub async fn next_event(&mut self) -> Option<DhcpEvent> {
        self.events.recv().await
    }

    /// Stops the client and waits for it to exit.
    ///
    /// Persistent clients get SIGTERM so `-R` releases the lease; one-shot
    /// clients exit on their own. Past `deadline` the child is killed.
    ///
    /// # Errors
    ///
    /// Returns an error if signalling fails, the child exits non-zero, or
    /// the deadline expires.
    pub async fn finish(&mut self, deadline: Duration) -> Result<()> {
        if !self.once {
            if let Some(pid) = self.child.id() {
                kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|e| {
                    DhcpError::Signal(format!("failed to send SIGTERM to udhcpc: {e}"))
                })?;
            }
        }

        match tokio::time::timeout(deadline, self.child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(DhcpError::Exit(status)),
            Ok(Err(e)) => Err(DhcpError::Spawn(e)),
            Err(_) => {
                let _ = self.child.kill().await;
                Err(DhcpError::FinishTimeout)
            }
        }
    }

    /// Kills the client outright and reaps it.
    pub async fn abort(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("failed to kill udhcpc: {e}");
        }
    }
}

/// Runs a one-shot client and returns the first lease obtained.
///
/// # Errors
///
/// Returns [`DhcpError::LeaseTimeout`] when `timeout` expires first and
/// [`DhcpError::NoLease`] when the client exits without emitting a lease.
pub async fn lease_once(
    iface: &str,
    mut opts: DhcpClientOptions,
    timeout: Duration,
) -> Result<LeaseInfo> {
    opts.once = true;
    let mut client = DhcpClient::spawn(iface, opts)?;

    let outcome = tokio::time::timeout(timeout, async {
        let mut info = None;
        while let Some(event) = client.next_event().await {
            if matches!(
                event.event_type,
                DhcpEventType::Bound | DhcpEventType::Renew
            ) {
                info = Some(event.data);
            }
        }
        info
    })
    .await;

    match outcome {
        Ok(info) => {
            client.finish(timeout).await?;
            info.ok_or(DhcpError::NoLease)
        }
        Err(_) => {
            client.abort().await;
            Err(DhcpError::LeaseTimeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_once_arguments() {
        let (program, args) = build_args(
            "abcdef012345-dh",
            &DhcpClientOptions {
                once: true,
                ..Default::default()
            },
        );
        assert_eq!(program, "udhcpc");
        assert_eq!(
            args,
            vec![
                "-f",
                "-i",
                "abcdef012345-dh",
                "-s",
                DEFAULT_HANDLER,
                "-q",
                "-V",
                VENDOR_ID,
            ]
        );
    }

    #[test]
    fn v4_persistent_arguments_with_hostname() {
        let (_, args) = build_args(
            "eth0",
            &DhcpClientOptions {
                hostname: Some("box".to_string()),
                ..Default::default()
            },
        );
        assert!(args.contains(&"-R".to_string()));
        assert!(!args.contains(&"-q".to_string()));
        let x = args.iter().position(|a| a == "-x").unwrap();
        assert_eq!(args[x + 1], "hostname:box");
    }

    #[test]
    fn v6_arguments_encode_the_fqdn_option() {
        let (program, args) = build_args(
            "eth0",
            &DhcpClientOptions {
                hostname: Some("box".to_string()),
                v6: true,
                ..Default::default()
            },
        );
        assert_eq!(program, "udhcpc6");
        // flags 0x01, length 0x03, then "box" bytes.
        let x = args.iter().position(|a| a == "-x").unwrap();
        assert_eq!(args[x + 1], "0x27:0103626f78");
        // No vendor class for udhcpc6.
        assert!(!args.contains(&"-V".to_string()));
    }

    #[test]
    fn handler_override_is_used() {
        let (_, args) = build_args(
            "eth0",
            &DhcpClientOptions {
                handler_script: Some(PathBuf::from("/tmp/handler")),
                ..Default::default()
            },
        );
        let s = args.iter().position(|a| a == "-s").unwrap();
        assert_eq!(args[s + 1], "/tmp/handler");
    }
}
