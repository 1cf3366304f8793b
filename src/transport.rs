// Image transport: pull, retag, push, and cleanup via the container CLI

use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use thiserror::Error;
use tracing::debug;

/// Failure classes for transport operations.
///
/// `ToolMissing` is fatal to the whole run: if the container CLI binary is
/// not on the PATH, no further transfer can succeed. The other variants are
/// per-tag failures; the orchestrator logs them and moves on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("container CLI '{0}' not found on PATH")]
    ToolMissing(String),

    #[error("{op} of '{reference}' failed: {detail}")]
    CommandFailed {
        op: &'static str,
        reference: String,
        detail: String,
    },

    #[error("{op} of '{reference}' hit an unexpected fault: {source}")]
    Io {
        op: &'static str,
        reference: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransportError {
    /// Whether this failure makes the rest of the run pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::ToolMissing(_))
    }
}

/// One full-image transport capability: pull, retag, push, remove.
///
/// The production implementation shells out to a container CLI; tests use
/// a double that records invocations without touching a registry.
pub trait ImageTransport {
    fn pull(&self, reference: &str, platform: Option<&str>) -> Result<(), TransportError>;
    fn retag(&self, source: &str, destination: &str) -> Result<(), TransportError>;
    fn push(&self, reference: &str) -> Result<(), TransportError>;
    /// Best-effort local image removal after a successful push; bounds disk
    /// usage between transfers.
    fn remove(&self, reference: &str) -> Result<(), TransportError>;
}

/// Transport implementation invoking the `docker` (or compatible) CLI.
pub struct DockerCli {
    cli: String,
}

impl DockerCli {
    pub fn new(cli: &str) -> Self {
        Self {
            cli: cli.to_string(),
        }
    }

    fn run(
        &self,
        op: &'static str,
        reference: &str,
        args: &[&str],
    ) -> Result<(), TransportError> {
        let mut cmd = Command::new(&self.cli);
        cmd.args(args);
        debug!("Executing command: {:?}", cmd);

        let output = cmd.output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                TransportError::ToolMissing(self.cli.clone())
            } else {
                TransportError::Io {
                    op,
                    reference: reference.to_string(),
                    source: err,
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(TransportError::CommandFailed {
                op,
                reference: reference.to_string(),
                detail,
            });
        }

        Ok(())
    }
}

impl ImageTransport for DockerCli {
    fn pull(&self, reference: &str, platform: Option<&str>) -> Result<(), TransportError> {
        match platform {
            Some(platform) => self.run(
                "pull",
                reference,
                &["pull", "--platform", platform, reference],
            ),
            None => self.run("pull", reference, &["pull", reference]),
        }
    }

    fn retag(&self, source: &str, destination: &str) -> Result<(), TransportError> {
        self.run("tag", source, &["tag", source, destination])
    }

    fn push(&self, reference: &str) -> Result<(), TransportError> {
        self.run("push", reference, &["push", reference])
    }

    fn remove(&self, reference: &str) -> Result<(), TransportError> {
        self.run("rmi", reference, &["rmi", reference])
    }
}

/// Login to the target registry with the password passed over stdin.
/// A rejected login is fatal; nothing can be pushed without it.
pub fn registry_login(cli: &str, registry: &str, username: &str, password: &str) -> Result<()> {
    debug!(
        "Executing: {} login {} --username {} --password-stdin",
        cli, registry, username
    );

    let status = Command::new(cli)
        .arg("login")
        .arg(registry)
        .arg("--username")
        .arg(username)
        .arg("--password-stdin")
        .stdin(Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(password.as_bytes())?;
            }
            child.wait()
        })
        .with_context(|| format!("Failed to execute {} login", cli))?;

    if !status.success() {
        bail!("{} login to {} failed with status: {}", cli, registry, status);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_fatal() {
        let transport = DockerCli::new("definitely-not-a-container-cli");
        let err = transport.pull("nginx:1.25", None).unwrap_err();
        assert!(matches!(err, TransportError::ToolMissing(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_command_failure_is_recoverable_and_carries_diagnostics() {
        // `false` exists everywhere and exits non-zero without output;
        // `sh -c` gives us a stderr message to capture
        let transport = DockerCli::new("sh");
        let err = transport
            .run("pull", "nginx:1.25", &["-c", "echo boom >&2; exit 3"])
            .unwrap_err();
        match &err {
            TransportError::CommandFailed { op, detail, .. } => {
                assert_eq!(*op, "pull");
                assert_eq!(detail, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_successful_command() {
        let transport = DockerCli::new("true");
        assert!(transport.run("push", "x", &[]).is_ok());
    }
}
