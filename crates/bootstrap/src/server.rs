//! Hand-off to the long-running server process.

use crate::error::ServerError;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};
use travelmate_probe::{wait_until_ready, RetryPolicy, TcpProbe};
use travelmate_telemetry::Metrics;

/// The server argv, after `{host}` and `{port}` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ServerCommand {
    pub fn parse(template: &str, host: &str, port: u16) -> Result<Self, ServerError> {
        let expanded = template
            .replace("{host}", host)
            .replace("{port}", &port.to_string());
        let mut parts = expanded.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(ServerError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Starts the server bound to a fixed host and port.
pub struct ServerLauncher {
    command: ServerCommand,
    host: String,
    port: u16,
}

impl ServerLauncher {
    pub fn new(command: ServerCommand, host: impl Into<String>, port: u16) -> Self {
        Self {
            command,
            host: host.into(),
            port,
        }
    }

    pub fn command(&self) -> &ServerCommand {
        &self.command
    }

    /// Address to probe from inside the container.
    fn local_addr(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "" => "127.0.0.1",
            "::" | "[::]" => "[::1]",
            other => other,
        };
        format!("{host}:{}", self.port)
    }

    /// Replace the current process with the server.
    ///
    /// Only returns if the exec itself failed.
    #[cfg(unix)]
    pub fn exec(self) -> ServerError {
        use std::os::unix::process::CommandExt;

        info!(command = %self.command.display(), "Handing over to server process");
        let source = std::process::Command::new(&self.command.program)
            .args(&self.command.args)
            .exec();
        ServerError::Exec {
            program: self.command.program,
            source,
        }
    }

    /// Run the server in the foreground and exit with its status.
    #[cfg(not(unix))]
    pub fn exec(self) -> ServerError {
        info!(command = %self.command.display(), "Running server process");
        match std::process::Command::new(&self.command.program)
            .args(&self.command.args)
            .status()
        {
            Ok(status) => std::process::exit(status.code().unwrap_or(1)),
            Err(source) => ServerError::Spawn {
                program: self.command.program,
                source,
            },
        }
    }

    /// Spawn the server as a child, wait until its port accepts
    /// connections, then wait for it to exit.
    ///
    /// SIGTERM and SIGINT received meanwhile are forwarded to the child.
    pub async fn supervise(&self, readiness: &RetryPolicy, metrics: &Metrics) -> Result<ExitStatus, ServerError> {
        let mut signals = ShutdownSignals::register().map_err(ServerError::Signals)?;

        info!(command = %self.command.display(), "Starting server process");
        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ServerError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        let probe = TcpProbe::new("server", self.local_addr(), readiness.attempt_timeout);
        let ready = tokio::select! {
            event = next_event(&mut child, &mut signals) => Err(event),
            ready = wait_until_ready(&probe, readiness, metrics) => Ok(ready),
        };

        match ready {
            Err(Event::Exited(status)) => {
                let code = status.ok().and_then(|s| s.code());
                error!(?code, "Server exited before accepting connections");
                return Err(ServerError::ExitedBeforeReady { code });
            }
            Err(Event::Signalled(signal)) => return self.shut_down(&mut child, signal).await,
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(ServerError::NotReady(e));
            }
            Ok(Ok(_)) => {}
        }
        info!(addr = %self.local_addr(), "Server accepting connections");

        match next_event(&mut child, &mut signals).await {
            Event::Signalled(signal) => self.shut_down(&mut child, signal).await,
            Event::Exited(status) => status.map_err(|source| ServerError::Spawn {
                program: self.command.program.clone(),
                source,
            }),
        }
    }

    async fn shut_down(&self, child: &mut Child, signal: &'static str) -> Result<ExitStatus, ServerError> {
        info!(signal, "Forwarding signal to server");
        stop_child(child, signal, SHUTDOWN_GRACE)
            .await
            .map_err(|source| ServerError::Stop {
                program: self.command.program.clone(),
                source,
            })
    }
}

/// How long a signalled server may take to exit before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

enum Event {
    Exited(std::io::Result<ExitStatus>),
    Signalled(&'static str),
}

async fn next_event(child: &mut Child, signals: &mut ShutdownSignals) -> Event {
    tokio::select! {
        status = child.wait() => Event::Exited(status),
        signal = signals.recv() => Event::Signalled(signal),
    }
}

/// SIGTERM and SIGINT listeners, registered before the server is spawned.
struct ShutdownSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    #[cfg(unix)]
    fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    fn register() -> std::io::Result<Self> {
        Ok(Self {})
    }

    /// Name of the next signal, as accepted by `kill -<name>`.
    #[cfg(unix)]
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.terminate.recv() => "TERM",
            _ = self.interrupt.recv() => "INT",
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "INT"
    }
}

/// Send `signal` to the child and wait up to `grace` for it to exit,
/// killing it afterwards.
pub(crate) async fn stop_child(child: &mut Child, signal: &str, grace: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // `kill` is a shell builtin, so no procps is needed in the image.
            let sent = Command::new("sh")
                .arg("-c")
                .arg(format!("kill -{signal} {pid}"))
                .status()
                .await?;
            if sent.success() {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(status) => return status,
                    Err(_) => warn!(grace_secs = grace.as_secs(), "Server ignored the signal, killing it"),
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = (signal, grace);

    child.kill().await?;
    child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_host_and_port() {
        let command = ServerCommand::parse(
            "gunicorn config.wsgi --bind {host}:{port} --chdir=/app",
            "0.0.0.0",
            8000,
        )
        .unwrap();
        assert_eq!(command.program, "gunicorn");
        assert_eq!(command.args, vec!["config.wsgi", "--bind", "0.0.0.0:8000", "--chdir=/app"]);
        assert_eq!(command.display(), "gunicorn config.wsgi --bind 0.0.0.0:8000 --chdir=/app");
    }

    #[test]
    fn empty_template_is_rejected() {
        assert!(matches!(
            ServerCommand::parse("   ", "0.0.0.0", 8000),
            Err(ServerError::EmptyCommand)
        ));
    }

    #[cfg(unix)]
    async fn spawn_shell(script: &str) -> Child {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        // Wait for the trap to be installed.
        let stdout = child.stdout.take().unwrap();
        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line).await.unwrap();
        assert_eq!(line.trim(), "ready");
        child
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forwarded_signal_lets_the_server_exit_cleanly() {
        let mut child =
            spawn_shell("trap 'exit 7' TERM; echo ready; while :; do sleep 0.1; done").await;
        let status = stop_child(&mut child, "TERM", Duration::from_secs(5)).await.unwrap();
        assert_eq!(status.code(), Some(7));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn server_ignoring_the_signal_is_killed_after_the_grace_period() {
        let mut child = spawn_shell("trap '' TERM; echo ready; while :; do sleep 0.1; done").await;
        let status = stop_child(&mut child, "TERM", Duration::from_millis(300)).await.unwrap();
        assert!(!status.success());
        assert_eq!(status.code(), None);
    }

    #[test]
    fn wildcard_binds_are_probed_on_loopback() {
        let command = ServerCommand::parse("uvicorn config.asgi:application", "0.0.0.0", 8000).unwrap();
        assert_eq!(ServerLauncher::new(command.clone(), "0.0.0.0", 8000).local_addr(), "127.0.0.1:8000");
        assert_eq!(ServerLauncher::new(command, "10.0.0.5", 8000).local_addr(), "10.0.0.5:8000");
    }
}
