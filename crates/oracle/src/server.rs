//! Dev server management - spawning and health checking the dashboard

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{OracleError, OracleResult};

/// How long `shutdown` waits after SIGTERM
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Handle to a running dev server process
pub struct ServerHandle {
    child: Child,
    health_url: String,
}

impl ServerHandle {
    /// Spawn the configured dev server and wait until it answers
    pub async fn spawn(config: &ServerConfig) -> OracleResult<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| OracleError::ServerStartup("empty server command".to_string()))?;

        info!("Spawning dev server: {}", config.command.join(" "));

        let child = Command::new(program)
            .args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| OracleError::ServerStartup(format!("Failed to spawn {}: {}", program, e)))?;

        let handle = ServerHandle {
            child,
            health_url: config.health_url.clone(),
        };

        handle
            .wait_for_healthy(Duration::from_millis(config.startup_timeout_ms))
            .await?;

        info!("Dev server is healthy at {}", handle.health_url);
        Ok(handle)
    }

    async fn wait_for_healthy(&self, timeout_duration: Duration) -> OracleResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            match client.get(&self.health_url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => warn!("Health check returned {}", resp.status()),
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for dev server to start...");
                    }
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(250)).await;
        }

        Err(OracleError::ServerHealthCheck(attempts))
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Stop the server: SIGTERM, a grace period, then kill
    pub async fn shutdown(mut self) -> OracleResult<()> {
        if self.terminate() {
            let deadline = Instant::now() + STOP_GRACE;
            while Instant::now() < deadline {
                if let Ok(Some(_)) = self.child.try_wait() {
                    return Ok(());
                }
                sleep(Duration::from_millis(50)).await;
            }
            warn!("Dev server ignored SIGTERM, killing it");
        }
        self.kill();
        Ok(())
    }

    /// Send SIGTERM; false when the server already exited
    fn terminate(&mut self) -> bool {
        if let Ok(Some(_)) = self.child.try_wait() {
            return false;
        }

        info!("Stopping dev server (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let _ = kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM);
        }
        true
    }

    fn kill(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

/// `[server]` section: how to bring the dashboard up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Program and arguments, e.g. `["npx", "ng", "serve"]`
    pub command: Vec<String>,

    pub working_dir: PathBuf,

    /// Polled until it returns a success status
    pub health_url: String,

    pub startup_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: vec!["npx".to_string(), "ng".to_string(), "serve".to_string()],
            working_dir: PathBuf::from("."),
            health_url: "http://localhost:4200/".to_string(),
            startup_timeout_ms: 120_000,
        }
    }
}
