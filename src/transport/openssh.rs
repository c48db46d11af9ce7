//! SSH collaborator backed by the system `ssh` binary
//!
//! `connect` starts a ControlMaster for the destination; every later
//! command and transfer is a short-lived `ssh` client multiplexed over
//! that master's control socket.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{ExecOutput, ProgressFn, SshConnection, SshTransport, TransferPair};
use crate::config::AppConfig;
use crate::error::{ConnectError, TransportError};
use crate::models::SessionDescriptor;
use crate::remote::command::quote;
use crate::remote::path::join_remote_path;

const CHUNK_SIZE: usize = 32 * 1024;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const ASKPASS_ENV: &str = "SSHFM_ASKPASS_VALUE";
/// Exit status ssh uses for its own failures
const SSH_ERROR_CODE: i32 = 255;

#[derive(Debug, Clone)]
pub struct OpenSshOptions {
    pub program: String,
    pub runtime_dir: PathBuf,
    pub connect_timeout: Duration,
    pub strict_host_key_checking: String,
}

impl OpenSshOptions {
    pub fn from_config(config: &AppConfig, runtime_dir: PathBuf) -> Self {
        Self {
            program: config.ssh_program.clone(),
            runtime_dir,
            connect_timeout: config.connect_timeout(),
            strict_host_key_checking: config.strict_host_key_checking.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    options: Arc<OpenSshOptions>,
}

impl OpenSshTransport {
    pub fn new(options: OpenSshOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    async fn write_askpass_script(&self) -> std::io::Result<PathBuf> {
        let path = self.options.runtime_dir.join("askpass.sh");
        let script = format!("#!/bin/sh\nprintf '%s\\n' \"${}\"\n", ASKPASS_ENV);
        fs::write(&path, script).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700)).await?;
        }
        Ok(path)
    }
}

#[async_trait]
impl SshTransport for OpenSshTransport {
    async fn connect(
        &self,
        descriptor: &SessionDescriptor,
    ) -> Result<Arc<dyn SshConnection>, ConnectError> {
        fs::create_dir_all(&self.options.runtime_dir).await?;

        let connection = OpenSshConnection {
            options: self.options.clone(),
            control_path: control_path(&self.options.runtime_dir, descriptor),
            descriptor: descriptor.clone(),
        };

        // A master left over from an earlier run is reused as is
        if connection.is_connected().await {
            info!("Reusing existing control master for {}", descriptor);
            return Ok(Arc::new(connection));
        }

        let mut cmd = connection.base_command();
        cmd.arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg("ControlPersist=yes")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.options.connect_timeout.as_secs().max(1)
            ))
            .arg("-N")
            .kill_on_drop(false);

        let secret = if descriptor.private_key.is_some() {
            descriptor.passphrase.as_ref().or(descriptor.password.as_ref())
        } else {
            descriptor.password.as_ref()
        };
        match secret {
            Some(secret) => {
                let askpass = self.write_askpass_script().await?;
                cmd.arg("-o")
                    .arg("BatchMode=no")
                    .env("SSH_ASKPASS", askpass)
                    .env("SSH_ASKPASS_REQUIRE", "force")
                    .env("DISPLAY", ":0")
                    .env(ASKPASS_ENV, secret);
            }
            None => {
                cmd.arg("-o").arg("BatchMode=yes");
            }
        }
        cmd.arg(descriptor.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        info!("Starting control master for {}", descriptor);
        let mut master = cmd.spawn()?;
        connection.wait_until_ready(&mut master).await?;
        info!("Connected to {}", descriptor);

        Ok(Arc::new(connection))
    }
}

struct OpenSshConnection {
    options: Arc<OpenSshOptions>,
    descriptor: SessionDescriptor,
    control_path: PathBuf,
}

impl OpenSshConnection {
    fn base_command(&self) -> Command {
        let strict = if self.descriptor.requires_fingerprint_auth == Some(true) {
            "yes"
        } else {
            self.options.strict_host_key_checking.as_str()
        };

        let mut cmd = Command::new(&self.options.program);
        cmd.arg("-p")
            .arg(self.descriptor.port.to_string())
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.display()))
            .arg("-o")
            .arg(format!("StrictHostKeyChecking={}", strict))
            .arg("-o")
            .arg("LogLevel=ERROR");
        if let Some(key) = &self.descriptor.private_key {
            cmd.arg("-i").arg(key);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// An `ssh` client that only talks through the existing master.
    fn client_command(&self) -> Command {
        let mut cmd = self.base_command();
        // ssh falls back to a direct connection when the control socket is
        // gone; a failing proxy turns that fallback into an error
        cmd.arg("-o")
            .arg("ControlMaster=no")
            .arg("-o")
            .arg("ProxyCommand=false")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-T");
        cmd
    }

    async fn control_operation(&self, op: &str) -> std::io::Result<bool> {
        let mut cmd = self.base_command();
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-O")
            .arg(op)
            .arg(self.descriptor.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        Ok(cmd.status().await?.success())
    }

    async fn wait_until_ready(&self, master: &mut Child) -> Result<(), ConnectError> {
        let deadline = Instant::now() + self.options.connect_timeout;
        loop {
            if self.is_connected().await {
                return Ok(());
            }

            if let Some(status) = master.try_wait()? {
                if !status.success() {
                    let mut stderr = String::new();
                    if let Some(mut stream) = master.stderr.take() {
                        let _ = stream.read_to_string(&mut stderr).await;
                    }
                    let reason = if stderr.trim().is_empty() {
                        format!("ssh exited with {}", status)
                    } else {
                        stderr.trim().to_string()
                    };
                    warn!("Control master for {} failed: {}", self.descriptor, reason);
                    return Err(ConnectError::Failed {
                        target: self.descriptor.to_string(),
                        reason,
                    });
                }
            }

            if Instant::now() >= deadline {
                let _ = master.kill().await;
                return Err(ConnectError::Timeout {
                    target: self.descriptor.to_string(),
                    secs: self.options.connect_timeout.as_secs(),
                });
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn upload_one(
        &self,
        local: &Path,
        remote: &str,
        transferred: &mut u64,
        total: u64,
        step: &ProgressFn,
    ) -> Result<(), TransportError> {
        let mut file = fs::File::open(local).await?;
        let mut child = self
            .client_command()
            .arg(self.descriptor.destination())
            .arg(format!("cat > {}", quote(remote)))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Process("ssh stdin unavailable".to_string()))?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            stdin.write_all(&buf[..n]).await?;
            *transferred += n as u64;
            step(*transferred, n as u64, total);
        }
        stdin.shutdown().await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(TransportError::Process(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        debug!("Uploaded {} -> {}", local.display(), remote);
        Ok(())
    }
}

#[async_trait]
impl SshConnection for OpenSshConnection {
    async fn is_connected(&self) -> bool {
        self.control_operation("check").await.unwrap_or(false)
    }

    async fn exec(&self, command: &str) -> Result<ExecOutput, TransportError> {
        let output = self
            .client_command()
            .arg(self.descriptor.destination())
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await?;

        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        // 255 is also a legitimate remote exit status; only a dead master
        // makes it a transport failure
        if code == SSH_ERROR_CODE && !self.is_connected().await {
            warn!(
                "Control master for {} is gone: {}",
                self.descriptor,
                stderr.trim()
            );
            return Err(TransportError::Disconnected);
        }

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr,
            code,
        })
    }

    async fn put_files(
        &self,
        pairs: &[TransferPair],
        step: &ProgressFn,
    ) -> Result<(), TransportError> {
        let mut total = 0;
        for pair in pairs {
            total += fs::metadata(&pair.local).await?.len();
        }

        let mut transferred = 0;
        for pair in pairs {
            self.upload_one(&pair.local, &pair.remote, &mut transferred, total, step)
                .await?;
        }
        Ok(())
    }

    async fn put_directory(
        &self,
        local: &Path,
        remote: &str,
        step: &ProgressFn,
    ) -> Result<(), TransportError> {
        let mut dirs = vec![remote.to_string()];
        let mut files = Vec::new();
        let mut total = 0;

        for entry in WalkDir::new(local).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(local)
                .map_err(|e| TransportError::Process(e.to_string()))?;
            let mut target = remote.to_string();
            for component in relative.components() {
                target = join_remote_path(&target, &component.as_os_str().to_string_lossy());
            }

            if entry.file_type().is_dir() {
                dirs.push(target);
            } else if entry.file_type().is_file() {
                total += entry.metadata().map_err(std::io::Error::from)?.len();
                files.push((entry.path().to_path_buf(), target));
            }
        }

        let mkdir = format!(
            "mkdir -p -- {}",
            dirs.iter().map(|d| quote(d)).collect::<Vec<_>>().join(" ")
        );
        let output = self.exec(&mkdir).await?;
        if output.code != 0 {
            return Err(TransportError::Process(output.stderr.trim().to_string()));
        }

        let mut transferred = 0;
        for (local_file, remote_file) in &files {
            self.upload_one(local_file, remote_file, &mut transferred, total, step)
                .await?;
        }
        Ok(())
    }

    async fn get_file(
        &self,
        local: &Path,
        remote: &str,
        step: &ProgressFn,
    ) -> Result<(), TransportError> {
        let size = self.exec(&format!("wc -c < {}", quote(remote))).await?;
        if size.code != 0 {
            return Err(TransportError::Process(size.stderr.trim().to_string()));
        }
        let total = size.stdout.trim().parse::<u64>().unwrap_or(0);

        let mut child = self
            .client_command()
            .arg(self.descriptor.destination())
            .arg(format!("cat -- {}", quote(remote)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Process("ssh stdout unavailable".to_string()))?;
        let mut file = fs::File::create(local).await?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut transferred = 0u64;
        loop {
            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            transferred += n as u64;
            step(transferred, n as u64, total.max(transferred));
        }
        file.flush().await?;

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(TransportError::Process(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        debug!("Downloaded {} -> {}", remote, local.display());
        Ok(())
    }

    async fn close(&self) {
        match self.control_operation("exit").await {
            Ok(true) => info!("Closed control master for {}", self.descriptor),
            Ok(false) => debug!("No control master running for {}", self.descriptor),
            Err(e) => warn!("Failed to stop control master for {}: {}", self.descriptor, e),
        }
    }
}

/// Control socket path for a destination. Hashed to stay within the
/// unix socket path limit.
fn control_path(runtime_dir: &Path, descriptor: &SessionDescriptor) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    descriptor.key().hash(&mut hasher);
    runtime_dir.join(format!("cm-{:016x}.sock", hasher.finish()))
}
