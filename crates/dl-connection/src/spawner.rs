//! Forwarding process spawner backed by the system `ssh`

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncReadExt;
use tokio::process::Child;

use dl_core::error::ConnectionError;
use dl_core::traits::{ForwardProcess, ForwardSpec, ProcessSpawner};

use crate::ssh::forward_command;

/// Upper bound on captured diagnostic output
const MAX_CAPTURED_OUTPUT: usize = 8 * 1024;

/// Spawns `ssh -L` forwarding processes
///
/// The process is started in its own process group and is not killed when
/// its handle is dropped: a tunnel may outlive the process that created it
/// and be reused by a later one.
#[derive(Debug, Clone, Default)]
pub struct SshForwardSpawner;

impl SshForwardSpawner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessSpawner for SshForwardSpawner {
    async fn spawn_forward(
        &self,
        spec: &ForwardSpec,
    ) -> Result<Box<dyn ForwardProcess>, ConnectionError> {
        let ssh = forward_command(spec);
        tracing::debug!("Spawning forwarding process: {}", ssh);

        let mut command = ssh.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| ConnectionError::Spawn(format!("{}: {}", ssh.program, e)))?;

        let output = Arc::new(Mutex::new(String::new()));
        if let Some(mut stderr) = child.stderr.take() {
            let output = Arc::clone(&output);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match stderr.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut captured = output.lock().unwrap_or_else(PoisonError::into_inner);
                            if captured.len() < MAX_CAPTURED_OUTPUT {
                                captured.push_str(&String::from_utf8_lossy(&buf[..n]));
                            }
                        }
                    }
                }
            });
        }

        tracing::info!(
            "Started tunnel process (pid {:?}) for {}",
            child.id(),
            spec.profile.target()
        );
        Ok(Box::new(SshForwardProcess { child, output }))
    }
}

struct SshForwardProcess {
    child: Child,
    output: Arc<Mutex<String>>,
}

impl ForwardProcess for SshForwardProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    fn captured_output(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
