use std::process::Stdio;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::Oracle;
use super::protocol::{OracleRequest, parse_response};
use crate::error::{ConfigError, OracleError};
use crate::ir::Instruction;
use crate::vm::{StateDelta, VmState};

/// Runs an external program per step: request envelope on stdin, response on stdout.
#[derive(Debug)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    retries: u32,
    runtime: tokio::runtime::Runtime,
}

impl CommandOracle {
    pub fn new(command: &[String], timeout_ms: u64, retries: u32) -> Result<Self> {
        let (program, args) = command.split_first().ok_or(ConfigError::MissingCommand)?;
        if program.trim().is_empty() {
            return Err(ConfigError::MissingCommand.into());
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| anyhow!("Failed to create tokio runtime: {}", e))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_millis(timeout_ms),
            retries,
            runtime,
        })
    }

    async fn exchange(&self, payload: &str) -> Result<String, OracleError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OracleError::transport(format!("spawning {}: {}", self.program, e)))?;

        // feed stdin while stdout drains so a chatty child cannot fill both pipes
        let stdin = child.stdin.take();
        let write = async move {
            let Some(mut stdin) = stdin else {
                return Ok::<(), std::io::Error>(());
            };
            match stdin.write_all(payload.as_bytes()).await {
                // the child may answer without reading the whole request
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        written.map_err(|e| OracleError::transport(format!("writing request: {}", e)))?;
        let output = output.map_err(|e| OracleError::transport(format!("waiting for {}: {}", self.program, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OracleError::transport(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| OracleError::malformed(format!("response is not UTF-8: {}", e)))
    }

    fn attempt(&self, payload: &str) -> Result<String, OracleError> {
        let after_ms = self.timeout.as_millis() as u64;
        self.runtime.block_on(async {
            match tokio::time::timeout(self.timeout, self.exchange(payload)).await {
                Ok(result) => result,
                Err(_) => Err(OracleError::Timeout { after_ms }),
            }
        })
    }
}

impl Oracle for CommandOracle {
    fn decide(&mut self, inst: &Instruction, state: &VmState) -> Result<StateDelta> {
        let payload = OracleRequest::new(inst, state).envelope()?;
        let mut last_err = None;
        for attempt in 0..=self.retries {
            match self.attempt(&payload).and_then(|text| parse_response(&text, inst, state)) {
                Ok(delta) => {
                    tracing::debug!(target: "symir::oracle", attempt, %inst, "command oracle answered");
                    return Ok(delta);
                }
                Err(err) => {
                    tracing::warn!(
                        target: "symir::oracle",
                        attempt,
                        %inst,
                        error = %err,
                        "oracle exchange failed"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| OracleError::transport("no attempt made"))
            .into())
    }

    fn name(&self) -> &str {
        "command"
    }
}
