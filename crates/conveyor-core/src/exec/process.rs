//! Isolated execution: one child process, one request, one response.
//!
//! # プロトコル
//! 1. 親が子プロセスを spawn（stdin/stdout を pipe）
//! 2. 親 -> 子: [`ExecRequest`] を 1 行の JSON で送る
//! 3. 子 -> 親: [`ExecResponse`] を 1 行の JSON で返す
//! 4. 親は結果に関係なく子を terminate する
//!
//! The exchange terminates exactly once: either a clean response line or a
//! transport-level error ends it. Failure to even spawn the child is a job
//! failure whose reason carries the `spawn failed:` prefix, so operators can
//! tell broken deployment from broken worker code.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::IsolatedConfig;
use crate::domain::{Job, JobId};

/// Outbound message to the child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    pub job_id: JobId,
    pub payload: Vec<u8>,
    pub routine_source: String,
    pub context: serde_json::Value,
}

/// Terminal status reported by the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecStatus {
    Completed,
    Failed,
}

/// Inbound message from the child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResponse {
    pub status: ExecStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs one job in a freshly spawned process.
pub struct ProcessExecutor {
    config: IsolatedConfig,
}

impl ProcessExecutor {
    pub fn new(config: IsolatedConfig) -> Self {
        Self { config }
    }

    /// Execute the exchange. `Err` carries the failure reason to persist.
    pub async fn execute(&self, job: &Job) -> Result<(), String> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("spawn failed: {e}"))?;

        let result = self.exchange(&mut child, job).await;

        // 結果に関係なく子プロセスを止める
        let _ = child.start_kill();

        match result {
            Ok(ExecResponse {
                status: ExecStatus::Completed,
                ..
            }) => Ok(()),
            Ok(ExecResponse { error, .. }) => {
                Err(error.unwrap_or_else(|| "isolated worker reported failure".to_string()))
            }
            Err(reason) => Err(reason),
        }
    }

    async fn exchange(
        &self,
        child: &mut tokio::process::Child,
        job: &Job,
    ) -> Result<ExecResponse, String> {
        let request = ExecRequest {
            job_id: job.id.clone(),
            payload: job.payload.clone(),
            routine_source: self.config.routine_source.clone(),
            context: self.config.context.clone(),
        };
        let mut line = serde_json::to_vec(&request).map_err(|e| format!("encode request: {e}"))?;
        line.push(b'\n');

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| "child stdin unavailable".to_string())?;
        stdin
            .write_all(&line)
            .await
            .map_err(|e| format!("write request: {e}"))?;
        stdin
            .shutdown()
            .await
            .map_err(|e| format!("close request stream: {e}"))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "child stdout unavailable".to_string())?;
        let mut reply = String::new();
        BufReader::new(stdout)
            .read_line(&mut reply)
            .await
            .map_err(|e| format!("read response: {e}"))?;
        if reply.trim().is_empty() {
            return Err("isolated worker exited without a response".to_string());
        }
        serde_json::from_str(&reply).map_err(|e| format!("decode response: {e}"))
    }
}
