//! conveyor-runner: child side of the isolated-execution exchange.
//!
//! Reads one [`ExecRequest`] line from stdin, runs the referenced routine,
//! and writes one [`ExecResponse`] line to stdout. The parent terminates
//! this process after the response, so there is nothing to loop over.
//!
//! This demo runner only knows the built-in `demo.echo` routine; a real
//! deployment replaces this binary with one that loads the worker code named
//! by `routine_source`.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use conveyor_core::exec::{ExecRequest, ExecResponse, ExecStatus};

async fn run_routine(request: &ExecRequest) -> Result<(), String> {
    match request.routine_source.as_str() {
        "demo.echo" => {
            eprintln!(
                "[conveyor-runner] job={} payload={} context={}",
                request.job_id,
                String::from_utf8_lossy(&request.payload),
                request.context
            );
            Ok(())
        }
        other => Err(format!("unknown routine source: {other}")),
    }
}

#[tokio::main]
async fn main() {
    let mut line = String::new();
    if BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .is_err()
    {
        return;
    }

    let response = match serde_json::from_str::<ExecRequest>(&line) {
        Ok(request) => match run_routine(&request).await {
            Ok(()) => ExecResponse {
                status: ExecStatus::Completed,
                error: None,
            },
            Err(reason) => ExecResponse {
                status: ExecStatus::Failed,
                error: Some(reason),
            },
        },
        Err(e) => ExecResponse {
            status: ExecStatus::Failed,
            error: Some(format!("decode request: {e}")),
        },
    };

    let mut out = serde_json::to_vec(&response).expect("response serializes");
    out.push(b'\n');
    let _ = tokio::io::stdout().write_all(&out).await;
}
