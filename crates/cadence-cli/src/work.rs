//! Shell command as the work function of a run.
//!
//! The period being processed is exported through environment variables;
//! the command's exit status decides success.

use std::process::Stdio;
use std::time::Duration;

use cadence_core::CadenceError;
use cadence_scheduler::context::{END_TIMESTAMP_KEY, START_TIMESTAMP_KEY};
use cadence_scheduler::{RunContext, WorkOutcome};
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, warn};

pub const ENV_TASK: &str = "CADENCE_TASK";
pub const ENV_DELTA: &str = "CADENCE_DELTA";
pub const ENV_PROJECT_ID: &str = "CADENCE_PROJECT_ID";
pub const ENV_START_TIMESTAMP: &str = "CADENCE_START_TIMESTAMP";
pub const ENV_END_TIMESTAMP: &str = "CADENCE_END_TIMESTAMP";
pub const ENV_PARAM_PREFIX: &str = "CADENCE_PARAM_";

/// Captured result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn to_payload(&self) -> Value {
        json!({
            "exitCode": self.exit_code,
            "stdout": self.stdout,
            "stderr": self.stderr,
        })
    }
}

/// Environment handed to the command for `ctx`.
///
/// Parameters become `CADENCE_PARAM_<KEY>` with the key upper-cased and
/// non-alphanumerics replaced by `_`. String values are passed verbatim,
/// anything else as JSON.
pub fn work_env(ctx: &RunContext<'_>) -> Vec<(String, String)> {
    let mut env = vec![
        (ENV_TASK.to_string(), ctx.task.name.clone()),
        (ENV_DELTA.to_string(), ctx.delta.to_string()),
        (ENV_START_TIMESTAMP.to_string(), ctx.start_timestamp().to_string()),
        (ENV_END_TIMESTAMP.to_string(), ctx.end_timestamp().to_string()),
    ];
    if let Some(project_id) = ctx.project_id {
        env.push((ENV_PROJECT_ID.to_string(), project_id.to_string()));
    }
    for (key, value) in ctx.params {
        if key == START_TIMESTAMP_KEY || key == END_TIMESTAMP_KEY {
            continue;
        }
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        env.push((format!("{ENV_PARAM_PREFIX}{}", env_key(key)), value));
    }
    env
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Run `command` with `env` added, killing it once `timeout` elapses.
pub async fn exec(
    command: &[String],
    env: &[(String, String)],
    timeout: Duration,
) -> Result<ExecResult, CadenceError> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| CadenceError::InvalidArgument("empty work command".to_string()))?;

    let child = Command::new(program)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CadenceError::Work(format!("{program}: {e}")))?;

    // Dropping the pending future on timeout drops the child, which kills it.
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
        Ok(Err(e)) => Err(CadenceError::Io(e)),
        Err(_elapsed) => Err(CadenceError::Timeout {
            secs: timeout.as_secs(),
        }),
    }
}

/// Execute the command for one period and map the result onto a work outcome.
///
/// Spawn failures and timeouts are work failures of the period, not errors
/// of the run.
pub async fn run_for(ctx: &RunContext<'_>, command: &[String], timeout: Duration) -> WorkOutcome {
    let env = work_env(ctx);
    match exec(command, &env, timeout).await {
        Ok(result) => {
            debug!(
                task = %ctx.task.name,
                delta = %ctx.delta,
                exit_code = result.exit_code,
                "work command exited"
            );
            (result.to_payload(), result.success()).into()
        }
        Err(e) => {
            warn!(task = %ctx.task.name, delta = %ctx.delta, error = %e, "work command failed");
            WorkOutcome::Failure(json!({
                "error": e.code(),
                "message": e.to_string(),
            }))
        }
    }
}
