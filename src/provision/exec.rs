// External command runner (ip, tc) with a hard timeout

use anyhow::Context;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program args...`, collecting stdout/stderr. A non-zero exit is an error
/// carrying stderr. On timeout the child is killed before returning.
pub async fn run(program: &str, args: &[&str], timeout: Duration) -> anyhow::Result<CommandOutput> {
    let cmdline = format!("{} {}", program, args.join(" "));
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| anyhow::anyhow!("`{}` timed out after {:?}", cmdline, timeout))?
        .with_context(|| format!("spawn `{}`", cmdline))?;

    let out = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if !output.status.success() {
        anyhow::bail!(
            "`{}` failed ({}): {}",
            cmdline,
            output.status,
            out.stderr.trim()
        );
    }
    tracing::debug!(command = %cmdline, "command ok");
    Ok(out)
}
