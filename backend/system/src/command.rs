use boxinstall_core::InstallError;
use tracing::debug;

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stdout, or stderr when stdout is empty.
    pub fn combined(&self) -> &str {
        if self.stdout.trim().is_empty() {
            self.stderr.trim()
        } else {
            self.stdout.trim()
        }
    }
}

fn describe(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` with `args` and capture its output.
///
/// Only a failure to launch is an error; the exit code is returned as is.
pub async fn run(program: &str, args: &[&str]) -> Result<CommandOutput, InstallError> {
    debug!(command = %describe(program, args), "Running host command");
    let out = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| InstallError::Collaborator {
            command: describe(program, args),
            message: e.to_string(),
        })?;
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&out.stdout).to_string(),
        stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        code: out.status.code().unwrap_or(-1),
    })
}

/// Like [`run`] but a non-zero exit is an error. Returns stdout.
pub async fn run_checked(program: &str, args: &[&str]) -> Result<String, InstallError> {
    let out = run(program, args).await?;
    if !out.success() {
        return Err(InstallError::Collaborator {
            command: describe(program, args),
            message: format!("exit code {}: {}", out.code, out.combined()),
        });
    }
    Ok(out.stdout)
}
