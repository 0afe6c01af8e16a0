//! Lifecycle shell scripts.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to run {script}: {source}")]
    Spawn {
        script: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{script} exited with {code:?}: {stderr}")]
    Failed {
        script: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Runs scripts from one directory.
#[derive(Debug, Clone)]
pub struct Scripts {
    dir: PathBuf,
}

impl Scripts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `name` with `args` and return its trimmed stdout.
    pub async fn run(&self, name: &str, args: &[String]) -> Result<String, ScriptError> {
        let path = self.dir.join(name);
        let script = path.display().to_string();
        debug!(%script, ?args, "Running script");

        let output = Command::new(&path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ScriptError::Spawn {
                script: script.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ScriptError::Failed {
                script,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_script_fails_to_spawn() {
        let scripts = Scripts::new("/nonexistent-meshsim-scripts");
        let err = scripts.run("start_node.sh", &["0".into()]).await.unwrap_err();
        assert!(matches!(err, ScriptError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_is_trimmed_and_exit_code_checked() {
        let scripts = Scripts::new("/bin");
        let out = scripts.run("echo", &[" 10.0.0.4 ".into()]).await.unwrap();
        assert_eq!(out, "10.0.0.4");

        let err = scripts.run("false", &[]).await.unwrap_err();
        assert!(matches!(err, ScriptError::Failed { code: Some(1), .. }));
    }
}
