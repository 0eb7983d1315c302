//! Image build and push through the local container CLI

use crate::error::{DeployError, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Default container CLI
pub const DEFAULT_IMAGE_TOOL: &str = "docker";

/// Wrapper around the container CLI
#[derive(Debug, Clone)]
pub struct ImageTool {
    program: String,
}

impl Default for ImageTool {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_TOOL)
    }
}

impl ImageTool {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    /// `docker build -t <image> <context>`
    pub async fn build(&self, image: &str, context: &Path) -> Result<()> {
        tracing::info!("building {}", image);
        let context = context.to_string_lossy();
        self.run(&["build", "-t", image, context.as_ref()]).await
    }

    /// `docker push <image>`
    pub async fn push(&self, image: &str) -> Result<()> {
        tracing::info!("pushing {}", image);
        self.run(&["push", image]).await
    }

    /// Run the tool, streaming its output into the log
    async fn run(&self, args: &[&str]) -> Result<()> {
        let command_line = format!("{} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DeployError::Build(format!("failed to run {}: {}", command_line, e)))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (out, err) = tokio::join!(stream_lines(stdout, false), stream_lines(stderr, true));
        out?;
        err?;

        let status = child.wait().await?;
        if !status.success() {
            return Err(DeployError::Build(format!(
                "{} exited with {}",
                command_line, status
            )));
        }

        Ok(())
    }
}

async fn stream_lines<R: AsyncRead + Unpin>(reader: Option<R>, is_stderr: bool) -> Result<()> {
    let Some(reader) = reader else {
        return Ok(());
    };

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if is_stderr {
            tracing::debug!("stderr: {}", line);
        } else {
            tracing::debug!("{}", line);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_successful_command() {
        let dir = tempdir().unwrap();
        let tool = ImageTool::new("echo");
        tool.build("acme/web:latest", dir.path()).await.unwrap();
        tool.push("acme/web:latest").await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_command() {
        let tool = ImageTool::new("false");
        let result = tool.push("acme/web:latest").await;
        assert!(matches!(result, Err(DeployError::Build(_))));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let tool = ImageTool::new("definitely-not-a-container-cli");
        let result = tool.push("acme/web:latest").await;
        assert!(matches!(result, Err(DeployError::Build(_))));
    }
}
