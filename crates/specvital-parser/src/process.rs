//! Process-based `ParserAdapter`: shells out to an external test-inventory
//! parser binary and reads its inventory back from stdout as JSON.

use crate::error::{ParserError, ParserResult};
use crate::models::Inventory;
use crate::traits::ParserAdapter;
use async_trait::async_trait;
use specvital_source::Source;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub struct ProcessParserAdapter {
    binary_path: String,
    timeout: Duration,
}

impl ProcessParserAdapter {
    pub fn new(binary_path: impl Into<String>, timeout_seconds: u64) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

#[async_trait]
impl ParserAdapter for ProcessParserAdapter {
    async fn scan(&self, source: &dyn Source) -> ParserResult<Inventory> {
        let mut command = Command::new(&self.binary_path);
        command
            .arg(source.root_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(|e| ParserError::LaunchFailed {
            binary_path: self.binary_path.clone(),
            message: e.to_string(),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ParserError::TimedOut)?
            .map_err(|e| ParserError::LaunchFailed {
                binary_path: self.binary_path.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ParserError::NonZeroExit {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ParserError::MalformedOutput {
            message: e.to_string(),
        })
    }
}
