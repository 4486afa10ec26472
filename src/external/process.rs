use std::io;
use std::sync::Arc;

use duct::{Expression, Handle};

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Kills the child if the awaiting future is dropped before it exits.
struct ChildGuard {
    handle: Arc<Handle>,
    armed: bool,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.handle.kill();
        }
    }
}

/// Run an expression to completion with captured output.
///
/// Non-zero exit is reported through [`ProcessOutput::success`], not as an
/// error. The child process is killed when the returned future is dropped,
/// so wrapping this in `tokio::time::timeout` bounds the process as well.
pub async fn run_captured(expression: Expression) -> io::Result<ProcessOutput> {
    let handle = Arc::new(
        expression
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .start()?,
    );
    let mut guard = ChildGuard {
        handle: Arc::clone(&handle),
        armed: true,
    };

    let waiter = Arc::clone(&handle);
    let output = tokio::task::spawn_blocking(move || waiter.wait().cloned())
        .await
        .map_err(io::Error::other)??;
    guard.armed = false;

    Ok(ProcessOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
