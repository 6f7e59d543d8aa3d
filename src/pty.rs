use crate::error::TransportError;
use crate::transport::EvalHook;
use anyhow::{Context, Result};
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use tracing::debug;

/// An interactive interpreter running inside a PTY, used as the host for
/// interpreter-transport playback.
///
/// Evaluating a command writes it to the interpreter's stdin followed by a
/// newline.
pub struct PtyHost {
    // dropping the master closes the PTY
    #[allow(dead_code)]
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
}

impl PtyHost {
    /// Spawn `command` in a PTY, returning the host and its output reader
    /// separately.
    pub fn spawn(command: &str, args: &[String]) -> Result<(Self, Box<dyn Read + Send>)> {
        let pty_system = portable_pty::native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(command);
        for arg in args {
            cmd.arg(arg);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn host interpreter: {command}"))?;

        let writer = pair
            .master
            .take_writer()
            .context("Failed to get PTY writer")?;

        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to get PTY reader")?;

        debug!(command, "host interpreter spawned");
        let host = PtyHost {
            master: pair.master,
            child,
            writer,
        };
        Ok((host, reader))
    }

    /// Check if the interpreter is still running
    pub fn is_running(&mut self) -> bool {
        self.child.try_wait().ok().flatten().is_none()
    }

    pub fn kill(&mut self) -> Result<()> {
        if self.is_running() {
            self.child.kill().context("Failed to kill host interpreter")?;
        }
        Ok(())
    }
}

impl EvalHook for PtyHost {
    fn eval(&mut self, script: &[u8]) -> Result<(), TransportError> {
        if !self.is_running() {
            return Err(TransportError::HostUnavailable);
        }
        let mut line = Vec::with_capacity(script.len() + 1);
        line.extend_from_slice(script);
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .and_then(|()| self.writer.flush())
            .map_err(|err| TransportError::Evaluation(err.to_string()))
    }
}
