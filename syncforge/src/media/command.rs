//! Child process execution with captured, level-classified output.

use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

const LOG_CHANNEL_CAPACITY: usize = 1024;
const MAX_LOG_LINES: usize = 500;

/// Severity of a captured output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A single captured output line.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

/// Output from a command execution including captured logs.
pub struct CommandOutput {
    pub status: std::process::ExitStatus,
    pub duration_secs: f64,
    pub lines: Vec<LogLine>,
}

impl CommandOutput {
    /// Last error-level line, falling back to the last line of any level.
    pub fn last_error(&self) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .find(|l| l.level == LogLevel::Error)
            .or_else(|| self.lines.last())
            .map(|l| l.message.as_str())
    }

    /// Tail of the captured output, newest last.
    pub fn tail(&self, n: usize) -> String {
        let start = self.lines.len().saturating_sub(n);
        self.lines[start..]
            .iter()
            .map(|l| l.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Classify an ffmpeg stderr line. ffmpeg writes progress to stderr, so most
/// lines are informational.
pub fn classify_ffmpeg_line(line: &str) -> LogLevel {
    let lower = line.to_lowercase();
    if lower.contains("error") || lower.starts_with("fatal") || lower.contains("failed") {
        LogLevel::Error
    } else if lower.contains("warning") || lower.contains("warn") {
        LogLevel::Warn
    } else {
        LogLevel::Info
    }
}

fn push_capped(lines: &mut VecDeque<LogLine>, entry: LogLine) {
    if lines.len() >= MAX_LOG_LINES {
        // Prefer evicting an informational line over a warn/error.
        if matches!(entry.level, LogLevel::Warn | LogLevel::Error)
            && let Some(index) = lines.iter().position(|l| l.level == LogLevel::Info)
        {
            let _ = lines.remove(index);
        } else {
            lines.pop_front();
        }
    }
    lines.push_back(entry);
}

/// Run a command and capture stdout/stderr as classified log lines.
pub async fn run_command_with_logs(command: &mut Command) -> crate::Result<CommandOutput> {
    let start = std::time::Instant::now();

    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.env("LC_ALL", "C");

    let mut child = command
        .spawn()
        .map_err(|e| crate::Error::media(format!("Failed to spawn command: {}", e)))?;

    let (tx, mut rx) = tokio::sync::mpsc::channel::<LogLine>(LOG_CHANNEL_CAPACITY);

    let stdout_handle = child.stdout.take().map(|stdout| {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("stdout: {}", line);
                let _ = tx
                    .try_send(LogLine {
                        level: LogLevel::Info,
                        message: line,
                    });
            }
        })
    });

    let stderr_handle = child.stderr.take().map(|stderr| {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let level = classify_ffmpeg_line(&line);
                debug!("stderr: {}", line);
                let _ = tx.try_send(LogLine {
                    level,
                    message: line,
                });
            }
        })
    });

    drop(tx);

    let mut lines = VecDeque::new();
    let mut status: Option<std::process::ExitStatus> = None;
    let mut wait_fut = Box::pin(child.wait());

    // Drain output while waiting so the bounded channel can't fill up and
    // drop the trailing lines that usually carry the error.
    loop {
        tokio::select! {
            res = &mut wait_fut, if status.is_none() => {
                status = Some(res.map_err(|e| {
                    crate::Error::media(format!("Failed to wait for command: {}", e))
                })?);
            }
            entry = rx.recv() => {
                match entry {
                    Some(entry) => push_capped(&mut lines, entry),
                    None => {
                        if status.is_none() {
                            status = Some(wait_fut.await.map_err(|e| {
                                crate::Error::media(format!("Failed to wait for command: {}", e))
                            })?);
                        }
                        break;
                    }
                }
            }
        }
    }

    if let Some(handle) = stdout_handle {
        let _ = handle.await;
    }
    if let Some(handle) = stderr_handle {
        let _ = handle.await;
    }

    let status =
        status.ok_or_else(|| crate::Error::media("process exit status missing".to_string()))?;

    Ok(CommandOutput {
        status,
        duration_secs: start.elapsed().as_secs_f64(),
        lines: lines.into_iter().collect(),
    })
}
