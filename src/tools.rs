//! Running external binaries (ffprobe, ffmpeg) with an enforced timeout.

use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::ToolsConfig;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} produced unexpected output: {output}")]
    Unparsable { program: String, output: String },

    #[error("i/o error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured output of a successful run.
#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args`, killing it once `timeout` elapses.
///
/// Output pipes are drained on helper threads so a chatty child cannot block
/// on a full pipe while we poll for its exit.
pub fn run_with_timeout<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
) -> Result<ToolOutput, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ToolError::Spawn {
            program: name.clone(),
            source,
        })?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::Timeout {
                        program: name,
                        timeout,
                    });
                }
                thread::sleep(Duration::from_millis(20));
            }
            Err(source) => {
                let _ = child.kill();
                return Err(ToolError::Io {
                    program: name,
                    source,
                });
            }
        }
    };

    let stdout = stdout.map(join_drain).unwrap_or_default();
    let stderr = stderr.map(join_drain).unwrap_or_default();

    if !status.success() {
        return Err(ToolError::Failed {
            program: name,
            status,
            stderr: last_line(&stderr),
        });
    }

    Ok(ToolOutput { stdout, stderr })
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_drain(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// ffmpeg prints its banner first; the useful diagnostic is at the end.
fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Probe a video's container duration in seconds.
pub fn probe_duration(tools: &ToolsConfig, path: &Path) -> Result<f64, ToolError> {
    let output = run_with_timeout(
        &tools.ffprobe,
        [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-show_entries"),
            OsStr::new("format=duration"),
            OsStr::new("-of"),
            OsStr::new("default=noprint_wrappers=1:nokey=1"),
            path.as_os_str(),
        ],
        Duration::from_secs(tools.timeout_secs),
    )?;

    parse_duration(&output.stdout).ok_or_else(|| ToolError::Unparsable {
        program: tools.ffprobe.display().to_string(),
        output: output.stdout.trim().to_string(),
    })
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse::<f64>().ok())
        .filter(|d| d.is_finite())
}
