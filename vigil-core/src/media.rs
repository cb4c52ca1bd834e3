//! Subprocess plumbing around the media toolchain.
//!
//! Staging copies go through `cp` rather than any in-process clone primitive:
//! reflink-style copies alias blocks and fail across devices on the hosts the
//! upstream server runs on. ffmpeg/ffprobe invocations keep the exact
//! argument sets the deployment is tuned for.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Run a subprocess to completion, capturing stdout.
///
/// The child inherits the caller's cancellation: when `cancel` fires the
/// select drops the wait future and `kill_on_drop` reaps the process.
async fn run_checked(program: &str, args: &[&str], cancel: &CancellationToken) -> Result<Vec<u8>> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| Error::Subprocess(format!("spawn {program}: {e}")))?;

    tokio::select! {
        () = cancel.cancelled() => Err(Error::Subprocess(format!("{program} aborted by shutdown"))),
        result = child.wait_with_output() => {
            let output = result.map_err(|e| Error::Subprocess(format!("wait {program}: {e}")))?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::Subprocess(format!(
                    "{program} exited {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
            Ok(output.stdout)
        }
    }
}

/// Stage a segment by spawning a filesystem copy. The origin file is left
/// untouched.
pub async fn copy_file(src: &Path, dst: &Path, cancel: &CancellationToken) -> Result<()> {
    let src = src.to_string_lossy();
    let dst = dst.to_string_lossy();
    run_checked("cp", &["-f", &src, &dst], cancel).await?;
    Ok(())
}

/// Extract one representative still from a TS segment.
pub async fn extract_frame(input: &Path, output: &Path, cancel: &CancellationToken) -> Result<()> {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();
    run_checked(
        "ffmpeg",
        &[
            "-i", &input,
            "-frames:v", "1",
            "-q:v", "10",
            "-vf", "scale=640:640",
            "-y", &output,
        ],
        cancel,
    )
    .await?;
    Ok(())
}

/// Remux a finished VoD playlist into a single mp4 without re-encoding.
pub async fn remux_to_mp4(playlist: &Path, output: &Path, cancel: &CancellationToken) -> Result<()> {
    let playlist = playlist.to_string_lossy();
    let output = output.to_string_lossy();
    run_checked(
        "ffmpeg",
        &["-i", &playlist, "-c", "copy", "-y", &output],
        cancel,
    )
    .await?;
    Ok(())
}

/// Probe the container start time of a TS segment, in seconds.
///
/// Returns `None` when the container does not report one.
pub async fn probe_start_time(input: &Path, cancel: &CancellationToken) -> Result<Option<f64>> {
    let input = input.to_string_lossy();
    let stdout = run_checked(
        "ffprobe",
        &[
            "-show_error",
            "-show_private_data",
            "-v", "quiet",
            "-find_stream_info",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
            &input,
        ],
        cancel,
    )
    .await?;
    Ok(parse_probe_start_time(&stdout))
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    start_time: Option<String>,
}

fn parse_probe_start_time(stdout: &[u8]) -> Option<f64> {
    let probe: ProbeOutput = serde_json::from_slice(stdout).ok()?;
    probe.format.start_time?.parse::<f64>().ok()
}
