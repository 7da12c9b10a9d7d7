//! Engine adapter driving an external extractor binary
//!
//! Wraps a yt-dlp-compatible command-line extractor: transfers run the
//! binary with a machine-readable progress template and map each emitted
//! line to a [`ProgressEvent`]; format discovery reads the JSON dump mode.
//! The binary is located from configuration or by searching `PATH`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::{DownloadEngine, FormatInfo, ProgressEvent};
use crate::config::{EngineConfig, EngineOptions};
use crate::error::EngineError;

/// Default binary name searched on PATH
const ENGINE_BINARY: &str = "yt-dlp";

/// Marker prefixing every machine-readable progress line
const PROGRESS_PREFIX: &str = "media-dl-progress|";

/// Progress template handed to the binary; fields line up with
/// [`parse_progress_line`]
const PROGRESS_TEMPLATE: &str = "media-dl-progress|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress.filename)s";

/// [`DownloadEngine`] implementation that spawns an external extractor binary
pub struct CommandEngine {
    binary_path: PathBuf,
}

impl CommandEngine {
    /// Create an engine with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find the extractor binary on PATH
    ///
    /// Returns `None` when the binary is not installed.
    pub fn from_path() -> Option<Self> {
        which::which(ENGINE_BINARY).ok().map(Self::new)
    }

    /// Resolve the engine from configuration: an explicit `binary_path`
    /// wins, then a PATH search if `search_path` is enabled
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        if let Some(path) = &config.binary_path {
            return Some(Self::new(path.clone()));
        }
        if config.search_path {
            return Self::from_path();
        }
        None
    }
}

#[async_trait]
impl DownloadEngine for CommandEngine {
    async fn list_formats(
        &self,
        url: &str,
        options: &EngineOptions,
    ) -> std::result::Result<Vec<FormatInfo>, EngineError> {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("-J").arg("--no-warnings");
        if let Some(proxy) = &options.proxy_url {
            cmd.arg("--proxy").arg(proxy);
        }
        cmd.arg(url);

        let output = cmd
            .output()
            .await
            .map_err(|e| EngineError::Launch(format!("{}: {}", self.binary_path.display(), e)))?;

        if !output.status.success() {
            return Err(EngineError::FormatDiscovery(stderr_tail(
                &String::from_utf8_lossy(&output.stderr),
            )));
        }

        parse_formats_json(&String::from_utf8_lossy(&output.stdout))
    }

    async fn download(
        &self,
        url: &str,
        options: &EngineOptions,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> std::result::Result<(), EngineError> {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("--newline")
            .arg("--progress-template")
            .arg(PROGRESS_TEMPLATE)
            .arg("-f")
            .arg(&options.format)
            .arg("-o")
            .arg(&options.output_template);
        if let Some(proxy) = &options.proxy_url {
            cmd.arg("--proxy").arg(proxy);
        }
        if options.rate_limit_bps > 0 {
            cmd.arg("--limit-rate").arg(options.rate_limit_bps.to_string());
        }
        cmd.arg(url);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::Launch(format!("{}: {}", self.binary_path.display(), e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Launch("engine stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Launch("engine stderr not captured".to_string()))?;

        let task_url = url.to_string();
        let progress_reader = async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut sender_open = true;
            // Drain stdout to completion even if the aggregator went away,
            // otherwise the child stalls on a full pipe
            while let Ok(Some(line)) = lines.next_line().await {
                if !sender_open {
                    continue;
                }
                if let Some(event) = parse_progress_line(&task_url, &line) {
                    sender_open = progress.send(event).await.is_ok();
                }
            }
        };

        let stderr_reader = async move {
            let mut buf = String::new();
            let mut reader = BufReader::new(stderr);
            let _ = reader.read_to_string(&mut buf).await;
            buf
        };

        let ((), stderr_output) = tokio::join!(progress_reader, stderr_reader);

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Launch(format!("failed to reap engine process: {}", e)))?;

        if status.success() {
            Ok(())
        } else {
            let detail = stderr_tail(&stderr_output);
            if detail.is_empty() {
                Err(EngineError::Transfer(format!("engine exited with {}", status)))
            } else {
                Err(EngineError::Transfer(detail))
            }
        }
    }
}

/// Parse one stdout line into a progress event, tagging it with `url`.
///
/// Lines not produced by the progress template yield `None`. The template
/// fields are `status|downloaded|total|estimate|speed|eta|filename`; the
/// filename is the last field so embedded separators survive.
fn parse_progress_line(url: &str, line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let fields: Vec<&str> = rest.splitn(7, '|').collect();
    if fields.len() != 7 {
        return None;
    }

    let filename = non_empty_field(fields[6]).map(PathBuf::from);
    match fields[0] {
        "downloading" => Some(ProgressEvent::Downloading {
            url: url.to_string(),
            downloaded_bytes: numeric_field(fields[1]).unwrap_or(0),
            total_bytes: numeric_field(fields[2]),
            total_bytes_estimate: numeric_field(fields[3]),
            speed_bps: numeric_field(fields[4]),
            eta_seconds: numeric_field(fields[5]),
            filename,
        }),
        "finished" => Some(ProgressEvent::Finished {
            url: url.to_string(),
            filename,
            total_bytes: numeric_field(fields[2]).or_else(|| numeric_field(fields[1])),
        }),
        _ => None,
    }
}

/// Parse a template field into a byte/second count; the template renders
/// unknown values as "NA" and measured ones may be floats
fn numeric_field(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || field == "NA" || field == "None" || field == "null" {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64)
}

fn non_empty_field(field: &str) -> Option<&str> {
    let field = field.trim();
    if field.is_empty() || field == "NA" || field == "None" {
        None
    } else {
        Some(field)
    }
}

/// Extract `(format_id, format)` descriptor pairs from the JSON dump
fn parse_formats_json(raw: &str) -> std::result::Result<Vec<FormatInfo>, EngineError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| EngineError::FormatDiscovery(format!("invalid JSON dump: {}", e)))?;

    let Some(formats) = value.get("formats").and_then(|f| f.as_array()) else {
        return Ok(Vec::new());
    };

    Ok(formats
        .iter()
        .filter_map(|f| {
            let id = f.get("format_id")?.as_str()?.to_string();
            let description = f
                .get("format")
                .and_then(|d| d.as_str())
                .unwrap_or("unknown")
                .to_string();
            Some(FormatInfo { id, description })
        })
        .collect())
}

/// Last few non-empty stderr lines, for error messages
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .take(3)
        .rev()
        .copied()
        .collect::<Vec<_>>()
        .join("; ")
}
