use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;

/// Read a media file's duration (seconds) with `ffprobe`.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("failed to run ffprobe")?;

    if !output.status.success() {
        return Err(anyhow!(
            "ffprobe exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    parse_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_duration(raw: &str) -> Result<f64> {
    let value = raw.trim();
    let duration: f64 = value
        .parse()
        .with_context(|| format!("unparsable duration '{value}'"))?;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(anyhow!("media reports non-positive duration {duration}"));
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_output() {
        assert_eq!(parse_duration("12.480000\n").unwrap(), 12.48);
    }

    #[test]
    fn rejects_missing_or_zero_duration() {
        assert!(parse_duration("N/A").is_err());
        assert!(parse_duration("0.000000").is_err());
        assert!(parse_duration("").is_err());
    }
}
