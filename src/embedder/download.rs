/// Fetch the embedding model from the HuggingFace hub on first start.
///
/// Blocking HTTP; run it off the async runtime.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

const HF_HUB: &str = "https://huggingface.co";

/// Local file name and its path inside the hub repository.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
];

/// Local files absent from `model_dir`, paired with their hub URLs.
#[must_use]
pub fn missing_files(model_dir: &Path, repo: &str) -> Vec<(PathBuf, String)> {
    MODEL_FILES
        .iter()
        .map(|(name, remote)| (model_dir.join(name), format!("{HF_HUB}/{repo}/resolve/main/{remote}")))
        .filter(|(dest, _)| !dest.exists())
        .collect()
}

/// Download whatever part of `repo` is not yet in `model_dir`.
pub fn ensure_model(model_dir: &Path, repo: &str) -> Result<()> {
    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create model directory {}", model_dir.display()))?;

    let missing = missing_files(model_dir, repo);
    if missing.is_empty() {
        debug!(dir = %model_dir.display(), "Model files present");
        return Ok(());
    }

    info!(repo, files = missing.len(), "Downloading embedding model (one-time)");
    for (dest, url) in &missing {
        fetch(url, dest).with_context(|| format!("failed to download {url}"))?;
        info!(file = %dest.display(), "Downloaded");
    }
    Ok(())
}

/// Stream `url` into `dest` through a `.part` file.
fn fetch(url: &str, dest: &Path) -> Result<()> {
    let mut resp = reqwest::blocking::get(url)?.error_for_status()?;

    let pb = match resp.content_length() {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} {msg}")
                    .context("invalid progress template")?,
            );
            pb
        }
        _ => ProgressBar::new_spinner(),
    };
    if let Some(name) = dest.file_name() {
        pb.set_message(name.to_string_lossy().into_owned());
    }

    let partial = dest.with_extension("part");
    let file = fs::File::create(&partial)
        .with_context(|| format!("failed to create {}", partial.display()))?;
    let mut writer = pb.wrap_write(file);
    resp.copy_to(&mut writer).context("failed to stream response body")?;
    writer.flush()?;
    writer.progress.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move download into {}", dest.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REPO: &str = "BAAI/bge-small-en-v1.5";

    #[test]
    fn test_missing_files_in_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let missing = missing_files(tmp.path(), REPO);
        assert_eq!(missing.len(), MODEL_FILES.len());
        assert_eq!(
            missing[0].1,
            "https://huggingface.co/BAAI/bge-small-en-v1.5/resolve/main/onnx/model.onnx"
        );
    }

    #[test]
    fn test_missing_files_skips_present() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("tokenizer.json"), "{}").unwrap();
        let missing = missing_files(tmp.path(), REPO);
        assert_eq!(missing.len(), MODEL_FILES.len() - 1);
        assert!(missing.iter().all(|(dest, _)| !dest.ends_with("tokenizer.json")));
    }

    #[test]
    fn test_ensure_model_is_noop_when_complete() {
        let tmp = TempDir::new().unwrap();
        for (name, _) in MODEL_FILES {
            fs::write(tmp.path().join(name), "x").unwrap();
        }
        // No network access happens when nothing is missing.
        ensure_model(tmp.path(), "nonexistent/repo").unwrap();
    }
}
