//! Open, save and download actions on a finished animation

use regex::Regex;
use reel_session::ExportedMedia;
use reel_stream::{Artifact, BackendClient};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::utils::open_with_system;

/// File name used when the topic is blank
pub const DEFAULT_HTML_NAME: &str = "animation.html";

/// Whitespace and path separators are replaced in file names.
static FILE_NAME_UNSAFE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s/\\]").unwrap());

/// `<topic>.html` with whitespace replaced by underscores
pub fn html_file_name(topic: &str) -> String {
    let stem = FILE_NAME_UNSAFE.replace_all(topic.trim(), "_");
    if stem.is_empty() {
        DEFAULT_HTML_NAME.to_string()
    } else {
        format!("{}.html", stem)
    }
}

/// Write the artifact to `dir` and return the file path
pub fn save_artifact(artifact: &Artifact, topic: &str, dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(html_file_name(topic));
    fs::write(&path, artifact.as_str())?;
    tracing::debug!("Saved artifact to {}", path.display());
    Ok(path)
}

/// Write the artifact to the cache directory and open it in the browser
pub fn open_artifact(artifact: &Artifact) -> std::io::Result<PathBuf> {
    let dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("reel");
    let path = save_artifact(artifact, "preview", &dir)?;
    open_with_system(&path)?;
    Ok(path)
}

/// Download an exported video into `dir`
pub async fn download_media(
    client: &BackendClient,
    media: &ExportedMedia,
    dir: &Path,
) -> reel_stream::Result<PathBuf> {
    let path = dir.join(&media.file_name);
    let bytes = client.download(media.download_url.clone(), &path).await?;
    tracing::debug!("Downloaded {} bytes to {}", bytes, path.display());
    Ok(path)
}
