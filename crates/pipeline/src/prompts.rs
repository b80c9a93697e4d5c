//! Question template loading.

use std::path::{Path, PathBuf};

use pagewise_core::Error;

/// Path of template `n` (1-based): `{dir}/{base}{n}.txt`.
pub fn template_path(dir: &Path, base: &str, n: usize) -> PathBuf {
    dir.join(format!("{base}{n}.txt"))
}

/// Load templates `1..=count` in order.
///
/// # Errors
///
/// `Error::InvalidInput` if `count` is 0 or a template file is empty,
/// `Error::Io` if a file cannot be read.
pub async fn load_templates(dir: &Path, base: &str, count: usize) -> Result<Vec<String>, Error> {
    if count == 0 {
        return Err(Error::InvalidInput("template count must be at least 1".into()));
    }

    let mut templates = Vec::with_capacity(count);
    for n in 1..=count {
        let path = template_path(dir, base, n);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "prompt template unreadable");
            Error::Io(e)
        })?;
        if text.trim().is_empty() {
            return Err(Error::InvalidInput(format!("prompt template {} is empty", path.display())));
        }
        templates.push(text);
    }

    tracing::info!(dir = %dir.display(), count, "prompt templates loaded");
    Ok(templates)
}
