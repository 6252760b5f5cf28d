// ============================================================
// Layer 4 — Content File Loader
// ============================================================
// Reads the corpus from disk. `corpus.path` may name a single file
// or a directory; directories are walked recursively and their
// files read in sorted path order so the corpus text is stable
// across machines.
//
// Hidden entries (leading '.') are skipped. Files that are not
// valid UTF-8 are logged and skipped rather than failing the load.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::content_file::ContentFile;

pub struct ContentFileLoader {
    root: PathBuf,
}

impl ContentFileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn load_all(&self) -> Result<Vec<ContentFile>> {
        let root = &self.root;
        let metadata = fs::metadata(root)
            .with_context(|| format!("Cannot read corpus path '{}'", root.display()))?;

        let paths = if metadata.is_file() {
            vec![root.clone()]
        } else {
            let mut paths = Vec::new();
            collect_files(root, &mut paths)?;
            paths.sort();
            paths
        };

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(&path)
                .with_context(|| format!("Cannot read '{}'", path.display()))?;
            match String::from_utf8(bytes) {
                Ok(text) => {
                    let source = relative_source(root, &path);
                    tracing::debug!("Loaded: {} ({} chars)", source, text.len());
                    files.push(ContentFile::new(source, text));
                }
                Err(_) => tracing::warn!("Skipping '{}': not valid UTF-8", path.display()),
            }
        }

        tracing::info!("Loaded {} content files from '{}'", files.len(), root.display());
        Ok(files)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
    {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn relative_source(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}
