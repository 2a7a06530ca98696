use std::collections::BTreeSet;
use std::path::PathBuf;

use glob::{glob_with, MatchOptions, Pattern};
use serde::Deserialize;
use tracing::debug;

use docex_core::config::Component;
use docex_core::context::PipelineContext;
use docex_core::document::PathIdentifier;
use docex_core::error::{DocexError, Result};
use docex_core::ingest::FileLister;

#[derive(Debug, Clone, Deserialize)]
pub struct LocalFileListerConfig {
    pub source_dir: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    vec![".pdf".to_string()]
}

/// Lists the files directly inside a directory whose extension is in the
/// configured set. Matching ignores case; subdirectories are not descended.
pub struct LocalFileLister {
    source_dir: PathBuf,
    extensions: Vec<String>,
}

impl LocalFileLister {
    pub fn new(config: LocalFileListerConfig) -> Self {
        let extensions = config
            .extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        Self {
            source_dir: config.source_dir,
            extensions,
        }
    }

    /// One `<source_dir>/*.<ext>` pattern per extension.
    fn patterns(&self) -> Vec<String> {
        let dir = Pattern::escape(&self.source_dir.to_string_lossy());
        self.extensions
            .iter()
            .map(|ext| {
                PathBuf::from(&dir)
                    .join(format!("*.{}", Pattern::escape(ext)))
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }
}

impl Component for LocalFileLister {
    type Config = LocalFileListerConfig;
    const CONFIG_KEY: &'static str = "file_lister";

    fn from_config(config: Self::Config) -> Result<Self> {
        Ok(Self::new(config))
    }
}

impl FileLister for LocalFileLister {
    fn list_files(&self, _context: &PipelineContext) -> Result<Vec<PathIdentifier>> {
        if !self.source_dir.is_dir() {
            return Err(DocexError::Read {
                path: self.source_dir.display().to_string(),
                message: "source directory does not exist".to_string(),
            });
        }

        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };
        // Sorted and deduplicated across overlapping extensions.
        let mut found = BTreeSet::new();
        for pattern in self.patterns() {
            let matches = glob_with(&pattern, options)
                .map_err(|e| DocexError::Config(format!("Invalid glob pattern {pattern}: {e}")))?;
            for entry in matches {
                let path = entry.map_err(|e| DocexError::Read {
                    path: e.path().display().to_string(),
                    message: e.error().to_string(),
                })?;
                if path.is_file() {
                    found.insert(path);
                }
            }
        }

        debug!(
            source_dir = %self.source_dir.display(),
            count = found.len(),
            "Listed input files"
        );

        Ok(found
            .into_iter()
            .map(|p| PathIdentifier::new(p.to_string_lossy()))
            .collect())
    }
}
