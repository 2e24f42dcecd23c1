use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::ScannerConfig;
use crate::db::MediaKind;
use crate::thumbnails::THUMBS_DIR;

/// Case-insensitive extension → kind lookup.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    kinds: HashMap<String, MediaKind>,
}

impl ExtensionMap {
    pub fn from_config(config: &ScannerConfig) -> Self {
        let mut kinds = HashMap::new();
        for ext in &config.image_extensions {
            kinds.insert(ext.to_lowercase(), MediaKind::Image);
        }
        for ext in &config.video_extensions {
            kinds.insert(ext.to_lowercase(), MediaKind::Video);
        }
        Self { kinds }
    }

    pub fn classify(&self, path: &Path) -> Option<(String, MediaKind)> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        let kind = *self.kinds.get(&ext)?;
        Some((ext, kind))
    }
}

/// A file whose extension maps to a media kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub extension: String,
    pub kind: MediaKind,
}

/// A root or subtree the walk could not enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Canonical roots that were walked.
    pub roots: Vec<PathBuf>,
    pub candidates: Vec<Candidate>,
    pub failures: Vec<WalkFailure>,
}

impl Discovery {
    /// Whether `path` lies under a subtree the walk skipped. Rows there must
    /// not be treated as removed.
    pub fn is_unvisited(&self, path: &Path) -> bool {
        self.failures.iter().any(|f| path.starts_with(&f.path))
    }

    pub fn is_under_root(&self, path: &Path) -> bool {
        self.roots.iter().any(|r| path.starts_with(r))
    }
}

/// Walk every root and collect media candidates.
///
/// Errors never abort the walk: an unreadable root or subtree is recorded and
/// skipped. Derived `thumbs` directories are not descended into.
pub fn discover_media(roots: &[PathBuf], extensions: &ExtensionMap) -> Discovery {
    let mut discovery = Discovery::default();

    for root in roots {
        let root = match root.canonicalize() {
            Ok(r) => r,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Cannot open scan root");
                discovery.failures.push(WalkFailure {
                    path: root.clone(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        let walker = WalkDir::new(&root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                !(e.depth() > 0 && e.file_type().is_dir() && e.file_name() == THUMBS_DIR)
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    warn!(path = %path.display(), error = %e, "Skipping unreadable subtree");
                    discovery.failures.push(WalkFailure {
                        path,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if let Some((extension, kind)) = extensions.classify(entry.path()) {
                discovery.candidates.push(Candidate {
                    path: entry.into_path(),
                    extension,
                    kind,
                });
            }
        }

        discovery.roots.push(root);
    }

    discovery.candidates.sort_by(|a, b| a.path.cmp(&b.path));
    discovery
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn extensions() -> ExtensionMap {
        ExtensionMap::from_config(&ScannerConfig::default())
    }

    #[test]
    fn test_discover_media() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("clip.MP4")).unwrap();
        File::create(dir.path().join("shot.png")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        fs::create_dir(dir.path().join("season")).unwrap();
        File::create(dir.path().join("season/ranked.mkv")).unwrap();

        let found = discover_media(&[dir.path().to_path_buf()], &extensions());

        assert!(found.failures.is_empty());
        assert_eq!(found.candidates.len(), 3);
        let clip = found
            .candidates
            .iter()
            .find(|c| c.path.ends_with("clip.MP4"))
            .unwrap();
        assert_eq!(clip.kind, MediaKind::Video);
        assert_eq!(clip.extension, "mp4");
        assert!(clip.path.is_absolute());
    }

    #[test]
    fn test_thumbs_directory_is_skipped() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(THUMBS_DIR)).unwrap();
        File::create(dir.path().join(THUMBS_DIR).join("clip_0badf00d.gif")).unwrap();
        File::create(dir.path().join("clip.mp4")).unwrap();

        let found = discover_media(&[dir.path().to_path_buf()], &extensions());
        assert_eq!(found.candidates.len(), 1);
    }

    #[test]
    fn test_missing_root_is_recorded() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("clip.mp4")).unwrap();
        let missing = dir.path().join("does-not-exist");

        let found = discover_media(&[missing.clone(), dir.path().to_path_buf()], &extensions());

        assert_eq!(found.failures.len(), 1);
        assert_eq!(found.failures[0].path, missing);
        assert_eq!(found.candidates.len(), 1);
        assert_eq!(found.roots.len(), 1);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempdir().unwrap();
        let found = discover_media(&[dir.path().to_path_buf()], &extensions());
        assert!(found.candidates.is_empty());
        assert!(found.failures.is_empty());
    }
}
