//! Input path expansion for `pctx add`.
//!
//! Files are taken as given. Directories are walked recursively and
//! filtered through the `[ingest]` include/exclude globs; each file's
//! folder is its directory relative to the walked root.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::models::normalize_folder;

/// A file selected for import, with the folder it should be filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub folder: String,
    pub size: u64,
}

/// Expand `paths` into files. `base_folder` prefixes every derived folder.
pub fn scan_paths(paths: &[PathBuf], base_folder: &str, config: &IngestConfig) -> Result<Vec<ScannedFile>> {
    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for root in paths {
        if root.is_file() {
            files.push(ScannedFile {
                path: root.clone(),
                folder: normalize_folder(base_folder),
                size: std::fs::metadata(root)?.len(),
            });
            continue;
        }
        if !root.is_dir() {
            bail!("path does not exist: {}", root.display());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
                continue;
            }

            let parent = relative
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default();
            found.push(ScannedFile {
                path: path.to_path_buf(),
                folder: normalize_folder(&format!("{}/{}", base_folder, parent)),
                size: entry.metadata()?.len(),
            });
        }

        // Sort for deterministic ordering
        found.sort_by(|a, b| a.path.cmp(&b.path));
        files.extend(found);
    }

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn directories_are_walked_with_globs_and_folders() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("lore");
        fs::create_dir_all(root.join("npcs")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("intro.md"), "Intro").unwrap();
        fs::write(root.join("npcs/mira.txt"), "Mira").unwrap();
        fs::write(root.join("npcs/portrait.png"), "png").unwrap();
        fs::write(root.join(".git/config.md"), "ignored").unwrap();

        let files = scan_paths(&[root.clone()], "campaign", &IngestConfig::default()).unwrap();
        let listed: Vec<(String, String)> = files
            .iter()
            .map(|f| {
                (
                    f.path.file_name().unwrap().to_string_lossy().to_string(),
                    f.folder.clone(),
                )
            })
            .collect();
        assert_eq!(
            listed,
            vec![
                ("intro.md".to_string(), "campaign".to_string()),
                ("mira.txt".to_string(), "campaign/npcs".to_string()),
            ]
        );
    }

    #[test]
    fn explicit_files_bypass_globs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("odd.png");
        fs::write(&file, "x").unwrap();
        let files = scan_paths(&[file], "", &IngestConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].folder, "");
        assert_eq!(files[0].size, 1);
    }

    #[test]
    fn missing_paths_fail() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(scan_paths(&[tmp.path().join("nope")], "", &IngestConfig::default()).is_err());
    }
}
