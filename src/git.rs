//! Local mirror of a git-hosted source repository.
//!
//! Workflow:
//! 1. Clone the repository under the configured data directory if absent,
//!    otherwise fast-forward pull.
//! 2. Expose the head revision and "does revision X still exist".
//! 3. Enumerate record files, either all of them (full import) or the
//!    set changed between a revision and head (incremental import).
//!
//! Mirror failures (network, auth, missing git) are fatal to a sync run;
//! they surface as errors here and abort before any watermark write.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::info;
use walkdir::WalkDir;

use crate::config::SourceConfig;

pub struct SourceMirror {
    repo_path: PathBuf,
    include: GlobSet,
}

impl SourceMirror {
    /// Ensure a local mirror of `repo_name` exists and is up to date.
    pub fn open(source: &SourceConfig, repo_name: &str) -> Result<Self> {
        let repo_url = format!("{}/{}.git", source.base_url.trim_end_matches('/'), repo_name);
        let repo_path = source.data_dir.join(repo_name);

        if repo_path.join(".git").exists() {
            info!(repo = repo_name, "pulling latest");
            git_pull(&repo_path)?;
        } else {
            info!(repo = repo_name, url = %repo_url, "cloning");
            git_clone(&repo_url, &repo_path)?;
        }

        Ok(Self {
            repo_path,
            include: build_globset(&source.include_globs)?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.repo_path
    }

    /// Current HEAD commit hash.
    pub fn head_revision(&self) -> Result<String> {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| "Failed to execute 'git rev-parse'. Is git installed?")?;

        if !output.status.success() {
            bail!(
                "git rev-parse HEAD failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether a revision still resolves in the mirror.
    pub fn revision_exists(&self, revision: &str) -> bool {
        Command::new("git")
            .args(["cat-file", "-e", revision])
            .current_dir(&self.repo_path)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Record files changed between `since_revision` and HEAD. Files
    /// deleted in the meantime are dropped from the result.
    pub fn changed_files_since(&self, since_revision: &str) -> Result<Vec<PathBuf>> {
        let range = format!("{}..HEAD", since_revision);
        let output = Command::new("git")
            .args(["diff", "--name-only", &range])
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| "Failed to execute 'git diff'")?;

        if !output.status.success() {
            bail!(
                "git diff failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut files = Vec::new();
        for line in stdout.lines() {
            let relative = line.trim();
            if relative.is_empty() || !self.include.is_match(relative) {
                continue;
            }
            let path = self.repo_path.join(relative);
            if path.exists() {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// All record files in the mirror, sorted by path.
    pub fn all_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.repo_path) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.repo_path).unwrap_or(path);
            let rel_str = relative.to_string_lossy();
            if rel_str.starts_with(".git") {
                continue;
            }
            if self.include.is_match(rel_str.as_ref()) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}

fn git_clone(url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }

    let output = Command::new("git")
        .args(["clone", "--single-branch"])
        .arg(url)
        .arg(dest)
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        bail!(
            "git clone failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

fn git_pull(repo_dir: &Path) -> Result<()> {
    let output = Command::new("git")
        .args(["pull", "--ff-only"])
        .current_dir(repo_dir)
        .output()
        .with_context(|| "Failed to execute 'git pull'")?;

    if !output.status.success() {
        bail!(
            "git pull failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
