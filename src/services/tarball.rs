//! Directory archive service
//!
//! Archives a directory (or each of its sub-directories) into a tar file,
//! optionally gzip compressed. Entries are stored below the directory's own
//! name, so an archive of `/srv/data` unpacks as `data/...` next to it.

use super::common::{ensure_dir, generate_filename, is_selected, remove_directory_contents, with_extension};
use super::{BackupResult, BackupResults, Service};
use crate::config::TarballConfig;
use crate::error::ServiceError;
use crate::utils::codec::is_compressed;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

pub struct TarballService {
    config: TarballConfig,
    save_dir: PathBuf,
}

impl TarballService {
    pub fn new(config: TarballConfig, save_dir: PathBuf) -> Self {
        Self { config, save_dir }
    }

    fn dir_name(&self) -> String {
        self.config
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn archive_name(&self, basedir: &str) -> String {
        if !self.config.name.is_empty() {
            format!("{}-backup", self.config.name)
        } else {
            format!("{}_{}-backup", self.dir_name(), basedir)
        }
    }

    /// Path of the archived tree inside the archive, relative to the parent of `path`
    fn archive_root(&self, basedir: &str) -> PathBuf {
        join_non_empty(PathBuf::from(self.dir_name()), &[basedir, &self.config.path_prefix])
    }

    async fn archive(&self, basedir: &str) -> Result<PathBuf, ServiceError> {
        let name = self.archive_name(basedir);
        let dest_dir = join_non_empty(self.save_dir.clone(), &[basedir, &self.config.path_prefix]);
        ensure_dir(&dest_dir).await?;

        let extension = if self.config.compress { ".tar.gz" } else { ".tar" };
        let dest = with_extension(generate_filename(&dest_dir, &name), extension);
        let src = join_non_empty(self.config.path.clone(), &[basedir, &self.config.path_prefix]);
        let root = self.archive_root(basedir);
        let compress = self.config.compress;

        let target = dest.clone();
        let written = tokio::task::spawn_blocking(move || write_archive(&src, &root, &target, compress))
            .await
            .map_err(|e| io::Error::other(e.to_string()))
            .and_then(|r| r);

        if let Err(e) = written {
            if let Err(remove) = std::fs::remove_file(&dest) {
                if remove.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial archive {}: {}", dest.display(), remove);
                }
            }
            return Err(ServiceError::io(format!("cannot create tarball {}", dest.display()), e));
        }

        info!("Archived {} to {}", self.config.path.display(), dest.display());
        Ok(dest)
    }

    async fn backup_per_dir(&self) -> Result<BackupResults, ServiceError> {
        let mut subdirs = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.config.path)
            .await
            .map_err(|e| ServiceError::io(format!("cannot read {}", self.config.path.display()), e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ServiceError::io(format!("cannot read {}", self.config.path.display()), e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                subdirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        subdirs.sort();

        let mut results = Vec::new();
        for subdir in subdirs {
            if !is_selected(&subdir, &self.config.backup_dirs, &self.config.exclude_dirs) {
                continue;
            }
            let path = self.archive(&subdir).await?;
            results.push(BackupResult::new(subdir.clone(), self.archive_name(&subdir), path));
        }
        Ok(results)
    }
}

#[async_trait]
impl Service for TarballService {
    fn name(&self) -> &str {
        "tarball"
    }

    async fn backup(&self) -> Result<BackupResults, ServiceError> {
        if self.config.backup_per_dir {
            return self.backup_per_dir().await;
        }
        let path = self.archive("").await?;
        Ok(vec![BackupResult::new("", self.archive_name(""), path)])
    }

    /// Empty the archived tree, then unpack the archive next to `path`
    async fn restore(&self, artifact: &Path) -> Result<(), ServiceError> {
        let parent = match self.config.path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
            Some(parent) => parent.to_path_buf(),
            None => {
                return Err(ServiceError::InvalidConfig(format!(
                    "cannot restore into {}",
                    self.config.path.display()
                )))
            }
        };

        let artifact = artifact.to_path_buf();
        let root = parent.clone();
        tokio::task::spawn_blocking(move || {
            let tree = root.join(first_entry(&artifact)?);
            std::fs::create_dir_all(&tree)?;
            remove_directory_contents(&tree)?;
            info!("Unpacking {} into {}", artifact.display(), root.display());
            open_archive(&artifact)?.unpack(&root)
        })
        .await
        .map_err(|e| io::Error::other(e.to_string()))
        .and_then(|r| r)
        .map_err(|e| ServiceError::io(format!("cannot unpack backup into {}", parent.display()), e))
    }
}

fn join_non_empty(base: PathBuf, parts: &[&str]) -> PathBuf {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .fold(base, |acc, p| acc.join(p))
}

fn write_archive(src: &Path, root: &Path, dest: &Path, compress: bool) -> io::Result<()> {
    let file = File::create(dest)?;
    if compress {
        let encoder = GzEncoder::new(file, Compression::default());
        let encoder = append_tree(encoder, src, root)?;
        encoder.finish()?.sync_all()
    } else {
        append_tree(file, src, root)?.sync_all()
    }
}

fn append_tree<W: Write>(writer: W, src: &Path, root: &Path) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);
    builder.append_dir_all(root, src)?;
    builder.into_inner()
}

fn open_archive(path: &Path) -> io::Result<tar::Archive<Box<dyn Read>>> {
    let file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = if is_compressed(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(tar::Archive::new(reader))
}

/// Directory the archive was rooted at, checked to stay below the unpack target
fn first_entry(path: &Path) -> io::Result<PathBuf> {
    let mut archive = open_archive(path)?;
    let mut entries = archive.entries()?;
    let entry = entries
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "archive is empty"))??;
    if !entry.header().entry_type().is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "archive does not start with a directory",
        ));
    }
    let root = entry.path()?.into_owned();
    if root.components().any(|c| !matches!(c, Component::Normal(_))) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsafe archive root {}", root.display()),
        ));
    }
    Ok(root)
}
