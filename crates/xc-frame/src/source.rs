//! Where a dataset's bytes come from: a plain file or a member of a zip archive.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::csv::{read_csv_str, CsvOptions};
use crate::error::{FrameError, Result};
use crate::frame::Frame;

/// Location of a delimited dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    File { path: PathBuf },
    ArchiveMember { archive: PathBuf, member: String },
}

impl DataSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        DataSource::File { path: path.into() }
    }

    pub fn member(archive: impl Into<PathBuf>, member: impl Into<String>) -> Self {
        DataSource::ArchiveMember {
            archive: archive.into(),
            member: member.into(),
        }
    }

    /// Base name of the dataset file, without directories.
    pub fn file_name(&self) -> String {
        let name = match self {
            DataSource::File { path } => path.file_name().map(|n| n.to_string_lossy().to_string()),
            DataSource::ArchiveMember { member, .. } => {
                Path::new(member).file_name().map(|n| n.to_string_lossy().to_string())
            }
        };
        name.unwrap_or_else(|| self.to_string())
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::File { path } => write!(f, "{}", path.display()),
            DataSource::ArchiveMember { archive, member } => {
                write!(f, "{}!{}", archive.display(), member)
            }
        }
    }
}

fn open_member(archive_path: &Path, member: &str) -> Result<String> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry = archive
        .by_name(member)
        .map_err(|_| FrameError::MemberNotFound {
            archive: archive_path.display().to_string(),
            member: member.to_string(),
        })?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

/// Read the full text of a source.
pub fn read_source(source: &DataSource) -> Result<String> {
    let text = match source {
        DataSource::File { path } => std::fs::read_to_string(path)?,
        DataSource::ArchiveMember { archive, member } => open_member(archive, member)?,
    };
    debug!(source = %source, bytes = text.len(), "read dataset source");
    Ok(text)
}

/// Read and parse a source into a frame.
pub fn load_frame(source: &DataSource, options: &CsvOptions) -> Result<Frame> {
    read_csv_str(&read_source(source)?, options)
}

/// Names of the file entries in a zip archive, in archive order.
pub fn list_archive_members(archive_path: &Path) -> Result<Vec<String>> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_file() {
            names.push(entry.name().to_string());
        }
    }
    Ok(names)
}
