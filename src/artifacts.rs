//! Discovery and relocation of the files the external script leaves behind.
//!
//! Files are classified purely by extension. Directory entries are sorted by
//! file name before classification, so when a class has several candidates
//! the lexicographically last one ends up as `<analysis_id>.<ext>`.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{RunError, RunResult};
use crate::types::{AnalysisId, ImageRef};

/// Bookkeeping file the script keeps for itself; never a result.
pub const RESERVED_DATA_FILE: &str = "groups.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Text,
    Data,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Image, Self::Text, Self::Data];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::Text => "txt",
            Self::Data => "json",
        }
    }

    /// Whether a file with this name belongs to this class.
    pub fn matches(&self, file_name: &str) -> bool {
        let suffix = format!(".{}", self.extension());
        if !file_name.ends_with(&suffix) {
            return false;
        }
        !(*self == Self::Data && file_name == RESERVED_DATA_FILE)
    }

    pub fn classify(file_name: &str) -> Option<ArtifactKind> {
        Self::ALL.into_iter().find(|kind| kind.matches(file_name))
    }
}

/// What a successful run left behind, already relocated.
#[derive(Debug, Default)]
pub struct CollectedArtifacts {
    pub image: Option<ImageRef>,
    pub text: String,
    pub data: Option<Map<String, Value>>,
}

/// Moves artifacts from the script output directory into durable storage.
pub struct ArtifactCollector<'a> {
    output_dir: &'a Path,
    data_dir: &'a Path,
    analysis_id: AnalysisId,
}

impl<'a> ArtifactCollector<'a> {
    pub fn new(output_dir: &'a Path, data_dir: &'a Path, analysis_id: AnalysisId) -> Self {
        Self {
            output_dir,
            data_dir,
            analysis_id,
        }
    }

    /// Scan once per artifact class, relocate matches and decode their content.
    pub async fn collect(&self) -> RunResult<CollectedArtifacts> {
        let mut collected = CollectedArtifacts::default();

        if self.relocate_kind(ArtifactKind::Image).await?.is_some() {
            collected.image = Some(ImageRef::new(self.analysis_id.to_string()));
        }

        if let Some(path) = self.relocate_kind(ArtifactKind::Text).await? {
            collected.text = read_text(&path).await?;
        }

        if let Some(path) = self.relocate_kind(ArtifactKind::Data).await? {
            collected.data = Some(read_data(&path).await?);
        }

        Ok(collected)
    }

    /// Relocate every file of `kind` onto the same target; returns the target if anything moved.
    async fn relocate_kind(&self, kind: ArtifactKind) -> RunResult<Option<PathBuf>> {
        let candidates: Vec<PathBuf> = list_files(self.output_dir)
            .await?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .and_then(ArtifactKind::classify)
                    == Some(kind)
            })
            .collect();

        if candidates.is_empty() {
            debug!("No .{} artifact in {}", kind.extension(), self.output_dir.display());
            return Ok(None);
        }
        if candidates.len() > 1 {
            warn!(
                "{} .{} artifacts found in {}; keeping the last by name",
                candidates.len(),
                kind.extension(),
                self.output_dir.display()
            );
        }

        let target = self
            .data_dir
            .join(self.analysis_id.artifact_file_name(kind.extension()));
        for source in &candidates {
            relocate(source, &target).await?;
            info!("Relocated {} -> {}", source.display(), target.display());
        }

        Ok(Some(target))
    }
}

/// Regular files directly inside `dir`, sorted by file name.
async fn list_files(dir: &Path) -> RunResult<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| RunError::io(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| RunError::io(dir, e))? {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| RunError::io(entry.path(), e))?;
        if file_type.is_file() {
            files.push(entry.path());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Move `source` to `target`, replacing any existing file.
///
/// A plain rename is atomic on one filesystem. Across devices the file is
/// copied to a temporary sibling of `target` and renamed into place.
pub async fn relocate(source: &Path, target: &Path) -> RunResult<()> {
    match tokio::fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            debug!("{} is on another device; copying", source.display());
            copy_into_place(source, target).await
        }
        Err(e) => Err(RunError::io(source, e)),
    }
}

/// Copy `source` next to `target`, rename it over `target`, then remove `source`.
async fn copy_into_place(source: &Path, target: &Path) -> RunResult<()> {
    let staging = target.with_extension(format!(
        "{}.partial",
        target.extension().and_then(|e| e.to_str()).unwrap_or_default()
    ));
    tokio::fs::copy(source, &staging)
        .await
        .map_err(|e| RunError::io(&staging, e))?;
    if let Err(e) = tokio::fs::rename(&staging, target).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(RunError::io(target, e));
    }
    tokio::fs::remove_file(source)
        .await
        .map_err(|e| RunError::io(source, e))
}

/// Read a text artifact line by line, terminating every line with `\n`.
///
/// Lines are split on `\n` with a trailing `\r` dropped; bytes that are not
/// valid UTF-8 are replaced rather than rejected.
async fn read_text(path: &Path) -> RunResult<String> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| RunError::UnreadableText {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(join_lines(&raw))
}

fn join_lines(raw: &[u8]) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let body = raw.strip_suffix(b"\n").unwrap_or(raw);

    let mut text = String::with_capacity(raw.len() + 1);
    for line in body.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        text.push_str(&String::from_utf8_lossy(line));
        text.push('\n');
    }
    text
}

async fn read_data(path: &Path) -> RunResult<Map<String, Value>> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| RunError::io(path, e))?;
    serde_json::from_slice(&raw).map_err(|source| RunError::MalformedData {
        path: path.to_path_buf(),
        source,
    })
}
