//! Checkpoint persistence
//!
//! Checkpoints are written as pretty JSON or as bincode behind an 8-byte
//! header (little-endian version, then the magic bytes). Loading detects
//! the format from the header.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::state::{PipelineCheckpoint, CHECKPOINT_VERSION};
use crate::error::CheckpointError;

const MAGIC: &[u8; 4] = b"CSCO";

/// Format for checkpoint serialization
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// JSON format (human-readable, larger)
    Json,
    /// Binary format (compact, fast)
    #[default]
    Binary,
}

impl CheckpointFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "ckpt",
        }
    }
}

/// Save a checkpoint to a file
pub fn save_checkpoint(
    checkpoint: &PipelineCheckpoint,
    path: impl AsRef<Path>,
    format: CheckpointFormat,
) -> Result<(), CheckpointError> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    match format {
        CheckpointFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, checkpoint)
                .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        }
        CheckpointFormat::Binary => {
            writer.write_all(&CHECKPOINT_VERSION.to_le_bytes())?;
            writer.write_all(MAGIC)?;
            bincode::serialize_into(&mut writer, checkpoint)
                .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        }
    }

    writer.flush()?;
    tracing::debug!(path = %path.as_ref().display(), ?format, "checkpoint saved");
    Ok(())
}

/// Load a checkpoint from a file
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<PipelineCheckpoint, CheckpointError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CheckpointError::NotFound(path.display().to_string()));
    }

    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;

    let checkpoint: PipelineCheckpoint = if bytes.len() >= 8 && &bytes[4..8] == MAGIC {
        let version = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if version > CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: CHECKPOINT_VERSION,
                found: version,
            });
        }
        bincode::deserialize(&bytes[8..])
            .map_err(|e| CheckpointError::Deserialization(e.to_string()))?
    } else {
        serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Deserialization(e.to_string()))?
    };

    if !checkpoint.is_compatible() {
        return Err(CheckpointError::VersionMismatch {
            expected: CHECKPOINT_VERSION,
            found: checkpoint.version,
        });
    }
    Ok(checkpoint)
}

/// Numbered checkpoints in a directory, keeping the latest few
#[derive(Clone, Debug)]
pub struct CheckpointManager {
    /// Directory for checkpoint files
    pub directory: PathBuf,
    /// Base filename for checkpoints
    pub base_name: String,
    /// Serialization format
    pub format: CheckpointFormat,
    /// How many checkpoints to keep
    pub keep_n: usize,
}

impl CheckpointManager {
    /// Create a new checkpoint manager
    pub fn new(directory: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            base_name: base_name.into(),
            format: CheckpointFormat::Binary,
            keep_n: 3,
        }
    }

    /// Set the serialization format
    pub fn with_format(mut self, format: CheckpointFormat) -> Self {
        self.format = format;
        self
    }

    /// Set how many checkpoints to keep
    pub fn keep(mut self, n: usize) -> Self {
        self.keep_n = n.max(1);
        self
    }

    fn path_of(&self, index: usize) -> PathBuf {
        self.directory.join(format!(
            "{}_{:04}.{}",
            self.base_name,
            index,
            self.format.extension()
        ))
    }

    /// Indices of the saved checkpoints, ascending
    pub fn indices(&self) -> Result<Vec<usize>, CheckpointError> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}_", self.base_name);
        let suffix = format!(".{}", self.format.extension());
        let mut indices: Vec<usize> = std::fs::read_dir(&self.directory)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_prefix(&prefix)?
                    .strip_suffix(&suffix)?
                    .parse()
                    .ok()
            })
            .collect();
        indices.sort_unstable();
        Ok(indices)
    }

    /// Save a checkpoint under the next index and remove the oldest ones
    pub fn save(&self, checkpoint: &PipelineCheckpoint) -> Result<PathBuf, CheckpointError> {
        std::fs::create_dir_all(&self.directory)?;
        let indices = self.indices()?;
        let next = indices.last().map_or(0, |i| i + 1);
        let path = self.path_of(next);
        save_checkpoint(checkpoint, &path, self.format)?;

        let kept = indices.len() + 1;
        if kept > self.keep_n {
            for old in &indices[..kept - self.keep_n] {
                if let Err(e) = std::fs::remove_file(self.path_of(*old)) {
                    tracing::warn!(index = old, error = %e, "cannot remove old checkpoint");
                }
            }
        }
        Ok(path)
    }

    /// Load the newest readable checkpoint
    pub fn load_latest(&self) -> Result<Option<PipelineCheckpoint>, CheckpointError> {
        for index in self.indices()?.into_iter().rev() {
            match load_checkpoint(self.path_of(index)) {
                Ok(checkpoint) => return Ok(Some(checkpoint)),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping unreadable checkpoint");
                }
            }
        }
        Ok(None)
    }
}
