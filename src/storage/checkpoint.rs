//! Versioned run snapshots and a directory-backed store for them.

use crate::config::AppConfig;
use crate::engines::generation::hall_of_fame::HallOfFame;
use crate::engines::generation::population::PopulationSnapshot;
use crate::error::{EvolutionError, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

const FILE_PREFIX: &str = "checkpoint_gen_";
const FILE_EXTENSION: &str = "json";

/// Engine bookkeeping that has to survive a resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    /// Best fitness of every completed generation, oldest first.
    pub best_history: Vec<f64>,
    /// Completed generations since the best fitness last improved.
    pub stagnant_generations: usize,
}

impl RunProgress {
    pub fn best_so_far(&self) -> Option<f64> {
        self.best_history.iter().copied().reduce(f64::max)
    }
}

/// Everything needed to continue a run from the next evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub run_seed: u64,
    pub population: PopulationSnapshot,
    /// Configuration in effect when the snapshot was taken.
    pub config: AppConfig,
    pub progress: RunProgress,
    pub hall_of_fame: HallOfFame,
}

impl Checkpoint {
    pub fn new(
        run_seed: u64,
        population: PopulationSnapshot,
        config: AppConfig,
        progress: RunProgress,
        hall_of_fame: HallOfFame,
    ) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            created_at: Utc::now(),
            run_seed,
            population,
            config,
            progress,
            hall_of_fame,
        }
    }

    pub fn generation(&self) -> u32 {
        self.population.generation
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot, rejecting other format versions before looking at
    /// the rest of the document.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let found = value
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;
        if found != CHECKPOINT_FORMAT_VERSION {
            return Err(EvolutionError::CheckpointVersion {
                found,
                expected: CHECKPOINT_FORMAT_VERSION,
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Where checkpoints go. The engine only writes; reading back is for resume.
pub trait CheckpointStore: Send {
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf>;
    fn load_latest(&self) -> Result<Option<Checkpoint>>;
}

/// One JSON file per generation: `<dir>/checkpoint_gen_0010.json`.
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self { directory: directory.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, generation: u32) -> PathBuf {
        self.directory
            .join(format!("{}{:04}.{}", FILE_PREFIX, generation, FILE_EXTENSION))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Checkpoint> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| EvolutionError::CheckpointIo {
            path: path.to_path_buf(),
            source,
        })?;
        Checkpoint::from_json(&json)
    }

    /// Checkpoint files in the directory as (generation, path), oldest first.
    pub fn list(&self) -> Result<Vec<(u32, PathBuf)>> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EvolutionError::CheckpointIo {
                    path: self.directory.clone(),
                    source,
                })
            }
        };

        let mut found: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter_map(|path| {
                let generation = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix(FILE_PREFIX)?
                    .strip_suffix(&format!(".{}", FILE_EXTENSION))?
                    .parse()
                    .ok()?;
                Some((generation, path))
            })
            .collect();
        found.sort();
        Ok(found)
    }
}

impl CheckpointStore for FileCheckpointStore {
    /// Write to a temporary file and rename it into place, so a crash never
    /// leaves a truncated checkpoint behind.
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let path = self.path_for(checkpoint.generation());
        let io_error = |source: std::io::Error| EvolutionError::CheckpointIo {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.directory).map_err(io_error)?;
        let tmp = path.with_extension(format!("{}.tmp", FILE_EXTENSION));
        fs::write(&tmp, checkpoint.to_json()?).map_err(io_error)?;
        fs::rename(&tmp, &path).map_err(io_error)?;

        info!("Saved checkpoint to {}", path.display());
        Ok(path)
    }

    fn load_latest(&self) -> Result<Option<Checkpoint>> {
        match self.list()?.pop() {
            Some((generation, path)) => {
                debug!("Loading checkpoint for generation {} from {}", generation, path.display());
                Self::load(path).map(Some)
            }
            None => Ok(None),
        }
    }
}
