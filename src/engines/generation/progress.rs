use crate::engines::generation::stats::GenerationStats;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

/// Observer for run progress. Called from the coordinating thread only.
pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: u32);
    fn on_genome_evaluated(&mut self, completed: usize, total: usize);
    fn on_generation_complete(&mut self, stats: &GenerationStats);
    fn on_checkpoint(&mut self, _generation: u32, _path: &Path) {}
}

impl<T: ProgressCallback + ?Sized> ProgressCallback for &mut T {
    fn on_generation_start(&mut self, generation: u32) {
        (**self).on_generation_start(generation)
    }

    fn on_genome_evaluated(&mut self, completed: usize, total: usize) {
        (**self).on_genome_evaluated(completed, total)
    }

    fn on_generation_complete(&mut self, stats: &GenerationStats) {
        (**self).on_generation_complete(stats)
    }

    fn on_checkpoint(&mut self, generation: u32, path: &Path) {
        (**self).on_checkpoint(generation, path)
    }
}

/// Does nothing; for hosts that only want the run summary.
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_generation_start(&mut self, _generation: u32) {}
    fn on_genome_evaluated(&mut self, _completed: usize, _total: usize) {}
    fn on_generation_complete(&mut self, _stats: &GenerationStats) {}
}

pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&mut self, generation: u32) {
        info!("Generation {} starting...", generation);
    }

    fn on_genome_evaluated(&mut self, completed: usize, total: usize) {
        if completed % 10 == 0 || completed == total {
            info!("  Evaluated {}/{} genomes", completed, total);
        }
    }

    fn on_generation_complete(&mut self, stats: &GenerationStats) {
        info!(
            "Generation {} complete. Best fitness: {:.4}, avg: {:.4}, diversity: {:.3}",
            stats.generation, stats.best_fitness, stats.avg_fitness, stats.diversity
        );
    }

    fn on_checkpoint(&mut self, generation: u32, path: &Path) {
        info!("Checkpoint for generation {} written to {}", generation, path.display());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart(u32),
    GenomeEvaluated { completed: usize, total: usize },
    GenerationComplete(GenerationStats),
    Checkpoint { generation: u32, path: PathBuf },
}

/// Forwards progress to another thread. A dropped receiver is ignored.
pub struct ChannelProgressCallback {
    sender: Sender<ProgressMessage>,
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: u32) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_genome_evaluated(&mut self, completed: usize, total: usize) {
        let _ = self.sender.send(ProgressMessage::GenomeEvaluated { completed, total });
    }

    fn on_generation_complete(&mut self, stats: &GenerationStats) {
        let _ = self.sender.send(ProgressMessage::GenerationComplete(stats.clone()));
    }

    fn on_checkpoint(&mut self, generation: u32, path: &Path) {
        let _ = self.sender.send(ProgressMessage::Checkpoint {
            generation,
            path: path.to_path_buf(),
        });
    }
}
