//! Generational control loop.
//!
//! ```text
//! INIT -> EVALUATE -> SCORE -> SELECT_AND_REPRODUCE -> ADVANCE -> CHECKPOINT? -> EVALUATE ...
//!                                                                            \-> TERMINATED
//! ```
//!
//! One coordinating thread runs the loop and owns the population. The only
//! concurrency is inside EVALUATE, where the dispatcher fans genomes out to
//! the worker pool and blocks until every one has an outcome.

use crate::config::AppConfig;
use crate::engines::evaluation::collaborators::{StrategyEvaluator, StrategySynthesizer};
use crate::engines::evaluation::dispatcher::{EvaluationDispatcher, EvaluationJob, EvaluationOutcome};
use crate::engines::evaluation::fitness::FitnessEvaluator;
use crate::engines::generation::catalog::IndicatorCatalog;
use crate::engines::generation::generator::{GenomeGenerator, RandomGenomeGenerator};
use crate::engines::generation::genome::Genome;
use crate::engines::generation::hall_of_fame::{EliteRecord, HallOfFame};
use crate::engines::generation::operators::GeneticOperators;
use crate::engines::generation::population::Population;
use crate::engines::generation::progress::ProgressCallback;
use crate::engines::generation::stats::{EvaluationTally, GenerationStats};
use crate::error::{EvolutionError, Result};
use crate::storage::checkpoint::{
    Checkpoint, CheckpointStore, FileCheckpointStore, RunProgress, CHECKPOINT_FORMAT_VERSION,
};
use crate::storage::records::{EvaluationRecord, NullRecorder, RunRecorder};
use crate::types::{GenomeId, RawMetrics};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const DEFAULT_HALL_OF_FAME_SIZE: usize = 20;

const PHASE_INIT: u64 = 1;
const PHASE_REPRODUCE: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Init,
    Evaluate,
    Score,
    SelectAndReproduce,
    Advance,
    Checkpoint,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    MaxGenerations,
    StopSignal,
    Converged,
}

#[derive(Debug)]
pub struct RunSummary {
    pub termination: TerminationReason,
    /// Generation the population was at when the run ended.
    pub final_generation: u32,
    pub run_seed: u64,
    pub best: Option<Genome>,
    pub history: Vec<GenerationStats>,
    pub hall_of_fame: Vec<EliteRecord>,
    pub population: Population,
    pub last_checkpoint: Option<PathBuf>,
}

/// Random source for one phase of one generation. Deriving it from the run
/// seed, rather than threading one stream through the run, lets a resumed
/// run draw exactly what the uninterrupted run would have.
pub fn generation_rng(run_seed: u64, generation: u32, phase: u64) -> StdRng {
    // splitmix64 finaliser over the combined inputs
    let mut x = run_seed
        ^ u64::from(generation).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ phase.wrapping_mul(0xD1B5_4A32_D192_ED03);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 31;
    StdRng::seed_from_u64(x)
}

struct RunState {
    run_seed: u64,
    population: Population,
    progress: RunProgress,
    hall_of_fame: HallOfFame,
    history: Vec<GenerationStats>,
    last_checkpoint: Option<PathBuf>,
}

pub struct EvolutionEngine {
    config: AppConfig,
    synthesizer: Arc<dyn StrategySynthesizer>,
    dispatcher: EvaluationDispatcher,
    fitness: FitnessEvaluator,
    operators: GeneticOperators,
    generator: Box<dyn GenomeGenerator>,
    recorder: Box<dyn RunRecorder>,
    checkpoints: Option<Box<dyn CheckpointStore>>,
    hall_of_fame_size: usize,
    stop: Arc<AtomicBool>,
    state: EngineState,
}

impl EvolutionEngine {
    pub fn new(
        config: AppConfig,
        synthesizer: Arc<dyn StrategySynthesizer>,
        evaluator: Arc<dyn StrategyEvaluator>,
    ) -> Result<Self> {
        config.validate()?;

        let catalog = IndicatorCatalog::standard();
        let dispatcher = EvaluationDispatcher::new(&config.evaluation, evaluator);
        Ok(Self {
            synthesizer,
            dispatcher,
            fitness: FitnessEvaluator::new(config.fitness.clone()),
            operators: GeneticOperators::from_config(&config.evolution, &config.genome, catalog.clone()),
            generator: Box::new(RandomGenomeGenerator::new(catalog, config.genome.clone())),
            recorder: Box::new(NullRecorder),
            checkpoints: Some(Box::new(FileCheckpointStore::new(config.checkpoint.directory.clone()))),
            hall_of_fame_size: DEFAULT_HALL_OF_FAME_SIZE,
            stop: Arc::new(AtomicBool::new(false)),
            state: EngineState::Init,
            config,
        })
    }

    /// Use a different indicator library for random synthesis and mutation.
    pub fn with_catalog(mut self, catalog: IndicatorCatalog) -> Self {
        self.operators =
            GeneticOperators::from_config(&self.config.evolution, &self.config.genome, catalog.clone());
        self.generator = Box::new(RandomGenomeGenerator::new(catalog, self.config.genome.clone()));
        self
    }

    pub fn with_generator(mut self, generator: Box<dyn GenomeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_recorder(mut self, recorder: Box<dyn RunRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_checkpoint_store(mut self, store: Box<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn without_checkpoints(mut self) -> Self {
        self.checkpoints = None;
        self
    }

    pub fn with_hall_of_fame_size(mut self, size: usize) -> Self {
        self.hall_of_fame_size = size;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Set the returned flag to stop the run. It is checked at generation
    /// boundaries and while waiting on evaluations.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Start a fresh run from randomly generated genomes.
    pub fn run<C: ProgressCallback>(&mut self, mut callback: C) -> Result<RunSummary> {
        self.state = EngineState::Init;
        let run_seed = self.config.evolution.seed.unwrap_or_else(rand::random);
        info!(
            "Starting evolution: population {}, max generations {}, seed {}",
            self.config.evolution.population_size, self.config.evolution.max_generations, run_seed
        );

        let mut rng = generation_rng(run_seed, 0, PHASE_INIT);
        let population =
            Population::initialize(self.config.evolution.population_size, self.generator.as_ref(), &mut rng)
                .map_err(|e| abort(0, e, None))?;

        let run = RunState {
            run_seed,
            population,
            progress: RunProgress::default(),
            hall_of_fame: HallOfFame::new(self.hall_of_fame_size),
            history: Vec::new(),
            last_checkpoint: None,
        };
        self.run_loop(run, &mut callback)
    }

    /// Continue a run from a checkpoint, starting at its next evaluation pass.
    pub fn run_from<C: ProgressCallback>(
        &mut self,
        checkpoint: Checkpoint,
        mut callback: C,
    ) -> Result<RunSummary> {
        self.state = EngineState::Init;
        if checkpoint.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(EvolutionError::CheckpointVersion {
                found: checkpoint.format_version,
                expected: CHECKPOINT_FORMAT_VERSION,
            });
        }
        if checkpoint.config != self.config {
            warn!("Checkpoint was written under a different configuration; using the current one");
        }

        let generation = checkpoint.generation();
        let population = Population::restore(checkpoint.population)?;
        info!(
            "Resuming evolution at generation {} ({} genomes, seed {})",
            generation,
            population.len(),
            checkpoint.run_seed
        );

        let run = RunState {
            run_seed: checkpoint.run_seed,
            population,
            progress: checkpoint.progress,
            hall_of_fame: checkpoint.hall_of_fame,
            history: Vec::new(),
            last_checkpoint: None,
        };
        self.run_loop(run, &mut callback)
    }

    fn run_loop<C: ProgressCallback>(&mut self, mut run: RunState, callback: &mut C) -> Result<RunSummary> {
        let termination = loop {
            match self.step(&mut run, callback) {
                Ok(Some(reason)) => break reason,
                Ok(None) => {}
                Err(e) => {
                    let generation = run.population.generation();
                    error!("Fatal error in generation {}: {}", generation, e);
                    self.state = EngineState::Terminated;
                    return Err(abort(generation, e, run.last_checkpoint));
                }
            }
        };
        self.state = EngineState::Terminated;

        info!(
            "Evolution finished at generation {} ({:?})",
            run.population.generation(),
            termination
        );

        let best = run
            .hall_of_fame
            .best()
            .map(|r| r.genome.clone())
            .or_else(|| run.population.top_n(1).into_iter().find(|g| g.is_evaluated()).cloned());

        Ok(RunSummary {
            termination,
            final_generation: run.population.generation(),
            run_seed: run.run_seed,
            best,
            history: run.history,
            hall_of_fame: run.hall_of_fame.get_all().to_vec(),
            population: run.population,
            last_checkpoint: run.last_checkpoint,
        })
    }

    /// One pass through the state machine. Returns the termination reason
    /// once the run is over.
    fn step<C: ProgressCallback>(
        &mut self,
        run: &mut RunState,
        callback: &mut C,
    ) -> Result<Option<TerminationReason>> {
        let generation = run.population.generation();
        let max_generations = self.config.evolution.max_generations;

        if generation >= max_generations {
            return Ok(Some(TerminationReason::MaxGenerations));
        }
        if self.stop.load(Ordering::SeqCst) {
            info!("Stop requested before generation {}", generation);
            self.save_checkpoint(run, callback)?;
            return Ok(Some(TerminationReason::StopSignal));
        }

        callback.on_generation_start(generation);
        let (tally, cancelled) = self.evaluate(run, callback)?;
        if cancelled {
            info!(
                "Stop requested during generation {}; {} evaluations left for resume",
                generation, tally.cancelled
            );
            self.save_checkpoint(run, callback)?;
            return Ok(Some(TerminationReason::StopSignal));
        }

        let mut stats = GenerationStats::from_members(generation, run.population.members(), tally);
        if self.config.evaluation.ignore_invalid_strategies {
            stats.purged = run.population.purge_invalid();
            if stats.purged > 0 {
                debug!("Purged {} invalid genomes", stats.purged);
            }
        }
        self.finish_generation(run, stats, callback);

        let converged = self
            .config
            .evolution
            .convergence_patience
            .map_or(false, |patience| run.progress.stagnant_generations >= patience);
        if converged || generation + 1 >= max_generations {
            self.save_checkpoint(run, callback)?;
            return Ok(Some(if converged {
                info!("Converged: no improvement for {} generations", run.progress.stagnant_generations);
                TerminationReason::Converged
            } else {
                TerminationReason::MaxGenerations
            }));
        }

        self.reproduce(run)?;

        if self.config.checkpoint.is_due(run.population.generation()) {
            self.save_checkpoint(run, callback)?;
        }
        Ok(None)
    }

    /// EVALUATE and SCORE. Genome-level failures are recorded against the
    /// genome; only engine contract violations come back as errors.
    fn evaluate<C: ProgressCallback>(
        &mut self,
        run: &mut RunState,
        callback: &mut C,
    ) -> Result<(EvaluationTally, bool)> {
        self.state = EngineState::Evaluate;
        let generation = run.population.generation();
        let pending: Vec<Genome> = run.population.unevaluated().into_iter().cloned().collect();
        let total = pending.len();

        let mut tally = EvaluationTally::default();
        let mut rejected: BTreeMap<GenomeId, EvolutionError> = BTreeMap::new();
        let mut jobs = Vec::with_capacity(total);

        for genome in &pending {
            if let Err(e) = self.recorder.record_genome(genome) {
                warn!("Failed to record genome {}: {:#}", genome.id, e);
            }
            if let Err(e) = genome.validate(&self.config.genome) {
                rejected.insert(genome.id, e);
                continue;
            }
            match self.synthesizer.synthesize(genome) {
                Ok(artifact) => jobs.push(EvaluationJob { genome_id: genome.id, artifact }),
                Err(e) => {
                    let reason = format!("strategy synthesis failed: {:#}", e);
                    rejected.insert(genome.id, EvolutionError::EvaluationError { id: genome.id, reason });
                }
            }
        }

        tally.dispatched = jobs.len();
        let mut completed = rejected.len();
        if completed > 0 {
            callback.on_genome_evaluated(completed, total);
        }
        let report = self.dispatcher.dispatch(jobs, &self.stop, |_, _| {
            completed += 1;
            callback.on_genome_evaluated(completed, total);
        });

        self.state = EngineState::Score;
        for (id, failure) in rejected {
            match failure {
                EvolutionError::InvalidGenome { .. } => tally.invalid_genomes += 1,
                _ => tally.errors += 1,
            }
            self.record_failure(run, id, generation, None, failure)?;
        }

        for (id, outcome) in report.outcomes {
            match outcome {
                EvaluationOutcome::Metrics(metrics) => match self.fitness.score(&metrics) {
                    Ok(score) => {
                        run.population.set_fitness(id, score.fitness)?;
                        tally.scored += 1;
                        self.record_result(EvaluationRecord {
                            genome_id: id,
                            generation,
                            fitness: score.fitness,
                            valid: true,
                            metrics: Some(metrics),
                            score: Some(score),
                            failure: None,
                        });
                    }
                    Err(e) if e.is_genome_local() => {
                        tally.insufficient_trades += 1;
                        self.record_failure(run, id, generation, Some(metrics), e)?;
                    }
                    Err(e) => return Err(e),
                },
                EvaluationOutcome::Timeout(elapsed) => {
                    tally.timeouts += 1;
                    let failure = EvolutionError::EvaluationTimeout { id, elapsed };
                    self.record_failure(run, id, generation, None, failure)?;
                }
                EvaluationOutcome::Error(reason) => {
                    tally.errors += 1;
                    let failure = EvolutionError::EvaluationError { id, reason };
                    self.record_failure(run, id, generation, None, failure)?;
                }
                EvaluationOutcome::Cancelled => tally.cancelled += 1,
            }
        }

        // a stop that arrived after the last result leaves nothing to resume
        Ok((tally, report.cancelled && tally.cancelled > 0))
    }

    fn record_failure(
        &mut self,
        run: &mut RunState,
        id: GenomeId,
        generation: u32,
        metrics: Option<RawMetrics>,
        failure: EvolutionError,
    ) -> Result<()> {
        debug!("Genome {} marked invalid: {}", id, failure);
        run.population.mark_invalid(id)?;
        self.record_result(EvaluationRecord {
            genome_id: id,
            generation,
            fitness: 0.0,
            valid: false,
            metrics,
            score: None,
            failure: Some(failure.to_string()),
        });
        Ok(())
    }

    fn record_result(&mut self, record: EvaluationRecord) {
        if let Err(e) = self.recorder.record_result(&record) {
            warn!("Failed to record result for {}: {:#}", record.genome_id, e);
        }
    }

    fn finish_generation<C: ProgressCallback>(
        &mut self,
        run: &mut RunState,
        stats: GenerationStats,
        callback: &mut C,
    ) {
        for genome in run.population.members() {
            run.hall_of_fame.try_add(genome, stats.generation);
        }

        let improved = match run.progress.best_so_far() {
            Some(previous) => stats.best_fitness > previous + self.config.evolution.convergence_tolerance,
            None => true,
        };
        if improved {
            run.progress.stagnant_generations = 0;
        } else {
            run.progress.stagnant_generations += 1;
        }
        run.progress.best_history.push(stats.best_fitness);

        if let Err(e) = self.recorder.record_generation_stats(&stats) {
            warn!("Failed to record stats for generation {}: {:#}", stats.generation, e);
        }

        info!(
            "Generation {}: {} valid, {} invalid ({} failed evaluation, {} timed out), best {:.4}, avg {:.4}",
            stats.generation,
            stats.valid,
            stats.invalid,
            stats.evaluation.failures(),
            stats.evaluation.timeouts,
            stats.best_fitness,
            stats.avg_fitness
        );
        callback.on_generation_complete(&stats);
        run.history.push(stats);
    }

    /// SELECT_AND_REPRODUCE then ADVANCE.
    fn reproduce(&mut self, run: &mut RunState) -> Result<()> {
        self.state = EngineState::SelectAndReproduce;
        let generation = run.population.generation();
        let next_generation = generation + 1;
        let evolution = &self.config.evolution;
        let mut rng = generation_rng(run.run_seed, generation, PHASE_REPRODUCE);
        let mut ids = run.population.id_allocator();

        let elite: Vec<Genome> = run
            .population
            .top_n(evolution.elite_size)
            .into_iter()
            .filter(|g| g.is_evaluated())
            .cloned()
            .collect();
        let open = run.population.size().saturating_sub(elite.len());

        let parents = run.population.evaluated();
        let immigrants = if parents.is_empty() {
            warn!("No evaluated genomes left in generation {}; refilling with new genomes", generation);
            open
        } else {
            ((open as f64 * evolution.immigrant_rate).round() as usize).min(open)
        };
        let mut offspring = if parents.is_empty() {
            Vec::new()
        } else {
            self.operators
                .breed(&parents, open - immigrants, next_generation, &mut ids, &mut rng)?
        };
        drop(parents);

        for _ in 0..immigrants {
            let genes = self.generator.generate(&mut rng)?;
            offspring.push(Genome::new(ids.next_id(), next_generation, Vec::new(), genes));
        }
        debug!(
            "Generation {}: {} elite, {} offspring ({} immigrants)",
            next_generation,
            elite.len(),
            offspring.len(),
            immigrants
        );

        self.state = EngineState::Advance;
        *run.population.ids_mut() = ids;
        run.population.advance(elite, offspring, &self.operators, &mut rng)
    }

    fn save_checkpoint<C: ProgressCallback>(&mut self, run: &mut RunState, callback: &mut C) -> Result<()> {
        let store = match self.checkpoints.as_mut() {
            Some(store) => store,
            None => return Ok(()),
        };
        self.state = EngineState::Checkpoint;

        let generation = run.population.generation();
        let checkpoint = Checkpoint::new(
            run.run_seed,
            run.population.checkpoint(),
            self.config.clone(),
            run.progress.clone(),
            run.hall_of_fame.clone(),
        );

        let saved = match store.save(&checkpoint) {
            Ok(path) => Ok(path),
            Err(first) => {
                warn!("Checkpoint for generation {} failed ({}), retrying", generation, first);
                store.save(&checkpoint)
            }
        };

        match saved {
            Ok(path) => {
                callback.on_checkpoint(generation, &path);
                run.last_checkpoint = Some(path);
                Ok(())
            }
            Err(e) if self.config.checkpoint.fatal_on_failure => Err(e),
            Err(e) => {
                error!("Checkpoint for generation {} not written: {}", generation, e);
                Ok(())
            }
        }
    }
}

fn abort(generation: u32, source: EvolutionError, last_checkpoint: Option<PathBuf>) -> EvolutionError {
    if let Some(path) = &last_checkpoint {
        error!("Run aborted; last good checkpoint is {}", path.display());
    }
    EvolutionError::RunAborted {
        generation,
        source: Box::new(source),
        last_checkpoint,
    }
}
