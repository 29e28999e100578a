pub mod catalog;
pub mod diversity;
pub mod evolution_engine;
pub mod generator;
pub mod genome;
pub mod hall_of_fame;
pub mod operators;
pub mod population;
pub mod progress;
pub mod stats;

pub use catalog::{IndicatorCatalog, IndicatorSpec, ParamSpec};
pub use evolution_engine::{
    EngineState, EvolutionEngine, RunSummary, TerminationReason, DEFAULT_HALL_OF_FAME_SIZE,
};
pub use generator::{GenomeGenerator, RandomGenomeGenerator};
pub use genome::{
    BoundedParam, Comparator, Condition, ConditionSide, Connective, GeneViolation, Genes, Genome,
    IndicatorGene, IndicatorKind, Operand,
};
pub use hall_of_fame::{EliteRecord, HallOfFame};
pub use operators::GeneticOperators;
pub use population::{Population, PopulationSnapshot};
pub use progress::{
    ChannelProgressCallback, LogProgressCallback, NoProgress, ProgressCallback, ProgressMessage,
};
pub use stats::{EvaluationTally, GenerationStats};
