pub mod traits;
pub mod evolution;
pub mod genome;
pub mod fitness;
pub mod evaluation;
pub mod checkpoint;
pub mod manager;

pub use manager::{AppConfig, ConfigManager};
pub use evolution::{CrossoverMethod, EvolutionConfig, SelectionMethod};
pub use genome::GenomeConfig;
pub use fitness::{Bounds, FitnessConfig, MetricBounds, MetricWeights};
pub use evaluation::{CancelPolicy, EvaluationConfig};
pub use checkpoint::CheckpointConfig;
