pub mod collaborators;
pub mod dispatcher;
pub mod fitness;

pub use collaborators::{
    EvaluationFailure, EvaluationRequest, PassthroughSynthesizer, StrategyArtifact,
    StrategyEvaluator, StrategySynthesizer,
};
pub use dispatcher::{DispatchReport, EvaluationDispatcher, EvaluationJob, EvaluationOutcome};
pub use fitness::{FitnessComponents, FitnessEvaluator, FitnessScore};
