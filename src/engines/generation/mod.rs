pub mod attention;
pub mod checkpoint;
pub mod generator;
pub mod hall_of_fame;
pub mod progress;
pub mod trainer;

pub use generator::{AlphaGenerator, GeneratorConfig, TrainingBatch};
pub use hall_of_fame::{EliteFormula, HallOfFame};
pub use progress::{
    ChannelProgressCallback, ConsoleProgressCallback, ProgressCallback, ProgressMessage,
    SilentProgressCallback,
};
pub use trainer::{AlphaTrainer, CandidateScorer, ScoredCandidate, TrainingResult};
