//! Surrogate-guided proposer for the fault-injection recommender
//!
//! Combines a random-forest surrogate over the trial history with an
//! Expected Improvement acquisition function. Until enough history exists
//! the proposer cold-starts with uniform samples from the search space.

pub mod acquisition;
pub mod proposer;
pub mod surrogate;

pub use acquisition::{CandidateSelector, ExpectedImprovement};
pub use proposer::{Proposer, ProposerConfig};
pub use surrogate::SurrogateModel;
