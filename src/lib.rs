/// Value iteration and Q-learning agents
pub mod algo;

/// Error types
pub mod error;

/// Exploration policies
pub mod exploration;

/// The grid-world MDP: cells, actions, and transition resolution
pub mod grid;

/// Per-cell queries and snapshot-taking drivers
pub mod query;

mod util;

pub use algo::{Agent, AgentKind, AgentReport, QLearningAgent, ValueIterationAgent};
pub use error::GridError;
pub use grid::{Action, Grid, GridConfig, Pos, State};
