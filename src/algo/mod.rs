pub mod q_learning;
pub mod value_iteration;

use std::fmt;

pub use q_learning::QLearningAgent;
pub use value_iteration::ValueIterationAgent;

use crate::{
    grid::Grid,
    query::{Query, QueryAnswer},
};

/// A solver driven one unit of work at a time over a grid it owns
///
/// Snapshots are taken with [`Clone`], which deep-copies the agent together with its grid.
pub trait Agent: Clone {
    /// Perform one unit of work: a sweep for value iteration, a single step for Q-learning
    fn step(&mut self);

    /// Completed sweeps or episodes
    fn progress(&self) -> u32;

    fn grid(&self) -> &Grid;

    /// Summarize the agent for display
    fn report(&self) -> AgentReport;

    /// Answer a question about one cell
    ///
    /// **Panics** if the queried cell is outside the grid
    fn answer(&mut self, query: Query) -> QueryAnswer;
}

/// Which solver produced a report, with the data only that solver has
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentKind {
    ValueIteration { iteration: u32 },
    QLearning { episode: u32, alpha: f64 },
}

/// What a renderer needs to label and color a grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentReport {
    pub kind: AgentKind,
    pub discount: f64,
    pub noise: f64,
    pub transition_cost: f64,
    /// Largest magnitude seen so far, for normalizing colors
    pub max_display_val: f64,
}

impl AgentReport {
    pub(crate) fn new(kind: AgentKind, grid: &Grid, max_display_val: f64) -> Self {
        Self {
            kind,
            discount: grid.discount(),
            noise: grid.noise(),
            transition_cost: grid.transition_cost(),
            max_display_val,
        }
    }
}

impl fmt::Display for AgentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AgentKind::ValueIteration { iteration } => {
                write!(f, "Values after {iteration} iterations")?
            }
            AgentKind::QLearning { episode, .. } => {
                write!(f, "Q-values after {episode} episodes")?
            }
        }
        write!(
            f,
            " | Discount: {} Cost: {} Noise: {}",
            self.discount, self.transition_cost, self.noise
        )?;
        if let AgentKind::QLearning { alpha, .. } = self.kind {
            write!(f, " Alpha: {alpha}")?;
        }
        Ok(())
    }
}
