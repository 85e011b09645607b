use log::trace;

use crate::{
    grid::{Action, Grid, Pos},
    query::{Query, QueryAnswer, QueryKind},
};

use super::{Agent, AgentKind, AgentReport};

/// A value iteration agent
///
/// Applies synchronous Bellman backups to every open cell of the grid it owns. The full model is
/// known: each directional action reaches its intended cell with probability `1 - noise` and
/// drifts to each lateral neighbour with probability `noise / 2`. Sweeps run only when the caller
/// asks for them, there is no built-in stopping rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueIterationAgent {
    grid: Grid,
    curr_iteration: u32,
    max_display_val: f64,
    max_delta: f64,
}

impl ValueIterationAgent {
    /// Initialize a new `ValueIterationAgent` that takes ownership of `grid`
    pub fn new(grid: Grid) -> Self {
        let max_display_val = grid.max_terminal_val();
        Self {
            grid,
            curr_iteration: 0,
            max_display_val,
            max_delta: f64::INFINITY,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Give the grid back, consuming the agent
    pub fn into_grid(self) -> Grid {
        self.grid
    }

    /// Completed sweeps
    pub fn curr_iteration(&self) -> u32 {
        self.curr_iteration
    }

    pub fn max_display_val(&self) -> f64 {
        self.max_display_val
    }

    /// Largest change of any cell's value during the last sweep, infinite before the first one
    pub fn max_delta(&self) -> f64 {
        self.max_delta
    }

    /// Expected return of taking `action` at `pos`, read from the current values
    fn q_value(&self, pos: Pos, action: Action) -> f64 {
        let (discount, noise) = (self.grid.discount(), self.grid.noise());
        action
            .outcomes(noise)
            .into_iter()
            .map(|(a, prob)| {
                let dest = self.grid.state(self.grid.destination(pos, a));
                prob * (dest.reward + discount * dest.value)
            })
            .sum()
    }

    /// Run one synchronous sweep over the whole grid
    ///
    /// New Q-values are computed for every cell from the values of the previous sweep before any
    /// value is overwritten. Terminal cells keep their single exit Q-value pinned to the payoff.
    pub fn iterate_values(&mut self) {
        let staged = self
            .grid
            .states()
            .iter()
            .filter(|s| !s.is_boulder())
            .map(|s| {
                let q_values = if s.is_terminal() {
                    vec![(Action::Exit, s.terminal_reward)]
                } else {
                    s.actions()
                        .iter()
                        .map(|&a| (a, self.q_value(s.pos(), a)))
                        .collect()
                };
                (s.pos(), q_values)
            })
            .collect::<Vec<_>>();

        let mut max_delta = 0.0_f64;
        let mut max_q = self.max_display_val;
        for (pos, q_values) in staged {
            let state = self.grid.state_mut(pos);
            for (action, q) in q_values {
                state.set_q_value(action, q);
                max_q = max_q.max(q.abs());
            }

            let (value, best_action) = state.best_q_value();
            max_delta = max_delta.max((value - state.value).abs());
            state.value = value;
            state.best_action = best_action;
        }

        self.max_delta = max_delta;
        self.max_display_val = max_q;
        self.curr_iteration += 1;
        trace!(
            "Sweep {} done, max delta {max_delta}",
            self.curr_iteration
        );
    }

    /// Run `n` sweeps
    pub fn iterate(&mut self, n: u32) {
        for _ in 0..n {
            self.iterate_values();
        }
    }
}

impl Agent for ValueIterationAgent {
    fn step(&mut self) {
        self.iterate_values();
    }

    fn progress(&self) -> u32 {
        self.curr_iteration
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn report(&self) -> AgentReport {
        AgentReport::new(
            AgentKind::ValueIteration {
                iteration: self.curr_iteration,
            },
            &self.grid,
            self.max_display_val,
        )
    }

    fn answer(&mut self, query: Query) -> QueryAnswer {
        let state = self.grid.state(query.pos);
        match query.kind {
            QueryKind::StateValue | QueryKind::BestQValue => QueryAnswer::Value(state.value),
            QueryKind::BestPolicy => QueryAnswer::Policy(state.best_action),
        }
    }
}
