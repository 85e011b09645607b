use log::{debug, warn};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::{
    error::GridError,
    exploration::{Choice, EpsilonGreedy},
    grid::{Action, Grid, Pos},
    query::{Query, QueryAnswer, QueryKind},
};

use super::{Agent, AgentKind, AgentReport};

/// A tabular Q-learning agent that learns its grid from direct experience
///
/// The robot walks the grid one step per [`QLearningAgent::q_learn`] call, exploring with
/// probability `noise` and otherwise acting greedily on the Q-values stored in the grid's cells.
/// Taking [`Action::Exit`] ends an episode and puts the robot back on its start location.
///
/// ### Generics
/// - `R` - The random source behind exploration and tie-breaking, seedable for reproducible runs
#[derive(Debug, Clone)]
pub struct QLearningAgent<R = StdRng> {
    grid: Grid,
    exploration: EpsilonGreedy,
    rng: R,
    curr_episode: u32,
    max_display_val: f64,
}

impl QLearningAgent<StdRng> {
    /// Initialize a new `QLearningAgent` seeded from system entropy
    pub fn new(grid: Grid) -> Self {
        Self::with_rng(grid, StdRng::from_entropy())
    }

    /// Initialize a new `QLearningAgent` with a reproducible random source
    pub fn with_seed(grid: Grid, seed: u64) -> Self {
        Self::with_rng(grid, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> QLearningAgent<R> {
    /// Initialize a new `QLearningAgent` that takes ownership of `grid` and draws from `rng`
    ///
    /// The robot starts on the grid's start location.
    pub fn with_rng(mut grid: Grid, rng: R) -> Self {
        grid.reset_robot();
        Self {
            exploration: EpsilonGreedy::new(grid.noise()),
            max_display_val: grid.max_terminal_val(),
            grid,
            rng,
            curr_episode: 0,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Give the grid back, consuming the agent
    pub fn into_grid(self) -> Grid {
        self.grid
    }

    /// Completed episodes
    pub fn curr_episode(&self) -> u32 {
        self.curr_episode
    }

    pub fn max_display_val(&self) -> f64 {
        self.max_display_val
    }

    /// Get the highest Q-value at `pos` and the first action attaining it
    ///
    /// Boulders yield `(0.0, None)`. Every Q-value scanned also raises the display maximum.
    pub fn find_max_q_value(&mut self, pos: Pos) -> (f64, Option<Action>) {
        let state = self.grid.state(pos);
        if state.is_boulder() {
            return (0.0, None);
        }

        let largest = state
            .q_values()
            .map(|(_, q)| q.abs())
            .fold(self.max_display_val, f64::max);
        self.max_display_val = largest;

        state.best_q_value()
    }

    /// Choose an action at `pos` and the cell it leads to
    ///
    /// A single roll decides whether to explore. Exploring picks uniformly among every action the
    /// cell supports; exploiting picks uniformly among the actions with the highest Q-value.
    pub fn get_policy(&mut self, pos: Pos) -> (Action, Pos) {
        let possible = self.grid.find_possible_states(pos);

        let action = match self.exploration.choose(&mut self.rng) {
            Choice::Explore => possible
                .choose(&mut self.rng)
                .map(|&(a, _)| a)
                .expect("Every cell supports at least one action"),
            Choice::Exploit => *self
                .grid
                .state(pos)
                .best_actions()
                .choose(&mut self.rng)
                .expect("Every cell supports at least one action"),
        };

        (action, self.grid.destination(pos, action))
    }

    /// Learn from taking `action` at `pos` and landing on `dest`
    ///
    /// A destination outside the grid or on a boulder is replaced by `pos` itself. The robot is
    /// moved to the destination, or back to its start on [`Action::Exit`].
    ///
    /// **Returns** `Ok(true)` if the robot reached `dest`, `Ok(false)` if it bounced back, or
    /// [`GridError::InvalidAction`] without touching the grid if the cell does not support `action`
    pub fn update(&mut self, pos: Pos, action: Action, dest: Pos) -> Result<bool, GridError> {
        let (dest, moved) = if self.grid.is_open(dest) {
            (dest, true)
        } else {
            (pos, false)
        };

        let state = self.grid.state(pos);
        if !state.supports(action) {
            let err = GridError::InvalidAction { action, pos };
            warn!("{err}");
            return Err(err);
        }

        let sample = if action == Action::Exit {
            let sample = state.terminal_reward;
            self.grid.reset_robot();
            sample
        } else {
            let reward = state.reward;
            let (max_next, _) = self.find_max_q_value(dest);
            self.grid.set_robot_location(dest);
            reward + self.grid.discount() * max_next
        };

        let alpha = self.grid.alpha();
        let state = self.grid.state_mut(pos);
        let q = state.q_value(action).unwrap_or_default();
        state.set_q_value(action, (1.0 - alpha) * q + alpha * sample);

        Ok(moved)
    }

    /// Take one step from the robot's current location and learn from it
    ///
    /// **Returns** the action taken. Taking [`Action::Exit`] completes the episode.
    pub fn q_learn(&mut self) -> Action {
        let pos = self.grid.robot_curr_location();
        let (action, dest) = self.get_policy(pos);

        self.update(pos, action, dest)
            .expect("The policy only yields supported actions");
        self.grid.set_robot_location(dest);

        if action == Action::Exit {
            self.grid.reset_robot();
            self.curr_episode += 1;
            debug!("Episode {} done", self.curr_episode);
        }

        action
    }

    /// Step until the current episode ends or `max_steps` steps have been taken
    ///
    /// **Returns** the number of steps taken
    pub fn run_episode(&mut self, max_steps: usize) -> usize {
        let episode = self.curr_episode;
        let mut steps = 0;
        while self.curr_episode == episode && steps < max_steps {
            self.q_learn();
            steps += 1;
        }
        steps
    }
}

impl<R: Rng + Clone> Agent for QLearningAgent<R> {
    fn step(&mut self) {
        self.q_learn();
    }

    fn progress(&self) -> u32 {
        self.curr_episode
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn report(&self) -> AgentReport {
        AgentReport::new(
            AgentKind::QLearning {
                episode: self.curr_episode,
                alpha: self.grid.alpha(),
            },
            &self.grid,
            self.max_display_val,
        )
    }

    fn answer(&mut self, query: Query) -> QueryAnswer {
        let (max_q, best_action) = self.find_max_q_value(query.pos);
        match query.kind {
            QueryKind::StateValue | QueryKind::BestQValue => QueryAnswer::Value(max_q),
            QueryKind::BestPolicy => QueryAnswer::Policy(best_action),
        }
    }
}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;

    use super::*;
    use crate::{
        algo::ValueIterationAgent,
        grid::{tests::corridor, GridConfig},
    };

    #[test]
    fn corridor_converges_to_value_iteration() {
        let mut agent = QLearningAgent::with_seed(corridor(), 11);
        while agent.curr_episode() < 3000 {
            agent.q_learn();
        }

        assert_eq!(agent.find_max_q_value((0, 0)).1, Some(Action::East));
        assert_eq!(agent.find_max_q_value((0, 1)).1, Some(Action::East));

        let mut planner = ValueIterationAgent::new(corridor());
        planner.iterate(50);
        for c in 0..3 {
            let (learned, _) = agent.find_max_q_value((0, c));
            assert_float_eq!(learned, planner.grid().state((0, c)).value, abs <= 1e-3);
        }
        assert_float_eq!(
            agent.grid().state((0, 1)).q_value(Action::East).unwrap(),
            8.0,
            abs <= 1e-3
        );
    }

    #[test]
    fn exit_ends_episode_and_resets_robot() {
        let mut agent = QLearningAgent::with_seed(corridor(), 5);
        for episode in 1..=20 {
            let mut steps = 0;
            while agent.q_learn() != Action::Exit {
                steps += 1;
                assert_eq!(agent.curr_episode(), episode - 1, "no boundary mid-episode");
                assert!(steps < 10_000, "episode terminates");
            }
            assert_eq!(agent.curr_episode(), episode, "counter moves by exactly one");
            assert_eq!(agent.grid().robot_curr_location(), agent.grid().robot_start_location());
        }
    }

    #[test]
    fn update_applies_temporal_difference() {
        let mut agent = QLearningAgent::with_seed(corridor(), 0);

        assert_eq!(agent.update((0, 2), Action::Exit, (0, 2)), Ok(true));
        assert_eq!(agent.grid().state((0, 2)).q_value(Action::Exit), Some(5.0));
        assert_eq!(agent.grid().robot_curr_location(), (0, 0), "exit resets the robot");

        assert_eq!(agent.update((0, 1), Action::East, (0, 2)), Ok(true));
        // 0.5 * 0 + 0.5 * (-1 + 0.9 * 5)
        assert_float_eq!(
            agent.grid().state((0, 1)).q_value(Action::East).unwrap(),
            1.75,
            abs <= 1e-12
        );
        assert_eq!(agent.grid().robot_curr_location(), (0, 2));
    }

    #[test]
    fn update_bounces_invalid_destinations() {
        let mut agent = QLearningAgent::with_seed(corridor(), 0);
        assert_eq!(agent.update((0, 0), Action::South, (7, 0)), Ok(false));
        assert_eq!(agent.grid().robot_curr_location(), (0, 0));
        // bounced back onto itself: 0.5 * (-1 + 0.9 * 0)
        assert_eq!(agent.grid().state((0, 0)).q_value(Action::South), Some(-0.5));
    }

    #[test]
    fn update_rejects_unsupported_actions() {
        let mut agent = QLearningAgent::with_seed(corridor(), 0);
        let before = agent.grid().clone();

        assert_eq!(
            agent.update((0, 2), Action::West, (0, 1)),
            Err(GridError::InvalidAction {
                action: Action::West,
                pos: (0, 2)
            })
        );
        assert_eq!(
            agent.update((0, 0), Action::Exit, (0, 0)),
            Err(GridError::InvalidAction {
                action: Action::Exit,
                pos: (0, 0)
            })
        );
        assert_eq!(agent.grid(), &before, "grid untouched");
    }

    #[test]
    fn full_noise_explores_every_action() {
        let grid = Grid::new(GridConfig {
            noise: 1.0,
            ..GridConfig::default()
        })
        .unwrap();
        let mut agent = QLearningAgent::with_seed(grid, 9);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..400 {
            let (action, dest) = agent.get_policy((0, 0));
            assert_eq!(dest, agent.grid().destination((0, 0), action));
            seen.insert(action);
        }
        assert_eq!(seen.len(), 4, "all directions explored, not only laterals");
    }

    #[test]
    fn greedy_ties_are_broken_randomly() {
        let mut agent = QLearningAgent::with_seed(corridor(), 21);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..400 {
            seen.insert(agent.get_policy((0, 1)).0);
        }
        assert_eq!(seen.len(), 4, "all-zero Q-values tie");

        agent.update((0, 1), Action::West, (0, 0)).unwrap();
        agent.update((0, 1), Action::North, (0, 1)).unwrap();
        for _ in 0..100 {
            let (action, _) = agent.get_policy((0, 1));
            assert!(matches!(action, Action::East | Action::South));
        }
    }

    #[test]
    fn same_seed_same_trajectory() {
        let mut a = QLearningAgent::with_seed(Grid::new(GridConfig::default()).unwrap(), 77);
        let mut b = QLearningAgent::with_seed(Grid::new(GridConfig::default()).unwrap(), 77);
        for _ in 0..500 {
            assert_eq!(a.q_learn(), b.q_learn());
        }
        assert_eq!(a.grid(), b.grid());
    }

    #[test]
    fn snapshots_are_deep_copies() {
        let mut agent = QLearningAgent::with_seed(corridor(), 4);
        agent.run_episode(1000);
        let snapshot = agent.clone();
        let frozen = snapshot.grid().clone();

        for _ in 0..50 {
            agent.run_episode(1000);
        }
        assert_ne!(agent.grid(), snapshot.grid(), "original kept learning");
        assert_eq!(snapshot.grid(), &frozen, "snapshot unchanged");
        assert_eq!(snapshot.curr_episode(), 1);
        assert_eq!(agent.curr_episode(), 51);
    }

    #[test]
    fn boulder_max_q_is_zero() {
        let mut agent = QLearningAgent::with_seed(Grid::new(GridConfig::default()).unwrap(), 0);
        let before = agent.max_display_val();
        assert_eq!(agent.find_max_q_value((1, 1)), (0.0, None));
        assert_eq!(agent.max_display_val(), before);
    }

    #[test]
    fn report_is_tagged_q_learning() {
        let mut agent = QLearningAgent::with_seed(corridor(), 2);
        agent.run_episode(1000);
        let report = agent.report();
        assert_eq!(
            report.kind,
            AgentKind::QLearning {
                episode: 1,
                alpha: 0.5
            }
        );
        assert!(report.to_string().contains("Alpha: 0.5"));
        assert_eq!(
            agent.answer(Query::new((0, 2), QueryKind::BestPolicy)),
            QueryAnswer::Policy(Some(Action::Exit))
        );
    }
}
