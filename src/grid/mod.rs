mod action;
mod state;

pub use action::Action;
pub use state::State;

use log::debug;

use crate::error::GridError;

/// `(row, col)` coordinates of a cell
pub type Pos = (usize, usize);

/// Parameters a [`Grid`] is built from
///
/// Produced by whatever loads the grid description. Every field is public so a loader can fill it
/// in directly; [`Grid::new`] validates it.
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub num_rows: usize,
    pub num_cols: usize,
    /// `(row, col, payoff)` triples
    pub terminals: Vec<(usize, usize, f64)>,
    /// `(row, col)` pairs of impassable cells
    pub boulders: Vec<Pos>,
    pub robot_start: Pos,
    /// Discount factor, must be in `[0, 1]`
    pub discount: f64,
    /// Lateral drift for value iteration, exploration rate for Q-learning, must be in `[0, 1]`
    pub noise: f64,
    /// Learning rate for Q-learning, must be in `(0, 1]`
    pub alpha: f64,
    /// Reward of every step
    pub transition_cost: f64,
    /// Value-iteration budget
    pub iterations: u32,
    /// Q-learning budget
    pub episodes: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            num_rows: 3,
            num_cols: 4,
            terminals: vec![(2, 3, 1.0), (1, 3, -1.0)],
            boulders: vec![(1, 1)],
            robot_start: (0, 0),
            discount: 0.9,
            noise: 0.2,
            alpha: 0.5,
            transition_cost: 0.0,
            iterations: 100,
            episodes: 1000,
        }
    }
}

impl GridConfig {
    fn check_pos(&self, what: &'static str, pos: Pos) -> Result<(), GridError> {
        if pos.0 < self.num_rows && pos.1 < self.num_cols {
            Ok(())
        } else {
            Err(GridError::OutOfBounds {
                what,
                pos,
                rows: self.num_rows,
                cols: self.num_cols,
            })
        }
    }

    /// Check the configuration describes a structurally valid grid
    pub fn validate(&self) -> Result<(), GridError> {
        if self.num_rows == 0 || self.num_cols == 0 {
            return Err(GridError::EmptyGrid {
                rows: self.num_rows,
                cols: self.num_cols,
            });
        }

        check_interval("discount", self.discount, 0.0, 1.0, true, "[0, 1]")?;
        check_interval("noise", self.noise, 0.0, 1.0, true, "[0, 1]")?;
        check_interval("alpha", self.alpha, 0.0, 1.0, false, "(0, 1]")?;

        for &(row, col, _) in &self.terminals {
            self.check_pos("terminal", (row, col))?;
        }
        for &pos in &self.boulders {
            self.check_pos("boulder", pos)?;
            if self.terminals.iter().any(|&(r, c, _)| (r, c) == pos) {
                return Err(GridError::Overlap(pos));
            }
        }

        self.check_pos("robot start", self.robot_start)?;
        if self.boulders.contains(&self.robot_start) {
            return Err(GridError::StartOnBoulder(self.robot_start));
        }

        Ok(())
    }
}

fn check_interval(
    name: &'static str,
    value: f64,
    lo: f64,
    hi: f64,
    lo_inclusive: bool,
    interval: &'static str,
) -> Result<(), GridError> {
    let above_lo = if lo_inclusive { value >= lo } else { value > lo };
    if above_lo && value <= hi {
        Ok(())
    } else {
        Err(GridError::ParameterOutOfRange {
            name,
            value,
            interval,
        })
    }
}

/// A rectangular grid-world MDP
///
/// Owns a dense row-major array of [`State`]s plus the global MDP parameters and the robot's
/// position. Cells are never added or removed after construction; agents mutate them in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    num_rows: usize,
    num_cols: usize,
    states: Vec<State>,
    discount: f64,
    noise: f64,
    alpha: f64,
    transition_cost: f64,
    iterations: u32,
    episodes: u32,
    robot_start_location: Pos,
    robot_curr_location: Pos,
    max_terminal_val: f64,
}

impl Grid {
    /// Build a grid from a validated configuration
    pub fn new(config: GridConfig) -> Result<Self, GridError> {
        config.validate()?;

        let GridConfig {
            num_rows,
            num_cols,
            terminals,
            boulders,
            robot_start,
            discount,
            noise,
            alpha,
            transition_cost,
            iterations,
            episodes,
        } = config;

        let mut states = (0..num_rows * num_cols)
            .map(|i| State::new((i / num_cols, i % num_cols), transition_cost))
            .collect::<Vec<_>>();

        let mut max_terminal_val = 0.0_f64;
        for &(row, col, payoff) in &terminals {
            states[row * num_cols + col].make_terminal(payoff);
            max_terminal_val = max_terminal_val.max(payoff.abs());
        }
        for &(row, col) in &boulders {
            states[row * num_cols + col].make_boulder();
        }

        debug!(
            "Built {num_rows}x{num_cols} grid with {} terminals and {} boulders",
            terminals.len(),
            boulders.len()
        );

        Ok(Self {
            num_rows,
            num_cols,
            states,
            discount,
            noise,
            alpha,
            transition_cost,
            iterations,
            episodes,
            robot_start_location: robot_start,
            robot_curr_location: robot_start,
            max_terminal_val,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn noise(&self) -> f64 {
        self.noise
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn transition_cost(&self) -> f64 {
        self.transition_cost
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn episodes(&self) -> u32 {
        self.episodes
    }

    /// Largest terminal payoff magnitude, for normalizing displayed values
    pub fn max_terminal_val(&self) -> f64 {
        self.max_terminal_val
    }

    pub fn robot_start_location(&self) -> Pos {
        self.robot_start_location
    }

    pub fn robot_curr_location(&self) -> Pos {
        self.robot_curr_location
    }

    pub fn set_robot_location(&mut self, pos: Pos) {
        self.robot_curr_location = pos;
    }

    /// Put the robot back on its start location
    pub fn reset_robot(&mut self) {
        self.robot_curr_location = self.robot_start_location;
    }

    pub fn contains(&self, (row, col): Pos) -> bool {
        row < self.num_rows && col < self.num_cols
    }

    /// Whether `pos` is inside the grid and not a boulder
    pub fn is_open(&self, pos: Pos) -> bool {
        self.contains(pos) && !self.state(pos).is_boulder()
    }

    /// Get the cell at `pos`
    ///
    /// **Panics** if `pos` is outside the grid
    pub fn state(&self, (row, col): Pos) -> &State {
        assert!(
            self.contains((row, col)),
            "{:?} is outside the grid",
            (row, col)
        );
        &self.states[row * self.num_cols + col]
    }

    /// Get the cell at `pos` mutably
    ///
    /// **Panics** if `pos` is outside the grid
    pub fn state_mut(&mut self, (row, col): Pos) -> &mut State {
        assert!(
            self.contains((row, col)),
            "{:?} is outside the grid",
            (row, col)
        );
        &mut self.states[row * self.num_cols + col]
    }

    /// All cells in row-major order
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Iterate over the grid one row at a time
    pub fn rows(&self) -> impl Iterator<Item = &[State]> {
        self.states.chunks(self.num_cols)
    }

    /// Resolve where `action` taken at `pos` leads
    ///
    /// Moves that leave the grid or run into a boulder bounce back to `pos`. [`Action::Exit`] stays
    /// in place.
    pub fn destination(&self, (row, col): Pos, action: Action) -> Pos {
        let Some((dr, dc)) = action.delta() else {
            return (row, col);
        };
        match (row.checked_add_signed(dr), col.checked_add_signed(dc)) {
            (Some(r), Some(c)) if self.is_open((r, c)) => (r, c),
            _ => (row, col),
        }
    }

    /// Map every action the cell at `pos` supports to the cell it leads to
    pub fn find_possible_states(&self, pos: Pos) -> Vec<(Action, Pos)> {
        self.state(pos)
            .actions()
            .iter()
            .map(|&a| (a, self.destination(pos, a)))
            .collect()
    }
}
