use super::{Action, Pos};

/// A single cell of the grid and its learning state
///
/// Q-values live in a fixed-size array indexed by [`Action::index`]. Only the actions returned by
/// [`State::actions`] are meaningful: [`Action::Exit`] on a terminal cell, the four directions
/// everywhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pos: Pos,
    q_values: [f64; Action::COUNT],
    /// The max over the supported Q-values, as of the last value-iteration sweep
    pub value: f64,
    /// The action attaining [`State::value`], `None` until a sweep has set it
    pub best_action: Option<Action>,
    /// Cost (or reward) of a step taken from this cell
    pub reward: f64,
    /// Payoff for taking [`Action::Exit`], meaningful only on terminal cells
    pub terminal_reward: f64,
    is_terminal: bool,
    is_boulder: bool,
}

impl State {
    pub(crate) fn new(pos: Pos, reward: f64) -> Self {
        Self {
            pos,
            q_values: [0.0; Action::COUNT],
            value: 0.0,
            best_action: None,
            reward,
            terminal_reward: 0.0,
            is_terminal: false,
            is_boulder: false,
        }
    }

    pub(crate) fn make_terminal(&mut self, payoff: f64) {
        self.is_terminal = true;
        self.terminal_reward = payoff;
        self.q_values = [0.0; Action::COUNT];
    }

    pub(crate) fn make_boulder(&mut self) {
        self.is_boulder = true;
    }

    pub fn pos(&self) -> Pos {
        self.pos
    }

    pub fn row(&self) -> usize {
        self.pos.0
    }

    pub fn col(&self) -> usize {
        self.pos.1
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    pub fn is_boulder(&self) -> bool {
        self.is_boulder
    }

    /// The actions this cell supports, in enumeration order
    pub fn actions(&self) -> &'static [Action] {
        if self.is_terminal {
            &Action::EXIT_ONLY
        } else {
            &Action::DIRECTIONS
        }
    }

    pub fn supports(&self, action: Action) -> bool {
        (action == Action::Exit) == self.is_terminal
    }

    /// Get the Q-value of an action, or `None` if the cell does not support it
    pub fn q_value(&self, action: Action) -> Option<f64> {
        self.supports(action).then(|| self.q_values[action.index()])
    }

    /// Overwrite the Q-value of a supported action
    ///
    /// **Panics** if the cell does not support `action`
    pub(crate) fn set_q_value(&mut self, action: Action, value: f64) {
        assert!(
            self.supports(action),
            "{action} is not a valid action for the cell {:?}",
            self.pos
        );
        self.q_values[action.index()] = value;
    }

    /// Iterate over the supported `(action, q_value)` pairs in enumeration order
    pub fn q_values(&self) -> impl Iterator<Item = (Action, f64)> + '_ {
        self.actions()
            .iter()
            .map(|&a| (a, self.q_values[a.index()]))
    }

    /// The highest Q-value and the first action in enumeration order attaining it
    pub fn best_q_value(&self) -> (f64, Option<Action>) {
        self.q_values()
            .fold((f64::NEG_INFINITY, None), |(max, best), (a, q)| {
                if q > max {
                    (q, Some(a))
                } else {
                    (max, best)
                }
            })
    }

    /// Every supported action whose Q-value equals the maximum
    pub fn best_actions(&self) -> Vec<Action> {
        let (max, _) = self.best_q_value();
        self.q_values()
            .filter(|&(_, q)| q == max)
            .map(|(a, _)| a)
            .collect()
    }
}
