use strum::{Display, EnumIter, EnumString, VariantArray};

/// A move the robot can make from a cell
///
/// The declaration order is the enumeration order used for deterministic tie-breaking.
#[derive(
    EnumIter, VariantArray, Display, EnumString, Clone, Copy, Debug, Hash, PartialEq, Eq,
)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    North = 0,
    East = 1,
    West = 2,
    South = 3,
    Exit = 4,
}

impl Action {
    /// Number of variants, the length of a per-cell Q-value array
    pub const COUNT: usize = 5;

    /// Actions available on every non-terminal cell
    pub const DIRECTIONS: [Action; 4] = [Action::North, Action::East, Action::West, Action::South];

    /// Actions available on a terminal cell
    pub const EXIT_ONLY: [Action; 1] = [Action::Exit];

    /// Position of the action in a fixed-size Q-value array
    pub fn index(self) -> usize {
        self as usize
    }

    /// Unit `(row, col)` offset applied by a directional move, `None` for [`Action::Exit`]
    pub fn delta(self) -> Option<(isize, isize)> {
        match self {
            Action::North => Some((1, 0)),
            Action::East => Some((0, 1)),
            Action::West => Some((0, -1)),
            Action::South => Some((-1, 0)),
            Action::Exit => None,
        }
    }

    /// The actions perpendicular to this one, where the robot drifts to under noise
    pub fn lateral(self) -> &'static [Action] {
        match self {
            Action::North | Action::South => &[Action::West, Action::East],
            Action::East | Action::West => &[Action::North, Action::South],
            Action::Exit => &Self::EXIT_ONLY,
        }
    }

    /// Probability-weighted outcomes of attempting this action
    ///
    /// The intended action keeps `1 - noise` of the mass and each lateral action receives
    /// `noise / 2`.
    /// [`Action::Exit`] is deterministic and has the single outcome `(Exit, 1.0)`.
    pub fn outcomes(self, noise: f64) -> Vec<(Action, f64)> {
        if self == Action::Exit {
            return vec![(Action::Exit, 1.0)];
        }

        let mut outcomes = Vec::with_capacity(3);
        outcomes.push((self, 1.0 - noise));
        outcomes.extend(self.lateral().iter().map(|&n| (n, noise / 2.0)));
        outcomes
    }
}
