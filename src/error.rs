use crate::grid::{Action, Pos};

/// Errors raised while building a [`Grid`](crate::grid::Grid) or driving an agent over it
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridError {
    #[error("grid must have at least one row and one column, got {rows}x{cols}")]
    EmptyGrid { rows: usize, cols: usize },

    #[error("{what} at {pos:?} lies outside the {rows}x{cols} grid")]
    OutOfBounds {
        what: &'static str,
        pos: Pos,
        rows: usize,
        cols: usize,
    },

    #[error("cell {0:?} is declared both terminal and boulder")]
    Overlap(Pos),

    #[error("robot start location {0:?} is a boulder")]
    StartOnBoulder(Pos),

    #[error("invalid value for `{name}`: {value}, must be in the interval {interval}")]
    ParameterOutOfRange {
        name: &'static str,
        value: f64,
        interval: &'static str,
    },

    #[error("{action} is not a valid action for the cell {pos:?}")]
    InvalidAction { action: Action, pos: Pos },

    #[error("no snapshot was taken at {number}, it lies beyond what the run reached")]
    MissingSnapshot { number: u32 },

    #[error("malformed query on line {line}: {reason}")]
    MalformedQuery { line: usize, reason: String },
}
