use std::{collections::BTreeMap, fmt, str::FromStr};

use log::{debug, warn};
use strum::{Display, EnumString};

use crate::{
    algo::{Agent, QLearningAgent, ValueIterationAgent},
    error::GridError,
    grid::{Action, Pos},
};

/// What a caller wants to know about a cell
#[derive(EnumString, Display, Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[strum(serialize_all = "camelCase")]
pub enum QueryKind {
    StateValue,
    BestQValue,
    BestPolicy,
}

/// A question about one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    pub pos: Pos,
    pub kind: QueryKind,
}

impl Query {
    pub fn new(pos: Pos, kind: QueryKind) -> Self {
        Self { pos, kind }
    }
}

/// The answer to a [`Query`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryAnswer {
    Value(f64),
    Policy(Option<Action>),
}

impl fmt::Display for QueryAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryAnswer::Value(v) => write!(f, "{v:.2}"),
            QueryAnswer::Policy(Some(a)) => write!(f, "{a}"),
            QueryAnswer::Policy(None) => write!(f, "none"),
        }
    }
}

/// Queries keyed by the iteration or episode number after which they should be answered
pub type Schedule = BTreeMap<u32, Vec<Query>>;

/// Which solver a scheduled query belongs to
#[derive(EnumString, Display, Clone, Copy, Debug, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum Solver {
    #[strum(serialize = "mdp")]
    ValueIteration,
    #[strum(serialize = "rl")]
    QLearning,
}

/// One line of a query file: `row,col,number,mdp|rl,query`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledQuery {
    pub query: Query,
    pub number: u32,
    pub solver: Solver,
}

impl FromStr for ScheduledQuery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s.split(',').map(str::trim).collect::<Vec<_>>();
        let &[row, col, number, solver, kind] = fields.as_slice() else {
            return Err(format!("expected 5 comma-separated fields, got {}", fields.len()));
        };

        let row = row.parse().map_err(|e| format!("row `{row}`: {e}"))?;
        let col = col.parse().map_err(|e| format!("col `{col}`: {e}"))?;
        let number = number
            .parse()
            .map_err(|e| format!("number `{number}`: {e}"))?;
        let solver = solver
            .parse()
            .map_err(|_| format!("unknown solver `{solver}`, expected `mdp` or `rl`"))?;
        let kind = kind.parse().map_err(|_| format!("unknown query `{kind}`"))?;

        Ok(Self {
            query: Query::new((row, col), kind),
            number,
            solver,
        })
    }
}

/// Split a query file into value-iteration and Q-learning schedules
///
/// Blank lines are skipped. **Returns** `(mdp, rl)`.
pub fn parse_schedules(text: &str) -> Result<(Schedule, Schedule), GridError> {
    let mut mdp = Schedule::new();
    let mut rl = Schedule::new();

    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let scheduled = line
            .parse::<ScheduledQuery>()
            .map_err(|reason| GridError::MalformedQuery { line: i + 1, reason })?;
        let schedule = match scheduled.solver {
            Solver::ValueIteration => &mut mdp,
            Solver::QLearning => &mut rl,
        };
        schedule
            .entry(scheduled.number)
            .or_default()
            .push(scheduled.query);
    }

    Ok((mdp, rl))
}

/// Step `agent` until its progress counter reaches `budget`, deep-copying it whenever the counter
/// first hits a scheduled number
fn drive<A: Agent>(
    agent: &mut A,
    budget: u32,
    schedule: &Schedule,
    max_steps: u64,
) -> BTreeMap<u32, A> {
    let mut snapshots = BTreeMap::new();
    if schedule.contains_key(&agent.progress()) {
        snapshots.insert(agent.progress(), agent.clone());
    }

    let mut steps = 0;
    while agent.progress() < budget {
        if steps == max_steps {
            warn!("Stopped after {steps} steps at progress {} of {budget}", agent.progress());
            break;
        }
        agent.step();
        steps += 1;

        let progress = agent.progress();
        if schedule.contains_key(&progress) && !snapshots.contains_key(&progress) {
            debug!("Snapshot at {progress}");
            snapshots.insert(progress, agent.clone());
        }
    }

    snapshots
}

/// Run value iteration for the grid's iteration budget, snapshotting the agent after every
/// scheduled sweep count
pub fn run_value_iteration(
    agent: &mut ValueIterationAgent,
    schedule: &Schedule,
) -> BTreeMap<u32, ValueIterationAgent> {
    let budget = agent.grid().iterations();
    drive(agent, budget, schedule, u64::from(budget))
}

/// Run Q-learning for the grid's episode budget, snapshotting the agent when each scheduled
/// episode count is first reached
///
/// `max_steps` bounds the number of single steps, guarding against grids the robot can never exit.
pub fn run_q_learning<R>(
    agent: &mut QLearningAgent<R>,
    schedule: &Schedule,
    max_steps: u64,
) -> BTreeMap<u32, QLearningAgent<R>>
where
    R: rand::Rng + Clone,
{
    let budget = agent.grid().episodes();
    drive(agent, budget, schedule, max_steps)
}

/// Answer every scheduled query against its matching snapshot
///
/// **Returns** [`GridError::MissingSnapshot`] if a scheduled number was never reached, or
/// [`GridError::OutOfBounds`] if a query names a cell outside the grid
pub fn answer_all<A: Agent>(
    snapshots: &mut BTreeMap<u32, A>,
    schedule: &Schedule,
) -> Result<Vec<(u32, Query, QueryAnswer)>, GridError> {
    let mut answers = Vec::new();
    for (&number, queries) in schedule {
        let agent = snapshots
            .get_mut(&number)
            .ok_or(GridError::MissingSnapshot { number })?;
        for &query in queries {
            let grid = agent.grid();
            if !grid.contains(query.pos) {
                return Err(GridError::OutOfBounds {
                    what: "query",
                    pos: query.pos,
                    rows: grid.num_rows(),
                    cols: grid.num_cols(),
                });
            }
            answers.push((number, query, agent.answer(query)));
        }
    }
    Ok(answers)
}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;

    use super::*;
    use crate::grid::{tests::corridor, Grid, GridConfig};

    #[test]
    fn parses_query_lines() {
        let text = "0,0,5,mdp,stateValue\n\n0,1,5,MDP,bestPolicy\n0,0,100,rl,bestQValue\n";
        let (mdp, rl) = parse_schedules(text).unwrap();

        assert_eq!(mdp.len(), 1, "both mdp queries share number 5");
        assert_eq!(
            mdp[&5],
            [
                Query::new((0, 0), QueryKind::StateValue),
                Query::new((0, 1), QueryKind::BestPolicy)
            ]
        );
        assert_eq!(rl[&100], [Query::new((0, 0), QueryKind::BestQValue)]);
    }

    #[test]
    fn reports_malformed_line_number() {
        let err = parse_schedules("0,0,1,mdp,stateValue\n0,0,1,mdp,bestValue").unwrap_err();
        assert!(matches!(err, GridError::MalformedQuery { line: 2, .. }));

        let err = parse_schedules("0,0,mdp,stateValue").unwrap_err();
        assert!(matches!(err, GridError::MalformedQuery { line: 1, .. }));

        let err = parse_schedules("0,0,1,td,stateValue").unwrap_err();
        assert!(matches!(err, GridError::MalformedQuery { line: 1, .. }));
    }

    #[test]
    fn value_iteration_snapshots_follow_schedule() {
        let mut agent = ValueIterationAgent::new(corridor());
        let schedule = Schedule::from([
            (1, vec![Query::new((0, 1), QueryKind::StateValue)]),
            (50, vec![Query::new((0, 0), QueryKind::BestPolicy)]),
        ]);

        let mut snapshots = run_value_iteration(&mut agent, &schedule);
        assert_eq!(agent.curr_iteration(), 100, "ran the full budget");
        assert_eq!(snapshots.keys().copied().collect::<Vec<_>>(), [1, 50]);
        assert_eq!(snapshots[&1].curr_iteration(), 1);

        // after one sweep every neighbour still reads pre-sweep zeros
        assert_float_eq!(snapshots[&1].grid().state((0, 1)).value, -1.0, abs <= 1e-9);

        let answers = answer_all(&mut snapshots, &schedule).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[1].2, QueryAnswer::Policy(Some(Action::East)));
    }

    #[test]
    fn q_learning_snapshots_on_episode_boundaries() {
        let grid = Grid::new(GridConfig {
            episodes: 20,
            ..corridor_config()
        })
        .unwrap();
        let mut agent = QLearningAgent::with_seed(grid, 3);
        let schedule = Schedule::from([
            (0, vec![]),
            (10, vec![Query::new((0, 1), QueryKind::BestQValue)]),
        ]);

        let snapshots = run_q_learning(&mut agent, &schedule, 1_000_000);
        assert_eq!(agent.curr_episode(), 20);
        assert_eq!(snapshots[&0].curr_episode(), 0, "initial state captured");
        assert_eq!(snapshots[&10].curr_episode(), 10);
        assert_eq!(
            snapshots[&10].grid().robot_curr_location(),
            (0, 0),
            "snapshot taken right after an exit"
        );
    }

    #[test]
    fn step_cap_stops_unexitable_grids() {
        let grid = Grid::new(GridConfig {
            terminals: vec![],
            ..corridor_config()
        })
        .unwrap();
        let mut agent = QLearningAgent::with_seed(grid, 1);
        let snapshots = run_q_learning(&mut agent, &Schedule::new(), 500);
        assert!(snapshots.is_empty());
        assert_eq!(agent.curr_episode(), 0);
    }

    #[test]
    fn rejects_queries_outside_the_grid() {
        let (mdp, _) = parse_schedules("9,9,1,mdp,stateValue").unwrap();
        let mut agent = ValueIterationAgent::new(corridor());
        let mut snapshots = run_value_iteration(&mut agent, &mdp);

        assert_eq!(
            answer_all(&mut snapshots, &mdp),
            Err(GridError::OutOfBounds {
                what: "query",
                pos: (9, 9),
                rows: 1,
                cols: 3
            })
        );
    }

    #[test]
    fn reports_numbers_past_the_budget() {
        let (mdp, _) = parse_schedules("0,0,5,mdp,stateValue\n0,0,500,mdp,stateValue").unwrap();
        let mut agent = ValueIterationAgent::new(corridor());
        let mut snapshots = run_value_iteration(&mut agent, &mdp);

        assert_eq!(snapshots.keys().copied().collect::<Vec<_>>(), [5]);
        assert_eq!(
            answer_all(&mut snapshots, &mdp),
            Err(GridError::MissingSnapshot { number: 500 })
        );
    }

    #[test]
    fn reports_episodes_the_step_cap_never_reaches() {
        let grid = Grid::new(GridConfig {
            terminals: vec![],
            ..corridor_config()
        })
        .unwrap();
        let mut agent = QLearningAgent::with_seed(grid, 1);
        let schedule = Schedule::from([(3, vec![Query::new((0, 0), QueryKind::BestPolicy)])]);
        let mut snapshots = run_q_learning(&mut agent, &schedule, 200);

        assert_eq!(
            answer_all(&mut snapshots, &schedule),
            Err(GridError::MissingSnapshot { number: 3 })
        );
    }

    fn corridor_config() -> GridConfig {
        GridConfig {
            num_rows: 1,
            num_cols: 3,
            terminals: vec![(0, 2, 10.0)],
            boulders: vec![],
            robot_start: (0, 0),
            discount: 0.9,
            noise: 0.0,
            alpha: 0.5,
            transition_cost: -1.0,
            iterations: 100,
            episodes: 2000,
        }
    }
}
