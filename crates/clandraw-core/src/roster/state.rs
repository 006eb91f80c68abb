// Roster state: two teams, the combined draw pool, and the last winners.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::cell::CellValue;
use crate::auth::{AuthError, Grant, Operation};

/// A team as imported from the spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Free-form team tag from the header row.
    pub tag: String,
    /// Member names in import order. Duplicates are kept.
    pub members: Vec<String>,
}

/// A member of the draw pool, tagged with the team it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub name: String,
    pub clan_tag: String,
}

/// The complete roster/draw state.
///
/// `pool` is always team A's members followed by team B's members, each
/// tagged with its team's tag. `winners` is drawn from the pool as it was
/// at the time of the most recent draw, without repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterState {
    pub team_a: Team,
    pub team_b: Team,
    pub pool: Vec<PoolEntry>,
    pub winners: Vec<PoolEntry>,
}

impl RosterState {
    fn rebuild_pool(&mut self) {
        let tagged = |team: &Team| {
            team.members
                .iter()
                .map(|name| PoolEntry {
                    name: name.clone(),
                    clan_tag: team.tag.clone(),
                })
                .collect::<Vec<_>>()
        };
        let mut pool = tagged(&self.team_a);
        pool.extend(tagged(&self.team_b));
        self.pool = pool;
    }
}

/// Exclusive owner of a [`RosterState`].
///
/// All mutations go through `&mut self`; wrap the store in the actor from
/// [`super::store`] to share it between concurrent requests.
#[derive(Debug, Default)]
pub struct RosterStore {
    state: RosterState,
}

impl RosterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only snapshot of the full state.
    pub fn state(&self) -> &RosterState {
        &self.state
    }

    /// Replace both teams from spreadsheet rows and rebuild the pool.
    ///
    /// Row 0 holds the team tags in columns 0 and 1. Each later row may hold
    /// a team A member in column 0 and a team B member in column 1; absent
    /// cells (see [`CellValue::is_present`]) are skipped. Clears winners.
    /// Returns the number of pool entries.
    pub fn import_rows(&mut self, grant: &Grant, rows: &[Vec<CellValue>]) -> Result<usize, AuthError> {
        grant.ensure(Operation::ImportRoster)?;

        let header = rows.first();
        let tag_at = |col: usize| {
            header
                .and_then(|row| row.get(col))
                .map(CellValue::render)
                .unwrap_or_default()
        };
        let mut team_a = Team {
            tag: tag_at(0),
            members: Vec::new(),
        };
        let mut team_b = Team {
            tag: tag_at(1),
            members: Vec::new(),
        };

        for row in rows.iter().skip(1) {
            if let Some(cell) = row.first().filter(|c| c.is_present()) {
                team_a.members.push(cell.render());
            }
            if let Some(cell) = row.get(1).filter(|c| c.is_present()) {
                team_b.members.push(cell.render());
            }
        }

        self.state.team_a = team_a;
        self.state.team_b = team_b;
        self.state.rebuild_pool();
        self.state.winners.clear();

        info!(
            "Imported roster: '{}' ({} members) vs '{}' ({} members), pool size {}",
            self.state.team_a.tag,
            self.state.team_a.members.len(),
            self.state.team_b.tag,
            self.state.team_b.members.len(),
            self.state.pool.len()
        );
        Ok(self.state.pool.len())
    }

    /// Draw winners using the thread-local RNG.
    pub fn draw(&mut self, grant: &Grant, requested: i64) -> Result<Vec<PoolEntry>, AuthError> {
        self.draw_with(grant, requested, &mut rand::thread_rng())
    }

    /// Draw `max(1, requested)` winners (capped at the pool size) from a
    /// uniform random permutation of the pool. Overwrites previous winners.
    pub fn draw_with<R: Rng + ?Sized>(
        &mut self,
        grant: &Grant,
        requested: i64,
        rng: &mut R,
    ) -> Result<Vec<PoolEntry>, AuthError> {
        grant.ensure(Operation::Draw)?;

        let count = usize::try_from(requested.max(1)).unwrap_or(usize::MAX);
        let take = count.min(self.state.pool.len());

        let mut shuffled = self.state.pool.clone();
        shuffled.shuffle(rng);
        shuffled.truncate(take);
        self.state.winners = shuffled;

        info!(
            "Drew {} winner(s) from a pool of {} (requested {})",
            take,
            self.state.pool.len(),
            requested
        );
        Ok(self.state.winners.clone())
    }

    pub fn clear_winners(&mut self, grant: &Grant) -> Result<(), AuthError> {
        grant.ensure(Operation::ClearWinners)?;
        self.state.winners.clear();
        debug!("Winners cleared");
        Ok(())
    }

    /// Reset to the initial empty state.
    pub fn clear_roster(&mut self, grant: &Grant) -> Result<(), AuthError> {
        grant.ensure(Operation::ClearRoster)?;
        self.state = RosterState::default();
        info!("Roster cleared");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Draw count coercion
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DrawCountError {
    #[error("draw count must be a number, got {0}")]
    NotANumber(String),
}

/// Coerce a request's `count` field into an integer.
///
/// Missing, `null` and empty-string values fall back to `default`. Numbers
/// and numeric strings are floored. The lower clamp to 1 happens in the
/// draw itself, so zero and negative values pass through unchanged.
pub fn parse_draw_count(value: Option<&Value>, default: i64) -> Result<i64, DrawCountError> {
    let number = match value {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(default),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match number {
        Some(n) if n.is_finite() => Ok(n.floor() as i64),
        _ => Err(DrawCountError::NotANumber(
            value.map(Value::to_string).unwrap_or_default(),
        )),
    }
}
