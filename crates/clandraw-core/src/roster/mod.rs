// Team rosters, the combined draw pool, and winner draws.

pub mod cell;
pub mod state;
pub mod store;

pub use cell::CellValue;
pub use state::{parse_draw_count, DrawCountError, PoolEntry, RosterState, RosterStore, Team};
pub use store::{RosterCommand, RosterError, RosterHandle};
