// HTTP boundary for the clan draw: sessions, role checks and routing on top
// of `clandraw-core`.

pub mod error;
pub mod extract;
pub mod routes;
pub mod session;

pub use routes::{router, AppState};
