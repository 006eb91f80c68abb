// Library root: roster/draw state machine, screenshot archive, roles and
// configuration. The HTTP boundary lives in `clandraw-server`.

pub mod archive;
pub mod auth;
pub mod config;
pub mod import;
pub mod roster;
