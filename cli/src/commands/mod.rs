//! Command implementations

pub mod destroy;
pub mod dispatch;
pub mod repl;
pub mod status;
