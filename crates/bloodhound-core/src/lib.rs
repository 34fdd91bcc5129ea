//! BloodHound Core - Shared functionality for the BloodHound CLI
//!
//! Nothing in here knows about BloodHound services; it only covers where
//! files live, how external commands run, and how the terminal is drawn.

pub mod format;
pub mod paths;
pub mod process;

pub use format::Colors;
pub use paths::Paths;
pub use process::{CommandSpec, ProcessError};
