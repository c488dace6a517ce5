//! Subcommand implementations

pub mod inspect;
pub mod verify;
pub mod weave;
