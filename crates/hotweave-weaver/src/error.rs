//! Weaver errors

use crate::composer::ComposeError;
use crate::config::ConfigError;
use crate::resolver::ResolveError;
use hotweave_bytecode::{ModuleError, VerifyError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a weave before anything is written
#[derive(Debug, Error)]
pub enum WeaveError {
    /// Input module could not be read or decoded
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    /// A type the weaver needs could not be found
    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Label resolution failed while composing a body
    #[error("Composition error: {0}")]
    Compose(#[from] ComposeError),

    /// The woven module failed structural verification
    #[error("Verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input carries the woven flag already
    #[error("Module {0} has already been woven")]
    AlreadyWoven(String),

    /// Method body violates a structural invariant
    #[error("Cannot weave {method}: {reason}")]
    InvalidBody {
        /// `Type::Method(key)`
        method: String,
        /// What is wrong with the body
        reason: &'static str,
    },

    /// I/O failure while writing output
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Destination
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Weaver result alias
pub type WeaveResult<T> = Result<T, WeaveError>;
