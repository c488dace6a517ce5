//! Hot-reload weaver
//!
//! Rewrites compiled hotweave modules so that every eligible method first
//! asks the hot-reload runtime for a replacement implementation and only
//! falls back to its original instructions when none is registered.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod capability;
pub mod composer;
pub mod config;
pub mod error;
pub mod ordering;
pub mod overrides;
pub mod pipeline;
pub mod resolver;
pub mod weave;

pub use capability::{ensure_capability, Capability};
pub use composer::{ComposeError, ComposedBody, InstructionComposer, Label};
pub use config::{ConfigError, ConfigOptions, WeaveConfig, WeaveOptions, WeavePolicy};
pub use error::{WeaveError, WeaveResult};
pub use ordering::{ordered_types, SkipReason, TypeGraph};
pub use overrides::{overridable_methods, OverrideRecord};
pub use pipeline::{SkippedEntry, WeaveReport, Weaver};
pub use resolver::{search_directories, ModuleResolver, ResolveError, TypeHandle};
pub use weave::{weave_method, Dispatch};
