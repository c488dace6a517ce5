//! Hotweave reference runtime
//!
//! A small interpreter for hotweave modules together with the host side of
//! the hot-reload contract (`HotReloading.Core.Runtime`). Woven modules run
//! here unchanged: with an empty registry every method behaves as it did
//! before weaving, and a registered [`Delegate`] takes over the method it is
//! keyed to.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod host;
pub mod interpreter;
mod intrinsics;
pub mod object;
pub mod value;

pub use error::{VmError, VmResult};
pub use host::HostRuntime;
pub use interpreter::{Interpreter, MAX_CALL_DEPTH};
pub use object::Object;
pub use value::{Delegate, HandlerFn, Value};
