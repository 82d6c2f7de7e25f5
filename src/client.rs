//! Composition root for the resilient remote-access layer.
//!
//! Keep the public surface small and predictable. Implementation details are
//! split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod signals;

pub use builder::ResilientFetchBuilder;
pub use core::ResilientFetch;
pub use signals::SignalsSnapshot;
