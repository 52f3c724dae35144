//! Readiness tracking for one renderer instance.
//!
//! Scene code registers a delay for every piece of asynchronous work that must
//! finish before a frame can be captured (font loads, image decodes, fetches).
//! A frame is ready once the registry is empty and the renderer has painted.

mod error;
mod registry;

pub use error::ReadinessError;
pub use registry::{DelayHandle, DelayId, ReadinessRegistry, RegistryStats};
