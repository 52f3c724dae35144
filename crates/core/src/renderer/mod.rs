//! Renderer backends.
//!
//! A renderer is an isolated, off-process instance that can load a
//! composition, move it to a frame, report when that frame is painted and
//! write it to disk. `ProcessRenderer` drives a bridge executable over
//! newline-delimited JSON; tests use the mocks in [`crate::testing`].

mod config;
mod error;
mod process;
pub mod protocol;
mod traits;
mod types;

pub use config::RendererConfig;
pub use error::RendererError;
pub use process::{ProcessLauncher, ProcessRenderer};
pub use traits::{Renderer, RendererLauncher};
pub use types::{ImageFormat, LoadedScene, SceneRef};
