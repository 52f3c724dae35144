//! Render job model: the resolved job, the request shape it is built from,
//! and the validation that runs before any subprocess starts.

mod error;
mod request;
mod types;

pub use error::ValidationError;
pub use request::{default_output_path, RenderRequest};
pub use types::{FrameRange, Quality, RenderJobSpec, MAX_FRAME_COUNT};

pub(crate) use types::file_name_of;
