//! Encoder module: the codec table and the `Encoder` seam the render
//! pipeline streams captured frames into.
//!
//! `FfmpegEncoder` drives ffmpeg as a subprocess. Frames are piped in as
//! encoded images (`-f image2pipe`) or read from a numbered image sequence,
//! and segments are joined with the concat demuxer without re-encoding.
//!
//! # Example
//!
//! ```ignore
//! use framecast_core::encoder::{Codec, EncodeRequest, Encoder, FfmpegEncoder};
//! use framecast_core::renderer::ImageFormat;
//!
//! let encoder = FfmpegEncoder::with_defaults();
//! encoder.validate().await?;
//!
//! let request = EncodeRequest::pipe(Codec::H264, ImageFormat::Png, "out.mp4", 0, 60)
//!     .with_fps(30.0)
//!     .with_size(1280, 720);
//! let mut session = encoder.begin(request).await?;
//! for frame in 0..60 {
//!     session.push_frame(frame, png_bytes(frame)).await?;
//! }
//! let output = session.finish().await?;
//! ```

mod codec;
mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use codec::{Codec, CodecProfile};
pub use config::EncoderConfig;
pub use error::EncoderError;
pub use ffmpeg::FfmpegEncoder;
pub use traits::{Encoder, EncoderSession};
pub use types::{EncodeInput, EncodeMode, EncodeRequest, EncodedOutput, MuxRequest};
