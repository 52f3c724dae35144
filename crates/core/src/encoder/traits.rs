//! Trait definitions for the encoder module.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::error::EncoderError;
use super::types::{EncodeRequest, EncodedOutput, MuxRequest};

/// A running encoder pass.
///
/// Frames must arrive in ascending order without gaps, starting at the
/// request's `first_frame`. Dropping a session without calling `finish`
/// aborts the pass.
#[async_trait]
pub trait EncoderSession: Send {
    /// Streams one encoded image into the pass.
    async fn push_frame(&mut self, frame: u64, bytes: Vec<u8>) -> Result<(), EncoderError>;

    /// Number of frames accepted so far.
    fn frames_written(&self) -> u64;

    /// Closes the input and waits for the output file.
    async fn finish(self: Box<Self>) -> Result<EncodedOutput, EncoderError>;
}

/// Something that turns frames into video files.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns the name of this encoder implementation.
    fn name(&self) -> &str;

    /// Starts an encoder pass.
    async fn begin(&self, request: EncodeRequest) -> Result<Box<dyn EncoderSession>, EncoderError>;

    /// Joins segments in order into `output` without re-encoding.
    async fn concat(&self, segments: &[PathBuf], output: &Path) -> Result<(), EncoderError>;

    /// Muxes mixed audio into a video, copying the video stream.
    async fn mux_audio(&self, request: MuxRequest) -> Result<(), EncoderError>;

    /// Validates that the encoder is properly configured and ready.
    async fn validate(&self) -> Result<(), EncoderError>;

    /// Runs a pass whose input is already on disk.
    async fn encode(&self, request: EncodeRequest) -> Result<EncodedOutput, EncoderError> {
        if request.input.is_pipe() {
            return Err(EncoderError::invalid_request(
                "encode() needs an image sequence input",
            ));
        }
        self.begin(request).await?.finish().await
    }
}
