//! Mock encoder for testing.

use async_trait::async_trait;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::encoder::{
    EncodeInput, EncodeMode, EncodeRequest, EncodedOutput, Encoder, EncoderError, EncoderSession,
    MuxRequest,
};

/// A recorded concat call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedConcat {
    pub segments: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Mock implementation of the Encoder trait.
///
/// Output files are plain text so tests can check frame order:
/// - a direct pipe pass writes the pushed bytes in order
/// - a pass over an image sequence concatenates the stills
/// - a palette pass writes `palette\n`
/// - concat appends the segments
/// - muxing copies the video and appends `audio: N tracks\n`
#[derive(Debug, Clone, Default)]
pub struct MockEncoder {
    passes: Arc<RwLock<Vec<EncodeRequest>>>,
    concats: Arc<RwLock<Vec<RecordedConcat>>>,
    muxes: Arc<RwLock<Vec<MuxRequest>>>,
    fail_on_frame: Arc<RwLock<Option<u64>>>,
    fail_begin: Arc<RwLock<Option<String>>>,
    fail_concat: Arc<RwLock<Option<String>>>,
    fail_mux: Arc<RwLock<Option<String>>>,
}

impl MockEncoder {
    /// Create a new mock encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pass started, in order.
    pub async fn passes(&self) -> Vec<EncodeRequest> {
        self.passes.read().await.clone()
    }

    pub async fn pass_count(&self) -> usize {
        self.passes.read().await.len()
    }

    pub async fn concats(&self) -> Vec<RecordedConcat> {
        self.concats.read().await.clone()
    }

    pub async fn muxes(&self) -> Vec<MuxRequest> {
        self.muxes.read().await.clone()
    }

    /// Fail any session when this frame is pushed.
    pub async fn fail_on_frame(&self, frame: u64) {
        *self.fail_on_frame.write().await = Some(frame);
    }

    /// Refuse to start any session.
    pub async fn fail_begin(&self, message: impl Into<String>) {
        *self.fail_begin.write().await = Some(message.into());
    }

    pub async fn fail_concat(&self, message: impl Into<String>) {
        *self.fail_concat.write().await = Some(message.into());
    }

    pub async fn fail_mux(&self, message: impl Into<String>) {
        *self.fail_mux.write().await = Some(message.into());
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn begin(&self, request: EncodeRequest) -> Result<Box<dyn EncoderSession>, EncoderError> {
        if request.frame_count == 0 {
            return Err(EncoderError::invalid_request("frame_count must be at least 1"));
        }
        if let Some(message) = self.fail_begin.read().await.clone() {
            return Err(EncoderError::encoding_failed(message, None));
        }
        self.passes.write().await.push(request.clone());
        let fail_on_frame = *self.fail_on_frame.read().await;

        Ok(Box::new(MockSession {
            next_frame: request.first_frame,
            request,
            written: 0,
            buffer: Vec::new(),
            fail_on_frame,
        }))
    }

    async fn concat(&self, segments: &[PathBuf], output: &Path) -> Result<(), EncoderError> {
        self.concats.write().await.push(RecordedConcat {
            segments: segments.to_vec(),
            output: output.to_path_buf(),
        });
        if let Some(message) = self.fail_concat.read().await.clone() {
            return Err(EncoderError::encoding_failed(message, None));
        }

        let mut joined = Vec::new();
        for segment in segments {
            joined.extend(tokio::fs::read(segment).await?);
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }

    async fn mux_audio(&self, request: MuxRequest) -> Result<(), EncoderError> {
        self.muxes.write().await.push(request.clone());
        if let Some(message) = self.fail_mux.read().await.clone() {
            return Err(EncoderError::encoding_failed(message, None));
        }

        let mut content = tokio::fs::read(&request.video_path).await?;
        content.extend(format!("audio: {} tracks\n", request.plan.inputs.len()).into_bytes());
        tokio::fs::write(&request.output_path, content).await?;
        Ok(())
    }

    async fn validate(&self) -> Result<(), EncoderError> {
        Ok(())
    }
}

struct MockSession {
    request: EncodeRequest,
    next_frame: u64,
    written: u64,
    buffer: Vec<u8>,
    fail_on_frame: Option<u64>,
}

#[async_trait]
impl EncoderSession for MockSession {
    async fn push_frame(&mut self, frame: u64, bytes: Vec<u8>) -> Result<(), EncoderError> {
        if !self.request.input.is_pipe() {
            return Err(EncoderError::invalid_request(
                "frames cannot be pushed into an image sequence pass",
            ));
        }
        if frame != self.next_frame {
            return Err(EncoderError::OutOfOrderFrame {
                expected: self.next_frame,
                got: frame,
            });
        }
        if self.fail_on_frame == Some(frame) {
            return Err(EncoderError::encoding_failed(
                format!("mock encoder failed on frame {}", frame),
                Some("Conversion failed!".to_string()),
            ));
        }
        self.buffer.extend(bytes);
        self.next_frame += 1;
        self.written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }

    async fn finish(self: Box<Self>) -> Result<EncodedOutput, EncoderError> {
        let session = *self;
        let request = session.request;

        let content = match (&request.input, &request.mode) {
            (_, EncodeMode::PaletteGen) => b"palette\n".to_vec(),
            (EncodeInput::Pipe { .. }, _) => {
                if session.written < request.frame_count {
                    return Err(EncoderError::IncompleteInput {
                        expected: request.frame_count,
                        written: session.written,
                    });
                }
                session.buffer
            }
            (EncodeInput::ImageSequence {
                pattern,
                start_number,
                ..
            }, _) => {
                let mut content = Vec::new();
                for frame in *start_number..*start_number + request.frame_count {
                    let still = expand_pattern(pattern, frame);
                    content.extend(tokio::fs::read(&still).await.map_err(|_| {
                        EncoderError::encoding_failed(
                            format!("missing still {}", still.display()),
                            None,
                        )
                    })?);
                }
                content
            }
        };

        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&request.output_path, content).await?;
        Ok(EncodedOutput {
            path: request.output_path,
            frames: request.frame_count,
        })
    }
}

/// Substitutes a printf-style `%0Nd` / `%d` placeholder.
fn expand_pattern(pattern: &Path, frame: u64) -> PathBuf {
    let pattern = pattern.to_string_lossy();
    let Ok(re) = Regex::new(r"%(0(\d+))?d") else {
        return PathBuf::from(pattern.into_owned());
    };
    let expanded = re.replace(&pattern, |caps: &regex_lite::Captures| {
        let width = caps
            .get(2)
            .and_then(|w| w.as_str().parse::<usize>().ok())
            .unwrap_or(0);
        format!("{:0width$}", frame, width = width)
    });
    PathBuf::from(expanded.into_owned())
}
