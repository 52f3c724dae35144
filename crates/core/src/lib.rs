pub mod audio;
pub mod batch;
pub mod config;
pub mod driver;
pub mod encoder;
pub mod events;
pub mod job;
pub mod orchestrator;
pub mod readiness;
pub mod renderer;
pub mod testing;
pub mod worker;

pub use audio::{AudioError, AudioTrackDescriptor, MixPlan, VolumeEnvelope};
pub use batch::{
    plan_batch, run_all, BatchError, BatchOptions, BatchOutcome, BatchSummary, OutputPattern,
};
pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, ServerConfig,
};
pub use driver::{CapturedFrame, CommittedFrame, DriverTimeouts, FrameDriver, ReadyFrame};
pub use encoder::{
    Codec, CodecProfile, EncodeInput, EncodeMode, EncodeRequest, EncodedOutput, Encoder,
    EncoderConfig, EncoderError, EncoderSession, FfmpegEncoder,
};
pub use events::{percent, write_ndjson, EventReporter, ProgressEvent};
pub use job::{
    FrameRange, Quality, RenderJobSpec, RenderRequest, ValidationError, MAX_FRAME_COUNT,
};
pub use orchestrator::{
    partition_frames, OrchestratorSettings, ProgressAggregator, RenderConfig, RenderError,
    RenderOrchestrator, RenderOutcome, Segment,
};
pub use readiness::{DelayHandle, DelayId, ReadinessError, ReadinessRegistry, RegistryStats};
pub use renderer::{
    ImageFormat, LoadedScene, ProcessLauncher, ProcessRenderer, Renderer, RendererConfig,
    RendererError, RendererLauncher, SceneRef,
};
pub use worker::{
    render_range, FrameTarget, StillNaming, WorkerError, WorkerOptions, WorkerOutput,
};
