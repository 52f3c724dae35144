//! Command line arguments of the `framecast` binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use framecast_core::{FrameRange, OutputPattern, RenderRequest};

#[derive(Parser, Debug)]
#[command(name = "framecast", version, about = "Render compositions to video")]
pub struct Cli {
    /// Configuration file (TOML). Falls back to `FRAMECAST_CONFIG`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one composition to a video, a GIF or an image sequence.
    Render(RenderArgs),
    /// Render one output per row of a JSON data file.
    Batch(BatchArgs),
    /// Run the HTTP server.
    Serve,
}

/// Job options shared by `render` and `batch`.
#[derive(Args, Debug, Clone, Default)]
pub struct JobArgs {
    /// h264, h265, vp8, vp9, prores or gif.
    #[arg(long)]
    pub codec: Option<String>,

    #[arg(long)]
    pub crf: Option<u8>,

    /// Target bitrate such as `5M`. Cannot be combined with --crf.
    #[arg(long)]
    pub bitrate: Option<String>,

    #[arg(long)]
    pub scale: Option<f64>,

    /// `start-end` (inclusive) or a single frame.
    #[arg(long)]
    pub frames: Option<String>,

    /// Number of frames to render, starting at frame 0.
    #[arg(long, conflicts_with = "frames")]
    pub duration: Option<u64>,

    /// Input props, inline JSON or a path to a JSON file.
    #[arg(long)]
    pub props: Option<String>,

    #[arg(long)]
    pub muted: bool,

    /// Write one still per frame instead of a video.
    #[arg(long)]
    pub sequence: bool,

    /// png or jpeg.
    #[arg(long)]
    pub image_format: Option<String>,

    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    #[arg(long)]
    pub width: Option<u32>,

    #[arg(long)]
    pub height: Option<u32>,

    #[arg(long)]
    pub fps: Option<f64>,
}

impl JobArgs {
    pub fn to_request(&self, composition_id: &str) -> Result<RenderRequest> {
        let (start_frame, end_frame) = match self.frames.as_deref() {
            Some(spec) => {
                let range = FrameRange::parse(spec).context("Invalid --frames")?;
                (Some(range.start), Some(range.end))
            }
            None => (None, None),
        };
        let input_props = self.props.as_deref().map(parse_props).transpose()?;

        Ok(RenderRequest {
            composition_id: composition_id.to_string(),
            codec: self.codec.clone(),
            crf: self.crf,
            bitrate: self.bitrate.clone(),
            scale: self.scale,
            width: self.width,
            height: self.height,
            fps: self.fps,
            start_frame,
            end_frame,
            duration_in_frames: self.duration,
            muted: Some(self.muted),
            input_props,
            sequence: Some(self.sequence),
            image_format: self.image_format.clone(),
            jpeg_quality: self.jpeg_quality,
            ..RenderRequest::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    pub composition: String,

    /// Output file, or the output directory with --sequence.
    pub output: Option<PathBuf>,

    /// Number of parallel frame workers.
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub job: JobArgs,
}

impl RenderArgs {
    pub fn to_request(&self) -> Result<RenderRequest> {
        let mut request = self.job.to_request(&self.composition)?;
        request.concurrency = self.concurrency;
        request.output_path = self.output.clone();
        Ok(request)
    }
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    pub composition: String,

    /// JSON file holding an array of row objects.
    #[arg(long)]
    pub data: PathBuf,

    /// Number of jobs rendered at once.
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Frame workers per job.
    #[arg(long)]
    pub frame_concurrency: Option<usize>,

    /// Output file name, e.g. `{compositionId}-{name}`.
    #[arg(long)]
    pub output_pattern: Option<String>,

    /// Directory for the outputs. Defaults to `render.output_dir`.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Stop claiming new jobs after the first failure.
    #[arg(long)]
    pub fail_fast: bool,

    #[command(flatten)]
    pub job: JobArgs,
}

impl BatchArgs {
    /// The request every row is merged into.
    pub fn base_request(&self) -> Result<RenderRequest> {
        let mut request = self.job.to_request(&self.composition)?;
        request.concurrency = self.frame_concurrency;
        Ok(request)
    }

    pub fn pattern(&self) -> Result<OutputPattern> {
        match self.output_pattern.as_deref() {
            Some(pattern) => OutputPattern::parse(pattern).context("Invalid --output-pattern"),
            None => Ok(OutputPattern::default()),
        }
    }
}

/// Parses `--props`: inline JSON when it starts with `{`, a file path otherwise.
pub fn parse_props(value: &str) -> Result<Value> {
    if value.trim_start().starts_with('{') {
        return serde_json::from_str(value).context("--props is not valid JSON");
    }
    let text = std::fs::read_to_string(value)
        .with_context(|| format!("Failed to read props file {}", value))?;
    serde_json::from_str(&text).with_context(|| format!("Props file {} is not valid JSON", value))
}

/// Reads the rows of a batch data file.
pub fn load_rows(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} must hold a JSON array", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_render_args() {
        let cli = parse(&[
            "framecast",
            "render",
            "intro",
            "out/intro.webm",
            "--codec",
            "vp9",
            "--crf",
            "30",
            "--frames",
            "10-19",
            "--concurrency",
            "3",
            "--props",
            r#"{"title": "Hi"}"#,
            "--muted",
        ]);
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };

        let request = args.to_request().unwrap();
        assert_eq!(request.composition_id, "intro");
        assert_eq!(request.codec.as_deref(), Some("vp9"));
        assert_eq!(request.crf, Some(30));
        assert_eq!(request.start_frame, Some(10));
        assert_eq!(request.end_frame, Some(19));
        assert_eq!(request.concurrency, Some(3));
        assert_eq!(request.muted, Some(true));
        assert_eq!(request.output_path, Some(PathBuf::from("out/intro.webm")));
        assert_eq!(request.input_props, Some(json!({"title": "Hi"})));
    }

    #[test]
    fn test_single_frame_and_duration() {
        let args = JobArgs {
            frames: Some("42".into()),
            ..JobArgs::default()
        };
        let request = args.to_request("intro").unwrap();
        assert_eq!((request.start_frame, request.end_frame), (Some(42), Some(42)));

        let args = JobArgs {
            duration: Some(90),
            ..JobArgs::default()
        };
        let request = args.to_request("intro").unwrap();
        assert_eq!(request.duration_in_frames, Some(90));
        assert_eq!(request.end_frame, None);
    }

    #[test]
    fn test_invalid_frames() {
        let args = JobArgs {
            frames: Some("20-10".into()),
            ..JobArgs::default()
        };
        assert!(args.to_request("intro").is_err());
    }

    #[test]
    fn test_frames_conflict_with_duration() {
        let result = Cli::try_parse_from([
            "framecast", "render", "intro", "--frames", "0-9", "--duration", "10",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_batch_args() {
        let cli = parse(&[
            "framecast",
            "--config",
            "framecast.toml",
            "batch",
            "promo",
            "--data",
            "rows.json",
            "--concurrency",
            "2",
            "--frame-concurrency",
            "4",
            "--output-pattern",
            "{compositionId}-{name}",
            "--fail-fast",
            "--duration",
            "30",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("framecast.toml")));
        let Command::Batch(args) = cli.command else {
            panic!("expected batch");
        };

        assert_eq!(args.concurrency, 2);
        assert!(args.fail_fast);
        assert_eq!(args.data, PathBuf::from("rows.json"));
        let request = args.base_request().unwrap();
        assert_eq!(request.concurrency, Some(4));
        assert_eq!(request.duration_in_frames, Some(30));
        assert!(args.pattern().is_ok());
    }

    #[test]
    fn test_batch_invalid_pattern() {
        let cli = parse(&[
            "framecast",
            "batch",
            "promo",
            "--data",
            "rows.json",
            "--output-pattern",
            "{}",
        ]);
        let Command::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert!(args.pattern().is_err());
    }

    #[test]
    fn test_props_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"name": "Ada", "score": 3}}"#).unwrap();

        let props = parse_props(file.path().to_str().unwrap()).unwrap();
        assert_eq!(props, json!({"name": "Ada", "score": 3}));

        assert!(parse_props("{not json").is_err());
        assert!(parse_props("/nonexistent/props.json").is_err());
    }

    #[test]
    fn test_load_rows() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"[{{"name": "a"}}, {{"name": "b"}}]"#).unwrap();
        let rows = load_rows(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["name"], "b");

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"name": "a"}}"#).unwrap();
        assert!(load_rows(file.path()).is_err());
    }
}
