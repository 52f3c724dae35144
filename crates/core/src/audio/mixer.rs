use std::path::Path;
use thiserror::Error;
use tracing::info;

use super::types::{AudioTrackDescriptor, VolumeEnvelope};
use crate::encoder::{Encoder, EncoderError, MuxRequest};
use crate::job::RenderJobSpec;

/// Label of the mixed output stream in the filter graph.
const OUTPUT_LABEL: &str = "aout";

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio tracks to mix")]
    NoTracks,

    #[error("invalid playback rate {rate} for '{source_url}'")]
    InvalidPlaybackRate { source_url: String, rate: f64 },

    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

/// One ffmpeg audio input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixInput {
    pub source: String,
    pub loop_audio: bool,
}

/// ffmpeg inputs and filter graph that mix every track into one stream.
///
/// Input 0 is reserved for the video, so track `i` is ffmpeg input `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixPlan {
    pub inputs: Vec<MixInput>,
    pub filter_graph: String,
    pub output_label: String,
}

impl MixPlan {
    /// `-i` arguments for every track, looping ones prefixed with `-stream_loop -1`.
    pub fn input_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for input in &self.inputs {
            if input.loop_audio {
                args.extend(["-stream_loop".to_string(), "-1".to_string()]);
            }
            args.extend(["-i".to_string(), input.source.clone()]);
        }
        args
    }
}

/// Builds the mix for tracks of a render whose first frame is `job_start`.
pub fn build_mix_plan(
    tracks: &[AudioTrackDescriptor],
    job_start: u64,
    fps: f64,
) -> Result<MixPlan, AudioError> {
    if tracks.is_empty() {
        return Err(AudioError::NoTracks);
    }

    let mut chains = Vec::with_capacity(tracks.len() + 1);
    let mut labels = String::new();
    for (i, track) in tracks.iter().enumerate() {
        let filters = track_filters(track, job_start, fps)?;
        let label = format!("a{}", i);
        chains.push(format!("[{}:a]{}[{}]", i + 1, filters.join(","), label));
        labels.push_str(&format!("[{}]", label));
    }
    chains.push(format!(
        "{}amix=inputs={}:normalize=0:dropout_transition=0[{}]",
        labels,
        tracks.len(),
        OUTPUT_LABEL
    ));

    Ok(MixPlan {
        inputs: tracks
            .iter()
            .map(|t| MixInput {
                source: t.source_url.clone(),
                loop_audio: t.loop_audio,
            })
            .collect(),
        filter_graph: chains.join(";"),
        output_label: OUTPUT_LABEL.to_string(),
    })
}

fn track_filters(
    track: &AudioTrackDescriptor,
    job_start: u64,
    fps: f64,
) -> Result<Vec<String>, AudioError> {
    let rate = track.playback_rate;
    if !rate.is_finite() || rate <= 0.0 {
        return Err(AudioError::InvalidPlaybackRate {
            source_url: track.source_url.clone(),
            rate,
        });
    }

    // Frames of the track that lie before the rendered range.
    let skipped = job_start.saturating_sub(track.start_frame);
    let delay_frames = track.start_frame.saturating_sub(job_start);

    let mut filters = Vec::new();
    let trim_start =
        track.trim_before.unwrap_or(0) as f64 / fps + skipped as f64 / fps * rate;
    let trim_end = track.trim_after.map(|after| after as f64 / fps);
    if trim_start > 0.0 || trim_end.is_some() {
        let mut atrim = format!("atrim=start={}", number(trim_start));
        if let Some(end) = trim_end {
            atrim.push_str(&format!(":end={}", number(end)));
        }
        filters.push(atrim);
        filters.push("asetpts=PTS-STARTPTS".to_string());
    }

    if (rate - 1.0).abs() > f64::EPSILON {
        filters.extend(atempo_chain(rate));
    }

    if let Some(volume) = volume_filter(&track.volume, skipped as usize, fps) {
        filters.push(volume);
    }

    if delay_frames > 0 {
        let delay_ms = (delay_frames as f64 / fps * 1000.0).round() as u64;
        filters.push(format!("adelay={}:all=1", delay_ms));
    }

    if filters.is_empty() {
        filters.push("anull".to_string());
    }
    Ok(filters)
}

/// atempo only accepts 0.5..=2.0 per stage.
fn atempo_chain(rate: f64) -> Vec<String> {
    let mut stages = Vec::new();
    let mut remaining = rate;
    while remaining > 2.0 {
        stages.push("atempo=2".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    stages.push(format!("atempo={}", number(remaining)));
    stages
}

fn volume_filter(volume: &VolumeEnvelope, offset: usize, fps: f64) -> Option<String> {
    match volume {
        VolumeEnvelope::Constant(v) if (*v - 1.0).abs() < f32::EPSILON => None,
        VolumeEnvelope::Constant(v) => Some(format!("volume={}", number(f64::from(*v)))),
        VolumeEnvelope::PerFrame(values) => {
            let values = values.get(offset..).unwrap_or_default();
            if values.is_empty() {
                return None;
            }

            // Collapse runs of equal values into (end_frame, value) steps.
            let mut steps: Vec<(usize, f32)> = Vec::new();
            for (i, v) in values.iter().enumerate() {
                match steps.last_mut() {
                    Some((end, last)) if (*last - *v).abs() < f32::EPSILON => *end = i + 1,
                    _ => steps.push((i + 1, *v)),
                }
            }
            if steps.len() == 1 {
                return volume_filter(&VolumeEnvelope::Constant(steps[0].1), 0, fps);
            }

            let (_, last) = steps[steps.len() - 1];
            let mut expr = number(f64::from(last));
            for (end, v) in steps[..steps.len() - 1].iter().rev() {
                expr = format!(
                    "if(lt(t,{}),{},{})",
                    number(*end as f64 / fps),
                    number(f64::from(*v)),
                    expr
                );
            }
            Some(format!("volume='{}':eval=frame", expr))
        }
    }
}

/// Formats a number without trailing zeros.
fn number(value: f64) -> String {
    let formatted = format!("{:.6}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Mixes `tracks` into `video`, writing `output`. Returns the number of tracks mixed.
pub async fn mix(
    encoder: &dyn Encoder,
    video: &Path,
    tracks: &[AudioTrackDescriptor],
    output: &Path,
    job: &RenderJobSpec,
) -> Result<usize, AudioError> {
    let plan = build_mix_plan(tracks, job.start_frame, job.fps)?;
    let count = plan.inputs.len();
    encoder
        .mux_audio(MuxRequest {
            video_path: video.to_path_buf(),
            plan,
            output_path: output.to_path_buf(),
            duration_secs: job.frame_count() as f64 / job.fps,
            codec: job.codec,
        })
        .await?;

    info!(
        tracks = count,
        output = %output.display(),
        "Mixed audio into video"
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_track_plan() {
        let tracks = vec![AudioTrackDescriptor::new("/a.mp3", 0)];
        let plan = build_mix_plan(&tracks, 0, 30.0).unwrap();

        assert_eq!(plan.input_args(), vec!["-i", "/a.mp3"]);
        assert_eq!(
            plan.filter_graph,
            "[1:a]anull[a0];[a0]amix=inputs=1:normalize=0:dropout_transition=0[aout]"
        );
    }

    #[test]
    fn test_delay_volume_and_loop() {
        let tracks = vec![
            AudioTrackDescriptor::new("/music.mp3", 0)
                .with_volume(VolumeEnvelope::Constant(0.5))
                .with_loop(true),
            AudioTrackDescriptor::new("/voice.wav", 45),
        ];
        let plan = build_mix_plan(&tracks, 0, 30.0).unwrap();

        assert_eq!(
            plan.input_args(),
            vec!["-stream_loop", "-1", "-i", "/music.mp3", "-i", "/voice.wav"]
        );
        assert!(plan.filter_graph.contains("[1:a]volume=0.5[a0]"));
        assert!(plan.filter_graph.contains("[2:a]adelay=1500:all=1[a1]"));
        assert!(plan.filter_graph.ends_with("[a0][a1]amix=inputs=2:normalize=0:dropout_transition=0[aout]"));
    }

    #[test]
    fn test_track_before_range_is_trimmed() {
        let tracks = vec![AudioTrackDescriptor::new("/a.mp3", 0).with_trim(Some(30), None)];
        let plan = build_mix_plan(&tracks, 60, 30.0).unwrap();
        // 30 trimmed source frames plus 60 frames already played.
        assert!(plan.filter_graph.contains("atrim=start=3,asetpts=PTS-STARTPTS"));
        assert!(!plan.filter_graph.contains("adelay"));
    }

    #[test]
    fn test_trim_after() {
        let tracks = vec![AudioTrackDescriptor::new("/a.mp3", 0).with_trim(None, Some(90))];
        let plan = build_mix_plan(&tracks, 0, 30.0).unwrap();
        assert!(plan.filter_graph.contains("atrim=start=0:end=3"));
    }

    #[test]
    fn test_atempo_chain() {
        assert_eq!(atempo_chain(1.5), vec!["atempo=1.5"]);
        assert_eq!(atempo_chain(4.0), vec!["atempo=2", "atempo=2"]);
        assert_eq!(atempo_chain(0.25), vec!["atempo=0.5", "atempo=0.5"]);

        let bad = vec![AudioTrackDescriptor::new("/a.mp3", 0).with_playback_rate(0.0)];
        assert!(matches!(
            build_mix_plan(&bad, 0, 30.0),
            Err(AudioError::InvalidPlaybackRate { .. })
        ));
    }

    #[test]
    fn test_per_frame_volume_expression() {
        let envelope = VolumeEnvelope::PerFrame(vec![0.0, 0.0, 0.5, 1.0]);
        let filter = volume_filter(&envelope, 0, 10.0).unwrap();
        assert_eq!(
            filter,
            "volume='if(lt(t,0.2),0,if(lt(t,0.3),0.5,1))':eval=frame"
        );

        let flat = VolumeEnvelope::PerFrame(vec![0.25, 0.25]);
        assert_eq!(volume_filter(&flat, 0, 10.0).unwrap(), "volume=0.25");
        assert_eq!(volume_filter(&VolumeEnvelope::Constant(1.0), 0, 30.0), None);
    }

    #[test]
    fn test_no_tracks() {
        assert!(matches!(build_mix_plan(&[], 0, 30.0), Err(AudioError::NoTracks)));
    }

    #[test]
    fn test_number_format() {
        assert_eq!(number(3.0), "3");
        assert_eq!(number(0.5), "0.5");
        assert_eq!(number(0.0), "0");
        assert_eq!(number(1.0 / 3.0), "0.333333");
    }
}
