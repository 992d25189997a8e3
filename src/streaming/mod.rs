//! Real-time playback through the system audio device
//!
//! A [`PatchSource`] renders a [`ChipParams`] patch block by block inside
//! the `rodio` mixer thread, so nothing is rendered ahead of the device.

use std::time::Duration;

use rodio::{OutputStream, Sink, Source};

use crate::nodes::{ChipNode, ChipParams, Node};
use crate::{Result, SidError};

/// Frames rendered per refill
const BLOCK_FRAMES: usize = 1024;

/// Live rendering of a patch as a `rodio` source
///
/// Gates open at the first frame and close at three quarters of the
/// duration; the source ends after `total_frames`.
pub struct PatchSource {
    node: ChipNode,
    sample_rate: u32,
    total_frames: usize,
    release_frame: usize,
    rendered: usize,
    block: Vec<f32>,
    block_pos: usize,
}

impl PatchSource {
    /// Create a source for `seconds` of `params`.
    pub fn new(params: ChipParams, sample_rate: u32, seconds: f64) -> Result<Self> {
        if !(seconds.is_finite() && seconds > 0.0) {
            return Err(SidError::ConfigError(format!("invalid duration {seconds} s")));
        }
        let node = ChipNode::new(params, sample_rate as f64)?;
        let total_frames = (seconds * sample_rate as f64).round() as usize;
        Ok(PatchSource {
            node,
            sample_rate,
            total_frames,
            release_frame: total_frames * 3 / 4,
            rendered: 0,
            block: vec![0.0; BLOCK_FRAMES],
            block_pos: BLOCK_FRAMES,
        })
    }

    fn refill(&mut self) {
        let start = self.rendered;
        let len = BLOCK_FRAMES.min(self.total_frames - start);
        let end = start + len;
        // Gate on at frame 0, off at the release frame.
        let mut triggers = [0usize; 2];
        let mut count = 0;
        for frame in [0, self.release_frame] {
            if (start..end).contains(&frame) {
                triggers[count] = frame - start;
                count += 1;
            }
        }
        self.block.resize(len, 0.0);
        self.node.process(&triggers[..count], &mut self.block);
        self.rendered = end;
        self.block_pos = 0;
    }
}

impl Iterator for PatchSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.block_pos >= self.block.len() {
            if self.rendered >= self.total_frames {
                return None;
            }
            self.refill();
        }
        let sample = self.block.get(self.block_pos).copied();
        self.block_pos += 1;
        sample
    }
}

impl Source for PatchSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_frames - self.rendered + self.block.len().saturating_sub(self.block_pos))
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(
            self.total_frames as f64 / self.sample_rate as f64,
        ))
    }
}

/// Play a patch on the default output device and block until it ends.
///
/// # Arguments
///
/// * `params` - Patch to play
/// * `sample_rate` - Device rate in Hz
/// * `seconds` - Duration including the release quarter
pub fn play_patch(params: ChipParams, sample_rate: u32, seconds: f64) -> Result<()> {
    let source = PatchSource::new(params, sample_rate, seconds)?;

    let (_stream, handle) = OutputStream::try_default()
        .map_err(|e| SidError::AudioDeviceError(format!("failed to open output stream: {e}")))?;
    let sink = Sink::try_new(&handle)
        .map_err(|e| SidError::AudioDeviceError(format!("failed to create sink: {e}")))?;

    log::info!("playing {seconds:.1} s at {sample_rate} Hz");
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}
