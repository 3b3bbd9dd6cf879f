use std::process::Command;

use anyhow::{Context, Result, bail};

/// Decibel span exposed by a typical output endpoint.
pub const DEFAULT_DB_RANGE: (f32, f32) = (-65.25, 0.0);

const LEVEL_EPSILON: f32 = 0.01;

/// Output device whose level the control loop drives.
pub trait AudioEndpoint {
    /// `(min, max)` levels accepted by [`AudioEndpoint::set_volume`].
    fn volume_range(&self) -> (f32, f32);

    fn set_volume(&mut self, level: f32) -> Result<()>;
}

/// Sets the default PulseAudio/PipeWire sink through `pactl`.
pub struct PulseAudioEndpoint {
    range: (f32, f32),
    last_level: Option<f32>,
}

impl PulseAudioEndpoint {
    pub fn new() -> Result<Self> {
        let status = Command::new("pactl")
            .arg("info")
            .output()
            .context("failed to run pactl; is PulseAudio or PipeWire installed?")?;
        if !status.status.success() {
            bail!(
                "pactl info failed: {}",
                String::from_utf8_lossy(&status.stderr).trim()
            );
        }

        log::info!("using pactl for the default sink volume");
        Ok(Self {
            range: DEFAULT_DB_RANGE,
            last_level: None,
        })
    }

    /// The clamped level to send, or `None` when it repeats the last one.
    fn pending_level(&self, level: f32) -> Option<f32> {
        let level = level.clamp(self.range.0, self.range.1);
        let repeated = self
            .last_level
            .is_some_and(|last| (last - level).abs() < LEVEL_EPSILON);
        (!repeated).then_some(level)
    }
}

/// `pactl` arguments that set the default sink to `level_db`.
///
/// pactl reads a leading sign as a relative step, so the decibel level is
/// sent as an unsigned linear amplitude factor instead.
pub fn sink_volume_args(level_db: f32) -> [String; 3] {
    let factor = 10f32.powf(level_db / 20.0);
    [
        "set-sink-volume".to_string(),
        "@DEFAULT_SINK@".to_string(),
        format!("{factor:.6}"),
    ]
}

impl AudioEndpoint for PulseAudioEndpoint {
    fn volume_range(&self) -> (f32, f32) {
        self.range
    }

    fn set_volume(&mut self, level: f32) -> Result<()> {
        let Some(level) = self.pending_level(level) else {
            return Ok(());
        };

        let args = sink_volume_args(level);
        let output = Command::new("pactl")
            .args(&args)
            .output()
            .context("failed to run pactl set-sink-volume")?;
        if !output.status.success() {
            bail!(
                "pactl {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        log::debug!("sink volume set to {level:.2} dB ({})", args[2]);
        self.last_level = Some(level);
        Ok(())
    }
}

/// Records levels without touching any device.
#[derive(Debug)]
pub struct DryRunEndpoint {
    range: (f32, f32),
    applied: Vec<f32>,
}

impl DryRunEndpoint {
    pub fn new(range: (f32, f32)) -> Self {
        Self {
            range,
            applied: Vec::new(),
        }
    }

    pub fn applied(&self) -> &[f32] {
        &self.applied
    }
}

impl Default for DryRunEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_DB_RANGE)
    }
}

impl AudioEndpoint for DryRunEndpoint {
    fn volume_range(&self) -> (f32, f32) {
        self.range
    }

    fn set_volume(&mut self, level: f32) -> Result<()> {
        log::info!("dry-run: volume level {level:.2}");
        self.applied.push(level);
        Ok(())
    }
}
