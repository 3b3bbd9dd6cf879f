//! Per-frame orchestration: capture, detect, measure, map, apply, render.
//!
//! The loop owns its four collaborators and runs one frame at a time on the
//! calling thread. The only state carried between frames is the previous
//! frame timestamp (for the frame rate), the consecutive capture failure
//! count, and the control value currently on display.

use std::time::Instant;

use anyhow::{Context, Result};

use crate::{
    audio::AudioEndpoint,
    error::ControlResult,
    geometry, gesture, landmarks,
    mapping::{DISTANCE_DOMAIN, VolumeMapping},
    pipeline::{
        FeedbackSurface, FrameSource, HandDetector,
        overlay::{self, Feedback, PinchIndicator},
    },
    types::{FingerStates, Frame, HandFrame, Handedness, INDEX_TIP, MappedControl, THUMB_TIP},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    AwaitingFrame,
    HasHand,
    NoHand,
    Rendered,
    Stopped,
}

#[derive(Clone, Copy, Debug)]
pub struct LoopSettings {
    pub hand_index: usize,
    /// Consecutive failed captures tolerated before the loop gives up.
    pub max_capture_failures: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            hand_index: 0,
            max_capture_failures: 30,
        }
    }
}

/// Instantaneous frame rate from consecutive frame timestamps.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameTiming {
    previous: Option<Instant>,
}

impl FrameTiming {
    /// Records `now` and returns the rate since the previous frame, if any.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        let fps = self.previous.and_then(|previous| {
            let elapsed = now.checked_duration_since(previous)?.as_secs_f32();
            (elapsed > 0.0).then(|| 1.0 / elapsed)
        });
        self.previous = Some(now);
        fps
    }
}

/// Values derived from one detected hand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandReading {
    pub distance: f32,
    pub control: MappedControl,
    pub pinch: PinchIndicator,
    pub fingers: FingerStates,
}

pub fn read_hand(hand: &HandFrame, mapping: &VolumeMapping) -> ControlResult<HandReading> {
    let thumb = hand.get(THUMB_TIP)?;
    let index = hand.get(INDEX_TIP)?;
    let distance = geometry::landmark_distance(hand, THUMB_TIP, INDEX_TIP)?;

    Ok(HandReading {
        distance,
        control: mapping.map(distance)?,
        pinch: PinchIndicator {
            thumb: (thumb.x, thumb.y),
            index: (index.x, index.y),
            center: geometry::midpoint(&thumb, &index),
            closed: distance <= DISTANCE_DOMAIN.0,
        },
        fingers: gesture::classify(hand)?,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    /// `HasHand` or `NoHand`.
    pub hand_state: LoopState,
    pub reading: Option<HandReading>,
    pub volume_applied: bool,
    pub fps: Option<f32>,
}

pub struct ControlLoop<S, D, A, W> {
    source: S,
    detector: D,
    audio: A,
    surface: W,
    mapping: VolumeMapping,
    settings: LoopSettings,
    timing: FrameTiming,
    state: LoopState,
    shown: MappedControl,
    capture_failures: u32,
}

impl<S, D, A, W> ControlLoop<S, D, A, W>
where
    S: FrameSource,
    D: HandDetector,
    A: AudioEndpoint,
    W: FeedbackSurface,
{
    pub fn new(
        source: S,
        detector: D,
        audio: A,
        surface: W,
        settings: LoopSettings,
    ) -> ControlResult<Self> {
        let mapping = VolumeMapping::new(audio.volume_range())?;
        let (min, max) = audio.volume_range();
        log::info!("mapping pinch distance {DISTANCE_DOMAIN:?} px onto volume {min:.2}..{max:.2}");

        Ok(Self {
            source,
            detector,
            audio,
            surface,
            shown: mapping.resting(),
            mapping,
            settings,
            timing: FrameTiming::default(),
            state: LoopState::AwaitingFrame,
            capture_failures: 0,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn surface(&self) -> &W {
        &self.surface
    }

    /// Runs cycles until the surface is no longer visible or `should_stop`
    /// returns true; both are checked after every cycle.
    pub fn run<F>(&mut self, mut should_stop: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        log::info!("control loop started");
        let mut rendered: u64 = 0;

        loop {
            if self.run_cycle(Instant::now())?.is_some() {
                rendered += 1;
            }
            if !self.surface.is_visible() || should_stop() {
                self.state = LoopState::Stopped;
                log::info!("control loop stopped after {rendered} frames");
                return Ok(());
            }
        }
    }

    /// Processes one frame stamped with `now`.
    ///
    /// Returns `Ok(None)` when the capture failed and the frame was skipped.
    pub fn run_cycle(&mut self, now: Instant) -> Result<Option<CycleReport>> {
        self.state = LoopState::AwaitingFrame;
        let mut frame = match self.source.next_frame() {
            Ok(frame) => {
                self.capture_failures = 0;
                frame
            }
            Err(err) => {
                self.capture_failures += 1;
                if self.capture_failures > self.settings.max_capture_failures {
                    return Err(err.context(format!(
                        "giving up after {} failed captures in a row",
                        self.capture_failures
                    )));
                }
                log::warn!("skipping frame: {err:?}");
                return Ok(None);
            }
        };

        let (hand, handedness) = self.locate_hand(&frame);
        self.state = if hand.is_empty() {
            LoopState::NoHand
        } else {
            LoopState::HasHand
        };
        let hand_state = self.state;

        let reading = if hand.is_empty() {
            None
        } else {
            match read_hand(&hand, &self.mapping) {
                Ok(reading) => Some(reading),
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => {
                    log::warn!("skipping control update: {err}");
                    None
                }
            }
        };

        let mut volume_applied = false;
        if let Some(reading) = &reading {
            match self.audio.set_volume(reading.control.raw_value) {
                Ok(()) => {
                    self.shown = reading.control;
                    volume_applied = true;
                }
                Err(err) => log::error!(
                    "failed to apply volume {:.2}: {err:?}",
                    reading.control.raw_value
                ),
            }
        }

        let fps = self.timing.tick(now);
        overlay::draw_feedback(
            &mut frame,
            &Feedback {
                hand: (!hand.is_empty()).then_some(&hand),
                pinch: reading.map(|r| r.pinch),
                control: self.shown,
                fingers: reading.map(|r| r.fingers),
                handedness_label: handedness.label(),
                fps,
            },
        );
        self.surface
            .present(&frame)
            .context("failed to present frame")?;
        self.state = LoopState::Rendered;

        if let Some(reading) = &reading {
            log::debug!(
                "distance {:.1}px -> volume {:.2} ({:.0}%), {} fingers up {:?}",
                reading.distance,
                reading.control.raw_value,
                reading.control.display_percent,
                reading.fingers.extended_count(),
                reading.fingers.bits()
            );
        }

        Ok(Some(CycleReport {
            hand_state,
            reading,
            volume_applied,
            fps,
        }))
    }

    fn locate_hand(&mut self, frame: &Frame) -> (HandFrame, Handedness) {
        let output = match self.detector.detect(frame) {
            Ok(output) => output,
            Err(err) => {
                log::warn!("hand detection failed: {err:?}");
                return (HandFrame::empty(), Handedness::Unknown);
            }
        };

        let hand_index = self.settings.hand_index;
        match landmarks::extract(&output, frame.width, frame.height, hand_index) {
            Ok(hand) => match output.hands.get(hand_index) {
                Some(detected) => {
                    log::debug!(
                        "{:?} hand detected with confidence {:.2}",
                        detected.handedness,
                        detected.score
                    );
                    (hand, detected.handedness)
                }
                None => (hand, Handedness::Unknown),
            },
            Err(err) => {
                log::warn!("discarding detection: {err}");
                (HandFrame::empty(), Handedness::Unknown)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, time::Duration};

    use anyhow::anyhow;

    use super::*;
    use crate::{
        audio::{DEFAULT_DB_RANGE, DryRunEndpoint},
        error::ControlError,
        pipeline::overlay::{BLUE, Canvas, GREEN},
        types::{DetectedHand, DetectorOutput, NUM_LANDMARKS, NormalizedLandmark},
    };

    const WIDTH: u32 = 640;
    const HEIGHT: u32 = 480;

    /// Yields blank frames; `None` entries fail the capture.
    struct ScriptedSource {
        script: VecDeque<Option<()>>,
    }

    impl ScriptedSource {
        fn healthy() -> Self {
            Self {
                script: VecDeque::new(),
            }
        }

        fn with_script(script: &[Option<()>]) -> Self {
            Self {
                script: script.iter().copied().collect(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Frame> {
            match self.script.pop_front() {
                Some(None) => Err(anyhow!("device busy")),
                _ => Ok(Frame::blank(WIDTH, HEIGHT)),
            }
        }
    }

    /// Replays detections in order, then reports no hands.
    struct ScriptedDetector {
        script: VecDeque<Result<DetectorOutput>>,
    }

    impl ScriptedDetector {
        fn new(script: Vec<Result<DetectorOutput>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl HandDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<DetectorOutput> {
            self.script
                .pop_front()
                .unwrap_or_else(|| Ok(DetectorOutput::none()))
        }
    }

    struct RecordingSurface {
        presented: Vec<Frame>,
        visible_for: usize,
    }

    impl RecordingSurface {
        fn visible_for(frames: usize) -> Self {
            Self {
                presented: Vec::new(),
                visible_for: frames,
            }
        }

        fn pixel(&self, frame: usize, x: i32, y: i32) -> Option<[u8; 4]> {
            let mut frame = self.presented[frame].clone();
            Canvas::new(&mut frame).pixel(x, y)
        }
    }

    impl FeedbackSurface for RecordingSurface {
        fn present(&mut self, frame: &Frame) -> Result<()> {
            self.presented.push(frame.clone());
            Ok(())
        }

        fn is_visible(&self) -> bool {
            self.presented.len() < self.visible_for
        }
    }

    struct FailingEndpoint;

    impl AudioEndpoint for FailingEndpoint {
        fn volume_range(&self) -> (f32, f32) {
            DEFAULT_DB_RANGE
        }

        fn set_volume(&mut self, _level: f32) -> Result<()> {
            Err(anyhow!("endpoint unplugged"))
        }
    }

    /// A detection whose thumb and index tips land on the given pixels.
    fn hand_with_tips(thumb: (i32, i32), index: (i32, i32)) -> DetectorOutput {
        let mut points = vec![(500, 400); NUM_LANDMARKS];
        points[THUMB_TIP] = thumb;
        points[INDEX_TIP] = index;
        DetectorOutput {
            hands: vec![DetectedHand {
                landmarks: points
                    .iter()
                    .map(|&(x, y)| NormalizedLandmark {
                        x: (x as f32 + 0.5) / WIDTH as f32,
                        y: (y as f32 + 0.5) / HEIGHT as f32,
                        z: 0.0,
                    })
                    .collect(),
                score: 0.9,
                handedness: Handedness::Right,
            }],
        }
    }

    fn control_loop(
        detections: Vec<Result<DetectorOutput>>,
    ) -> ControlLoop<ScriptedSource, ScriptedDetector, DryRunEndpoint, RecordingSurface> {
        ControlLoop::new(
            ScriptedSource::healthy(),
            ScriptedDetector::new(detections),
            DryRunEndpoint::default(),
            RecordingSurface::visible_for(usize::MAX),
            LoopSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn closed_pinch_sets_minimum_volume() {
        let mut control = control_loop(vec![Ok(hand_with_tips((100, 100), (100, 150)))]);
        let report = control.run_cycle(Instant::now()).unwrap().unwrap();

        assert_eq!(report.hand_state, LoopState::HasHand);
        let reading = report.reading.unwrap();
        assert_eq!(reading.distance, 50.0);
        assert_eq!(reading.control.raw_value, DEFAULT_DB_RANGE.0);
        assert_eq!(reading.control.display_bar, 400.0);
        assert_eq!(reading.control.display_percent, 0.0);
        assert!(reading.pinch.closed);
        assert_eq!(reading.pinch.center, (100, 125));

        assert!(report.volume_applied);
        assert_eq!(control.audio().applied(), &[DEFAULT_DB_RANGE.0]);
        assert_eq!(control.state(), LoopState::Rendered);
        assert_eq!(control.surface().pixel(0, 100, 125), Some(GREEN));
    }

    #[test]
    fn wide_pinch_sets_maximum_volume() {
        let mut control = control_loop(vec![Ok(hand_with_tips((100, 50), (100, 400)))]);
        let reading = control
            .run_cycle(Instant::now())
            .unwrap()
            .unwrap()
            .reading
            .unwrap();

        assert_eq!(reading.control.raw_value, DEFAULT_DB_RANGE.1);
        assert_eq!(reading.control.display_percent, 100.0);
        assert!(!reading.pinch.closed);
        assert_eq!(control.surface().pixel(0, 67, 200), Some(BLUE));
    }

    #[test]
    fn no_hand_renders_without_touching_volume() {
        let mut control = control_loop(Vec::new());
        let report = control.run_cycle(Instant::now()).unwrap().unwrap();

        assert_eq!(report.hand_state, LoopState::NoHand);
        assert!(report.reading.is_none());
        assert!(!report.volume_applied);
        assert!(control.audio().applied().is_empty());
        assert_eq!(control.surface().presented.len(), 1);
        assert_eq!(control.surface().pixel(0, 67, 300), Some([0, 0, 0, 255]));
    }

    #[test]
    fn bar_keeps_last_applied_level_when_hand_leaves() {
        let mut control = control_loop(vec![Ok(hand_with_tips((100, 50), (100, 400)))]);
        let start = Instant::now();
        control.run_cycle(start).unwrap();
        let report = control
            .run_cycle(start + Duration::from_millis(33))
            .unwrap()
            .unwrap();

        assert_eq!(report.hand_state, LoopState::NoHand);
        assert_eq!(control.audio().applied().len(), 1);
        assert_eq!(control.surface().pixel(1, 67, 200), Some(BLUE));
    }

    #[test]
    fn first_frame_has_no_frame_rate() {
        let mut control = control_loop(Vec::new());
        let start = Instant::now();
        let first = control.run_cycle(start).unwrap().unwrap();
        let second = control
            .run_cycle(start + Duration::from_millis(50))
            .unwrap()
            .unwrap();

        assert_eq!(first.fps, None);
        let fps = second.fps.unwrap();
        assert!((fps - 20.0).abs() < 0.01, "fps was {fps}");
    }

    #[test]
    fn identical_timestamps_do_not_divide_by_zero() {
        let mut timing = FrameTiming::default();
        let now = Instant::now();
        assert_eq!(timing.tick(now), None);
        assert_eq!(timing.tick(now), None);
    }

    #[test]
    fn detector_failure_skips_control_but_renders() {
        let mut control = control_loop(vec![Err(anyhow!("inference failed"))]);
        let report = control.run_cycle(Instant::now()).unwrap().unwrap();

        assert_eq!(report.hand_state, LoopState::NoHand);
        assert!(control.audio().applied().is_empty());
        assert_eq!(control.surface().presented.len(), 1);
    }

    #[test]
    fn out_of_range_hand_index_is_not_applied() {
        let mut control = ControlLoop::new(
            ScriptedSource::healthy(),
            ScriptedDetector::new(vec![Ok(hand_with_tips((100, 100), (300, 300)))]),
            DryRunEndpoint::default(),
            RecordingSurface::visible_for(usize::MAX),
            LoopSettings {
                hand_index: 1,
                ..LoopSettings::default()
            },
        )
        .unwrap();

        let report = control.run_cycle(Instant::now()).unwrap().unwrap();
        assert_eq!(report.hand_state, LoopState::NoHand);
        assert!(control.audio().applied().is_empty());
    }

    #[test]
    fn audio_failure_is_reported_not_fatal() {
        let mut control = ControlLoop::new(
            ScriptedSource::healthy(),
            ScriptedDetector::new(vec![Ok(hand_with_tips((100, 100), (100, 225)))]),
            FailingEndpoint,
            RecordingSurface::visible_for(usize::MAX),
            LoopSettings::default(),
        )
        .unwrap();

        let report = control.run_cycle(Instant::now()).unwrap().unwrap();
        assert!(report.reading.is_some());
        assert!(!report.volume_applied);
        assert_eq!(control.surface().presented.len(), 1);
    }

    #[test]
    fn rejected_volume_leaves_bar_at_applied_level() {
        let mut control = ControlLoop::new(
            ScriptedSource::healthy(),
            ScriptedDetector::new(vec![Ok(hand_with_tips((100, 50), (100, 400)))]),
            FailingEndpoint,
            RecordingSurface::visible_for(usize::MAX),
            LoopSettings::default(),
        )
        .unwrap();
        let start = Instant::now();

        let report = control.run_cycle(start).unwrap().unwrap();
        assert_eq!(report.reading.unwrap().control.display_percent, 100.0);
        assert!(!report.volume_applied);
        assert_eq!(control.surface().pixel(0, 67, 200), Some([0, 0, 0, 255]));

        control
            .run_cycle(start + Duration::from_millis(33))
            .unwrap()
            .unwrap();
        assert_eq!(control.surface().pixel(1, 67, 200), Some([0, 0, 0, 255]));
        assert_eq!(control.surface().pixel(1, 67, 300), Some([0, 0, 0, 255]));
    }

    #[test]
    fn transient_capture_failure_is_skipped() {
        let mut control = ControlLoop::new(
            ScriptedSource::with_script(&[None, Some(())]),
            ScriptedDetector::new(Vec::new()),
            DryRunEndpoint::default(),
            RecordingSurface::visible_for(usize::MAX),
            LoopSettings::default(),
        )
        .unwrap();

        let now = Instant::now();
        assert!(control.run_cycle(now).unwrap().is_none());
        assert!(control.run_cycle(now).unwrap().is_some());
    }

    #[test]
    fn repeated_capture_failure_is_fatal() {
        let mut control = ControlLoop::new(
            ScriptedSource::with_script(&[None, None, None]),
            ScriptedDetector::new(Vec::new()),
            DryRunEndpoint::default(),
            RecordingSurface::visible_for(usize::MAX),
            LoopSettings {
                max_capture_failures: 2,
                ..LoopSettings::default()
            },
        )
        .unwrap();

        let now = Instant::now();
        assert!(control.run_cycle(now).unwrap().is_none());
        assert!(control.run_cycle(now).unwrap().is_none());
        assert!(control.run_cycle(now).is_err());
    }

    #[test]
    fn run_stops_when_surface_closes() {
        let mut control = ControlLoop::new(
            ScriptedSource::healthy(),
            ScriptedDetector::new(Vec::new()),
            DryRunEndpoint::default(),
            RecordingSurface::visible_for(3),
            LoopSettings::default(),
        )
        .unwrap();

        control.run(|| false).unwrap();
        assert_eq!(control.surface().presented.len(), 3);
        assert_eq!(control.state(), LoopState::Stopped);
    }

    #[test]
    fn run_stops_on_predicate() {
        let mut control = control_loop(Vec::new());
        let mut polls = 0;
        control
            .run(|| {
                polls += 1;
                polls == 5
            })
            .unwrap();

        assert_eq!(control.surface().presented.len(), 5);
        assert_eq!(control.state(), LoopState::Stopped);
    }

    #[test]
    fn degenerate_volume_range_is_rejected() {
        let result = ControlLoop::new(
            ScriptedSource::healthy(),
            ScriptedDetector::new(Vec::new()),
            DryRunEndpoint::new((f32::NAN, 0.0)),
            RecordingSurface::visible_for(1),
            LoopSettings::default(),
        );
        assert!(matches!(
            result.err(),
            Some(ControlError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn read_hand_on_empty_frame_fails() {
        let mapping = VolumeMapping::new(DEFAULT_DB_RANGE).unwrap();
        assert!(matches!(
            read_hand(&HandFrame::empty(), &mapping),
            Err(ControlError::InvalidInput(_))
        ));
    }
}
