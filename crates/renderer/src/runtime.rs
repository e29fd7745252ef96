use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Seconds added to the time uniform per frame under the default clock.
pub const DEFAULT_TIME_STEP: f32 = 0.02;

/// High-level behaviour requested by the caller.
///
/// The render policy decides whether frames should animate continuously,
/// be evaluated at a fixed timestamp, or be exported to disk.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPolicy {
    /// Run the render loop continuously, optionally clamping the frame rate.
    Animate {
        /// Optional requested frames-per-second cap.
        target_fps: Option<f32>,
    },
    /// Render a still frame at an optional timestamp and keep presenting it.
    Still {
        /// Specific timestamp to evaluate the effect at (seconds).
        time: Option<f32>,
    },
    /// Render one frame offscreen and write the result to disk.
    Export {
        /// Specific timestamp to evaluate the effect at (seconds).
        time: Option<f32>,
        /// Destination path for the exported file.
        path: PathBuf,
        /// Output format the user requested.
        format: ExportFormat,
    },
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self::Animate { target_fps: None }
    }
}

/// File formats supported by the export pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
}

/// Where animation time comes from.
///
/// The default advances by a fixed 0.02 s every frame, which keeps frame N
/// deterministic regardless of how long the frame took to present. `RealTime`
/// trades that determinism for wall-clock accurate playback speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimePolicy {
    FixedStep { step: f32 },
    RealTime,
}

impl Default for TimePolicy {
    fn default() -> Self {
        Self::FixedStep {
            step: DEFAULT_TIME_STEP,
        }
    }
}

/// Snapshot of the time state supplied to the shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed animation time in seconds.
    pub seconds: f32,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f32, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where time values originate from.
pub trait TimeSource: Send {
    /// Resets the source to its initial state.
    fn reset(&mut self);
    /// Produces a time sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source that advances by a fixed step per sampled frame.
#[derive(Debug, Clone, Copy)]
pub struct FixedStepTimeSource {
    step: f32,
    frame: u64,
}

impl FixedStepTimeSource {
    pub fn new(step: f32) -> Self {
        Self { step, frame: 0 }
    }
}

impl TimeSource for FixedStepTimeSource {
    fn reset(&mut self) {
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.frame as f32 * self.step, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
        self.frame = 0;
    }

    fn sample(&mut self) -> TimeSample {
        let elapsed = self.origin.elapsed();
        let sample = TimeSample::new(elapsed.as_secs_f32(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Time source that always reports a fixed timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f32,
}

impl FixedTimeSource {
    pub fn new(time: f32) -> Self {
        Self { time }
    }
}

impl TimeSource for FixedTimeSource {
    fn reset(&mut self) {}

    fn sample(&mut self) -> TimeSample {
        TimeSample::new(self.time, 0)
    }
}

/// Convenient alias for owning time sources behind trait objects.
pub type BoxedTimeSource = Box<dyn TimeSource + Send>;

/// Builds a time source suited to the requested render policy.
pub fn time_source_for(policy: &RenderPolicy, timing: TimePolicy) -> BoxedTimeSource {
    match policy {
        RenderPolicy::Animate { .. } => match timing {
            TimePolicy::FixedStep { step } => Box::new(FixedStepTimeSource::new(step)),
            TimePolicy::RealTime => Box::new(SystemTimeSource::new()),
        },
        RenderPolicy::Still { time } | RenderPolicy::Export { time, .. } => {
            Box::new(FixedTimeSource::new(time.unwrap_or(0.0)))
        }
    }
}

/// Injectable limits that end the otherwise perpetual render loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StopConditions {
    /// Stop once this many frames have been rendered.
    pub max_frames: Option<u64>,
    /// Stop once this much wall-clock time has elapsed.
    pub max_runtime: Option<Duration>,
}

impl StopConditions {
    /// Run forever (until the window is closed).
    pub fn none() -> Self {
        Self::default()
    }

    pub fn reached(&self, frames_rendered: u64, started: Instant, now: Instant) -> bool {
        if let Some(max_frames) = self.max_frames {
            if frames_rendered >= max_frames {
                return true;
            }
        }
        if let Some(max_runtime) = self.max_runtime {
            if now.saturating_duration_since(started) >= max_runtime {
                return true;
            }
        }
        false
    }
}

/// Skips frames to honour an optional FPS cap.
///
/// The accumulator subtracts exactly one interval per rendered frame so a long
/// gap never produces a burst of catch-up frames.
#[derive(Debug)]
pub(crate) struct FramePacer {
    interval: Option<Duration>,
    accumulator: Duration,
    last_tick: Option<Instant>,
}

impl FramePacer {
    pub fn new(target_fps: Option<f32>) -> Self {
        let interval = target_fps
            .filter(|fps| *fps > 0.0)
            .map(|fps| Duration::from_secs_f32(1.0 / fps));
        Self {
            interval,
            accumulator: Duration::ZERO,
            last_tick: None,
        }
    }

    pub fn should_render(&mut self, now: Instant) -> bool {
        let Some(interval) = self.interval else {
            return true;
        };

        let Some(last) = self.last_tick.replace(now) else {
            return true;
        };

        let delta = now.saturating_duration_since(last);
        self.accumulator = self.accumulator.saturating_add(delta);
        if self.accumulator + Duration::from_micros(250) < interval {
            false
        } else {
            self.accumulator = self.accumulator.saturating_sub(interval);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_source_advances_by_exactly_one_step() {
        let mut source = FixedStepTimeSource::new(0.02);
        let first = source.sample();
        let second = source.sample();
        let third = source.sample();
        assert_eq!(first, TimeSample::new(0.0, 0));
        assert_eq!(second.frame_index, 1);
        assert!((second.seconds - 0.02).abs() < 1e-6);
        assert!((third.seconds - 0.04).abs() < 1e-6);
    }

    #[test]
    fn fixed_step_source_resets_to_frame_zero() {
        let mut source = FixedStepTimeSource::new(0.5);
        source.sample();
        source.sample();
        source.reset();
        assert_eq!(source.sample(), TimeSample::new(0.0, 0));
    }

    #[test]
    fn fixed_time_source_never_advances() {
        let mut source = FixedTimeSource::new(4.2);
        assert_eq!(source.sample(), TimeSample::new(4.2, 0));
        assert_eq!(source.sample(), TimeSample::new(4.2, 0));
    }

    #[test]
    fn system_source_is_monotonic() {
        let mut source = SystemTimeSource::new();
        let first = source.sample();
        let second = source.sample();
        assert!(second.seconds >= first.seconds);
        assert_eq!(second.frame_index, first.frame_index + 1);
    }

    #[test]
    fn still_policy_pins_the_timestamp() {
        let mut source = time_source_for(&RenderPolicy::Still { time: Some(1.5) }, TimePolicy::default());
        assert_eq!(source.sample().seconds, 1.5);
        assert_eq!(source.sample().seconds, 1.5);
    }

    #[test]
    fn stop_conditions_trigger_on_frame_budget() {
        let stop = StopConditions {
            max_frames: Some(3),
            max_runtime: None,
        };
        let started = Instant::now();
        assert!(!stop.reached(2, started, started));
        assert!(stop.reached(3, started, started));
        assert!(stop.reached(4, started, started));
    }

    #[test]
    fn stop_conditions_trigger_on_runtime() {
        let stop = StopConditions {
            max_frames: None,
            max_runtime: Some(Duration::from_secs(10)),
        };
        let started = Instant::now();
        assert!(!stop.reached(0, started, started + Duration::from_secs(9)));
        assert!(stop.reached(0, started, started + Duration::from_secs(10)));
    }

    #[test]
    fn unlimited_stop_conditions_never_trigger() {
        let stop = StopConditions::none();
        let started = Instant::now();
        assert!(!stop.reached(u64::MAX, started, started + Duration::from_secs(3600)));
    }

    #[test]
    fn uncapped_pacer_always_renders() {
        let mut pacer = FramePacer::new(None);
        let now = Instant::now();
        for tick in 0..5 {
            assert!(pacer.should_render(now + Duration::from_millis(tick)));
        }
    }

    #[test]
    fn capped_pacer_skips_fast_ticks() {
        // 10 FPS cap with ticks every 50 ms: every other tick renders.
        let mut pacer = FramePacer::new(Some(10.0));
        let start = Instant::now();
        assert!(pacer.should_render(start));

        let mut rendered = 0;
        for tick in 1..=8 {
            if pacer.should_render(start + Duration::from_millis(tick * 50)) {
                rendered += 1;
            }
        }
        assert_eq!(rendered, 4);
    }

    #[test]
    fn capped_pacer_consumes_one_interval_per_render() {
        let mut pacer = FramePacer::new(Some(10.0));
        let start = Instant::now();
        assert!(pacer.should_render(start));

        // A stall leaves the surplus in the accumulator; each subsequent
        // render drains exactly one interval of it.
        assert!(pacer.should_render(start + Duration::from_millis(350)));
        assert!(pacer.should_render(start + Duration::from_millis(351)));
        assert!(pacer.should_render(start + Duration::from_millis(352)));
        assert!(!pacer.should_render(start + Duration::from_millis(353)));
    }
}
