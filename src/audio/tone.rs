use rodio::Source;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44100;
const BEEP_SECS: f32 = 0.5;
const SWEEP_SECS: f32 = 0.1;
const START_FREQ: f32 = 440.0;
const END_FREQ: f32 = 880.0;
const START_GAIN: f32 = 0.5;
const END_GAIN: f32 = 0.01;

/// Repeating alarm beep.
/// Each cycle is a square wave sweeping 440 → 880 Hz over 100 ms while its
/// gain decays 0.5 → 0.01 over 500 ms, followed by silence until the next
/// cycle starts. Never ends on its own; stop the sink to silence it.
pub struct AlarmTone {
    sample_rate: u32,
    cycle_samples: usize,
    num_sample: usize,
    phase: f32,
}

impl AlarmTone {
    pub fn new(period: Duration) -> Self {
        let period_secs = period.as_secs_f32().max(BEEP_SECS);
        Self {
            sample_rate: SAMPLE_RATE,
            cycle_samples: (period_secs * SAMPLE_RATE as f32) as usize,
            num_sample: 0,
            phase: 0.0,
        }
    }

    fn frequency_at(t: f32) -> f32 {
        let progress = (t / SWEEP_SECS).min(1.0);
        START_FREQ * (END_FREQ / START_FREQ).powf(progress)
    }

    fn gain_at(t: f32) -> f32 {
        START_GAIN * (END_GAIN / START_GAIN).powf(t / BEEP_SECS)
    }
}

impl Iterator for AlarmTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.num_sample % self.cycle_samples;
        self.num_sample = self.num_sample.wrapping_add(1);

        let t = position as f32 / self.sample_rate as f32;
        if t >= BEEP_SECS {
            self.phase = 0.0;
            return Some(0.0);
        }

        self.phase = (self.phase + Self::frequency_at(t) / self.sample_rate as f32).fract();
        let square = if self.phase < 0.5 { 1.0 } else { -1.0 };
        Some(square * Self::gain_at(t))
    }
}

impl Source for AlarmTone {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
