use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use super::AudioEngineHandle;
use crate::alert::AlertChannel;
use crate::error::{MonitorError, MonitorResult};
use crate::models::ChannelKind;

/// Loops the configured alert sound file.
pub struct PrimaryAudio {
    engine: AudioEngineHandle,
    sound_path: Option<PathBuf>,
    volume: f32,
    active: bool,
}

impl PrimaryAudio {
    pub fn new(sound_path: Option<PathBuf>, volume: f32) -> Self {
        Self {
            engine: AudioEngineHandle::new("primary"),
            sound_path,
            volume,
            active: false,
        }
    }
}

#[async_trait]
impl AlertChannel for PrimaryAudio {
    fn kind(&self) -> ChannelKind {
        ChannelKind::PrimaryAudio
    }

    async fn start(&mut self) -> MonitorResult<()> {
        let path = self
            .sound_path
            .clone()
            .ok_or_else(|| MonitorError::channel(self.kind(), "no alert sound configured"))?;

        self.engine
            .play_file(path, self.volume)
            .await
            .map_err(|e| MonitorError::channel(ChannelKind::PrimaryAudio, e.to_string()))?;
        self.active = true;
        Ok(())
    }

    async fn stop(&mut self) {
        self.engine.stop();
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active && self.engine.is_playing()
    }
}

/// Generated alarm beep, used when the sound file cannot be played.
pub struct SynthesizedAudio {
    engine: AudioEngineHandle,
    period: Duration,
    volume: f32,
    active: bool,
}

impl SynthesizedAudio {
    pub fn new(period: Duration, volume: f32) -> Self {
        Self {
            engine: AudioEngineHandle::new("synthesized"),
            period,
            volume,
            active: false,
        }
    }
}

#[async_trait]
impl AlertChannel for SynthesizedAudio {
    fn kind(&self) -> ChannelKind {
        ChannelKind::SynthesizedAudio
    }

    async fn start(&mut self) -> MonitorResult<()> {
        self.engine
            .play_tone(self.period, self.volume)
            .await
            .map_err(|e| MonitorError::channel(ChannelKind::SynthesizedAudio, e.to_string()))?;
        self.active = true;
        Ok(())
    }

    async fn stop(&mut self) {
        self.engine.stop();
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active && self.engine.is_playing()
    }
}
