use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::RwLock,
    time::Duration,
};

use crate::models::DEFAULT_INTERVAL_SECS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub interval_secs: f64,
    /// How far playback may overshoot a window end before it is seeked back.
    pub drift_tolerance_secs: f64,
    pub alert_repeat_secs: f64,
    pub clock_tick_ms: u64,
    pub analysis_base_url: String,
    pub request_timeout_secs: u64,
    pub alert_sound_path: Option<PathBuf>,
    pub alert_volume: f32,
    pub beep_period_secs: f64,
    pub visual_pulse_with_audio: bool,
    pub database_path: Option<PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            drift_tolerance_secs: 0.5,
            alert_repeat_secs: 5.0,
            clock_tick_ms: 250,
            analysis_base_url: "http://127.0.0.1:5000".into(),
            request_timeout_secs: 120,
            alert_sound_path: None,
            alert_volume: 1.0,
            beep_period_secs: 2.0,
            visual_pulse_with_audio: true,
            database_path: None,
        }
    }
}

impl MonitorSettings {
    /// Apply `STILLWATCH_*` environment overrides on top of the loaded values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base) = std::env::var("STILLWATCH_API_BASE") {
            if !base.trim().is_empty() {
                self.analysis_base_url = base.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(path) = std::env::var("STILLWATCH_ALERT_SOUND") {
            if !path.trim().is_empty() {
                self.alert_sound_path = Some(PathBuf::from(path.trim()));
            }
        }
        let debug_mode = std::env::var("STILLWATCH_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            self.clock_tick_ms = 100;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.interval_secs.is_finite() && self.interval_secs > 0.0) {
            return Err(anyhow!("intervalSecs must be positive"));
        }
        if !(self.drift_tolerance_secs.is_finite() && self.drift_tolerance_secs >= 0.0) {
            return Err(anyhow!("driftToleranceSecs must not be negative"));
        }
        if !(self.alert_repeat_secs.is_finite() && self.alert_repeat_secs > 0.0) {
            return Err(anyhow!("alertRepeatSecs must be positive"));
        }
        if !(self.beep_period_secs.is_finite() && self.beep_period_secs > 0.0) {
            return Err(anyhow!("beepPeriodSecs must be positive"));
        }
        if self.clock_tick_ms == 0 {
            return Err(anyhow!("clockTickMs must be greater than zero"));
        }
        Ok(())
    }

    pub fn alert_repeat(&self) -> Duration {
        Duration::from_secs_f64(self.alert_repeat_secs)
    }

    pub fn clock_tick(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<MonitorSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    log::warn!(
                        "Ignoring unreadable settings at {}: {err}",
                        path.display()
                    );
                    MonitorSettings::default()
                }
            }
        } else {
            MonitorSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> MonitorSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: MonitorSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: MonitorSettings = serde_json::from_str(&contents)?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
