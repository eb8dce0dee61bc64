//! Command-line front end: run one monitoring session over a video file.
//!
//! ```bash
//! stillwatch ward-3.mp4 --patient-id P-104 --patient-name "Ada L."
//! STILLWATCH_API_BASE=http://gpu-box:5000 stillwatch clip.webm --duration 42
//! ```
//! Press Enter to acknowledge the alert that is currently escalating.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};

use stillwatch::alert::{
    AlertEscalator, EscalatorConfig, EventSurface, PulseState, SignalChannels, SurfaceEvent,
    VisualPulse,
};
use stillwatch::analysis::{HttpAnalysisProvider, MediaSource};
use stillwatch::audio::{PrimaryAudio, SynthesizedAudio};
use stillwatch::history::{Database, DiscardHistory, HistoryEmitter, HistorySink};
use stillwatch::models::{PatientRef, SessionEvent};
use stillwatch::playback::{probe_duration, MediaPlayer, SimulatedPlayer};
use stillwatch::session::{PlaybackSynchronizer, SynchronizerConfig};
use stillwatch::utils::logging;
use stillwatch::{MonitorController, MonitorError, MonitorSettings, SettingsStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video file to analyse
    video: PathBuf,

    #[arg(long, default_value = "N/A")]
    patient_id: String,

    #[arg(long, default_value = "Unknown")]
    patient_name: String,

    #[arg(long)]
    room: Option<String>,

    /// Media duration in seconds; probed with ffprobe when omitted
    #[arg(long)]
    duration: Option<f64>,

    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Name recorded on acknowledgments
    #[arg(long, default_value = "operator")]
    identity: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(log::LevelFilter::Info);
    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => SettingsStore::new(path.clone())?.current(),
        None => MonitorSettings::default(),
    }
    .with_env_overrides();
    settings.validate().context("invalid settings")?;

    let sink: Arc<dyn HistorySink> = match &settings.database_path {
        Some(path) => Arc::new(Database::new(path.clone())?),
        None => Arc::new(DiscardHistory),
    };
    let history = HistoryEmitter::new(sink);

    let media = MediaSource::open(&args.video).await?;
    if !media.is_video() {
        warn!("{} does not look like a video file", media.file_name);
    }
    let duration = match args.duration {
        Some(duration) => duration,
        None => probe_duration(&args.video)
            .await
            .map_err(|e| MonitorError::InvalidMedia(format!("{e:#}")))?,
    };

    let visual = VisualPulse::new();
    spawn_pulse_printer(visual.subscribe());
    let channels = SignalChannels {
        primary: Box::new(PrimaryAudio::new(
            settings.alert_sound_path.clone(),
            settings.alert_volume,
        )),
        synthesized: Box::new(SynthesizedAudio::new(
            Duration::from_secs_f64(settings.beep_period_secs),
            settings.alert_volume,
        )),
        visual: Box::new(visual),
    };

    let surface = EventSurface::new();
    spawn_prompt_printer(surface.subscribe());
    let escalator = AlertEscalator::spawn(
        channels,
        Arc::new(surface),
        history.clone(),
        EscalatorConfig {
            repeat: settings.alert_repeat(),
            visual_with_audio: settings.visual_pulse_with_audio,
        },
    );

    let provider =
        HttpAnalysisProvider::new(&settings.analysis_base_url, settings.request_timeout())?;
    info!("analysis endpoint: {}", provider.endpoint());
    let synchronizer = PlaybackSynchronizer::new(
        Arc::new(provider),
        escalator.clone(),
        history.clone(),
        SynchronizerConfig::from(&settings),
    );
    let controller = MonitorController::new(synchronizer, escalator);
    spawn_acknowledger(controller.clone(), args.identity.clone());

    let mut patient = PatientRef::new(args.patient_id, args.patient_name);
    patient.room = args.room;
    let player: Arc<dyn MediaPlayer> =
        Arc::new(SimulatedPlayer::new(duration, settings.clock_tick()));
    let mut handle = controller.start_session(player, media, patient).await;

    loop {
        tokio::select! {
            event = handle.events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                controller.cancel_session().await;
            }
        }
    }
    let report = handle.finish().await?;

    if !report.alert_ids.is_empty() {
        println!("Waiting for pending alerts to be acknowledged (Enter to acknowledge, Ctrl-C to dismiss)");
        loop {
            if controller.alert_snapshot().await?.current.is_none() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                _ = tokio::signal::ctrl_c() => {
                    let dismissed = controller.dismiss_alerts().await?;
                    warn!("{dismissed} alert(s) left unacknowledged");
                    break;
                }
            }
        }
    }

    history.flush().await;
    match report.error {
        None | Some(MonitorError::Cancelled) => Ok(()),
        Some(err) => Err(anyhow!(err)),
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Progress(progress) => println!(
            "[{:>5.1}%] window {}/{} ({:.1}s - {:.1}s)",
            progress.percent,
            progress.interval_index + 1,
            progress.total_intervals,
            progress.start_time,
            progress.end_time
        ),
        SessionEvent::AlertRaised {
            alert_id,
            interval_index,
        } => println!("alert {alert_id} raised for window {}", interval_index + 1),
        SessionEvent::Completed { summary } => {
            println!("Dominant position: {}", summary.dominant_label);
            println!("Average confidence: {:.2}", summary.average_confidence);
            for share in &summary.labels {
                println!(
                    "  {:<12} {:>4} frames ({:.1}%)",
                    share.label,
                    share.count,
                    share.probability * 100.0
                );
            }
            println!("{}", summary.movement_summary);
        }
        SessionEvent::Failed { error } => eprintln!("analysis failed: {error}"),
        SessionEvent::Cancelled => println!("analysis cancelled"),
    }
}

fn spawn_prompt_printer(mut prompts: broadcast::Receiver<SurfaceEvent>) {
    tokio::spawn(async move {
        loop {
            match prompts.recv().await {
                Ok(SurfaceEvent::Presented(prompt)) => {
                    println!();
                    println!("!!! NO MOVEMENT DETECTED !!!");
                    println!("  Time range: {}", prompt.time_range);
                    println!("  Position:   {}", prompt.dominant_label);
                    println!("  Patient:    {} ({})", prompt.patient_name, prompt.patient_id);
                    if prompt.queued > 0 {
                        println!("  {} more alert(s) waiting", prompt.queued);
                    }
                    println!("Press Enter to acknowledge.");
                }
                Ok(SurfaceEvent::Dismissed { alert_id }) => println!("alert {alert_id} closed"),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn spawn_pulse_printer(mut pulse: watch::Receiver<PulseState>) {
    tokio::spawn(async move {
        while pulse.changed().await.is_ok() {
            if let PulseState::Pulsing { beat } = *pulse.borrow_and_update() {
                eprintln!("\x07*** acknowledge pending alert ({beat}) ***");
            }
        }
    });
}

fn spawn_acknowledger(controller: MonitorController, identity: String) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            match controller.acknowledge_current_alert(&identity).await {
                Ok(Some(alert)) => println!("alert {} acknowledged by {identity}", alert.id),
                Ok(None) => println!("no alert pending"),
                Err(err) => {
                    warn!("{err}");
                    break;
                }
            }
        }
    });
}
