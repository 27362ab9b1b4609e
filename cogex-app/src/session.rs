use crate::flanker::FlankerTrial;
use anyhow::{Context, Result};
use cogex_core::{StimulusType, TrialPlan};
use cogex_experiment::{
    InputSource, PresentationSurface, RunOutcome, Scheduler, SessionConfig, SessionReport,
};
use cogex_hardware::{edf_file_name, MarkerDispatcher, TextMarkerSink};
use cogex_timing::TimeSource;
use std::fs::{self, File};
use std::io::BufWriter;
use tracing::info;

/// Marker output for the eye tracker, written as a timestamped message file
/// next to the event log.
pub fn markers(config: &SessionConfig) -> Result<MarkerDispatcher> {
    let tracker = &config.hardware.eye_tracker;
    if !tracker.enabled {
        return Ok(MarkerDispatcher::disabled());
    }
    let name = edf_file_name(&tracker.file_prefix, &config.participant, &config.session);
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;
    let path = config.output_dir.join(format!("{name}.msg"));
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;

    let mut markers = MarkerDispatcher::new(Box::new(TextMarkerSink::new(BufWriter::new(file))));
    markers.open_data_file(&name);
    info!(path = %path.display(), data_file = %name, "marker output opened");
    Ok(markers)
}

/// Calibrates, waits for the trigger, runs an optional rest block and the
/// plan, then saves the log. A cancelled session is still saved.
pub fn run<T, S, I>(
    mut scheduler: Scheduler<T, S, I>,
    plan: TrialPlan<FlankerTrial>,
    rest: f64,
) -> Result<SessionReport>
where
    T: TimeSource,
    S: PresentationSurface<Content = StimulusType>,
    I: InputSource,
{
    scheduler.calibrate()?;
    let mut outcome = scheduler.wait_for_trigger()?;
    if outcome == RunOutcome::Completed && rest > 0.0 {
        outcome = scheduler.rest(rest)?;
    }
    if outcome == RunOutcome::Completed {
        outcome = scheduler.run(plan)?;
    }

    let report = scheduler.finish();
    let path = scheduler.save()?;
    info!(path = %path.display(), ?outcome, "event log saved");
    Ok(report)
}
