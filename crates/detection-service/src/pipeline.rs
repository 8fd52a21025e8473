//! The detection background loop

use crate::control::{Gate, LoopControl};
use crate::sink::{EpisodeRecord, EventSink};
use crate::RuntimeConfig;
use alerting::{AlertStage, BuzzerController, StageTracker, StageTransition};
use arc_swap::ArcSwap;
use camera_capture::{FrameSource, VideoFrame};
use dms::{DetectionConfig, DetectorSet, FrameAnalysis};
use frame_buffer::{EventKind, EventNotice, FacialMetrics, SharedFrameBuffer};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Components shared between the service and every loop it starts
#[derive(Clone)]
pub struct LoopShared {
    pub config: Arc<ArcSwap<RuntimeConfig>>,
    pub buffer: Arc<SharedFrameBuffer>,
    pub buzzer: Arc<BuzzerController>,
    pub sink: Arc<dyn EventSink>,
}

/// Outcome of one processed frame
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub sequence: u64,
    pub stage: AlertStage,
    pub eye_transition: Option<StageTransition>,
    pub yawn_confirmed: bool,
    pub phone_onset: bool,
}

fn eye_tracker(config: &DetectionConfig) -> StageTracker {
    let d = &config.drowsiness;
    StageTracker::new(
        d.eye_aspect_ratio_consec_frames,
        d.effective_escalation_frames(),
        d.recovery_frames,
    )
}

fn mouth_tracker(config: &DetectionConfig) -> StageTracker {
    let d = &config.drowsiness;
    StageTracker::single_stage(d.mouth_aspect_ratio_consec_frames, d.recovery_frames)
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Owns the frame source and detectors for one start..stop run
pub struct DetectionLoop {
    source: Box<dyn FrameSource>,
    detectors: DetectorSet,
    shared: LoopShared,
    control: Arc<LoopControl>,
    /// Snapshot the detectors and trackers were last configured with
    applied: Arc<RuntimeConfig>,
    eye: StageTracker,
    mouth: StageTracker,
    calling: bool,
}

impl DetectionLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        detectors: DetectorSet,
        shared: LoopShared,
        control: Arc<LoopControl>,
    ) -> Self {
        let applied = shared.config.load_full();
        let mut detectors = detectors;
        if let Err(e) = detectors.reinitialize_configuration(&applied.detection) {
            warn!("Starting with unvalidated detection settings: {}", e);
        }
        Self {
            source,
            detectors,
            eye: eye_tracker(&applied.detection),
            mouth: mouth_tracker(&applied.detection),
            applied,
            shared,
            control,
            calling: false,
        }
    }

    /// Current eye-closure stage
    pub fn stage(&self) -> AlertStage {
        self.eye.stage()
    }

    /// Loop until stopped; returns the detectors for the next run
    pub fn run(mut self) -> DetectorSet {
        info!("Detection loop started");
        loop {
            match self.control.gate() {
                Gate::Stop => break,
                Gate::Paused => {
                    self.on_pause();
                    if !self.control.wait_resumed() {
                        break;
                    }
                    info!("Detection loop resumed");
                    continue;
                }
                Gate::Run => {}
            }

            let started = Instant::now();
            self.step();
            metrics::histogram!("detection_cycle_seconds").record(started.elapsed().as_secs_f64());

            let remaining = self.applied.frame_interval().saturating_sub(started.elapsed());
            if !self.control.sleep(remaining) {
                break;
            }
        }

        self.source.release();
        self.shared.buzzer.drive(AlertStage::None);
        info!("Detection loop stopped");
        self.detectors
    }

    fn on_pause(&mut self) {
        info!("Detection loop paused");
        self.eye.reset();
        self.mouth.reset();
        self.calling = false;
        self.shared.buzzer.drive(AlertStage::None);
        metrics::gauge!("detection_alert_stage").set(0.0);
    }

    /// Apply a new configuration snapshot if one was published
    fn refresh_config(&mut self) {
        let current = self.shared.config.load_full();
        if Arc::ptr_eq(&current, &self.applied) {
            return;
        }
        if current.detection != self.applied.detection {
            match self.detectors.reinitialize_configuration(&current.detection) {
                Ok(()) => {
                    let d = &current.detection.drowsiness;
                    self.eye.retarget(
                        d.eye_aspect_ratio_consec_frames,
                        d.effective_escalation_frames(),
                        d.recovery_frames,
                    );
                    self.mouth.retarget(d.mouth_aspect_ratio_consec_frames, 0, d.recovery_frames);
                    info!("Detection loop picked up new settings");
                }
                Err(e) => warn!("Ignoring invalid detection settings: {}", e),
            }
        }
        self.applied = current;
    }

    /// Run one capture/detect/alert/publish cycle. `None` when the
    /// capture failed and the cycle was skipped.
    pub fn step(&mut self) -> Option<CycleReport> {
        let raw = match self.source.capture() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Frame capture failed: {}", e);
                metrics::counter!("detection_capture_failures_total").increment(1);
                return None;
            }
        };
        metrics::counter!("detection_frames_total").increment(1);

        self.refresh_config();
        let config = Arc::clone(&self.applied);
        let analysis = self
            .detectors
            .analyze(&raw, &config.detection, &config.enabled);
        if !analysis.failed.is_empty() {
            metrics::counter!("detection_detector_failures_total")
                .increment(analysis.failed.len() as u64);
        }

        let eye_transition = self.eye.update(analysis.eyes_closed());
        let yawn_confirmed = matches!(
            self.mouth.update(analysis.yawning()),
            Some(StageTransition::Entered(_))
        );
        let stage = self.eye.stage();

        self.shared.buzzer.drive(stage);
        metrics::gauge!("detection_alert_stage").set(stage.level() as f64);

        let processed = self.annotate(&raw, &analysis, stage, &config.detection);
        let timestamp_ms = now_ms();
        let notice = |kind, stage: u8| EventNotice {
            kind,
            stage,
            ear: analysis.ear(),
            mar: analysis.mar(),
            timestamp_ms,
        };

        let drowsy = match eye_transition {
            Some(StageTransition::Entered(s)) => {
                metrics::counter!("detection_episodes_total").increment(1);
                info!("Drowsiness episode entered ({})", s);
                Some(notice(EventKind::Drowsiness, s.level()))
            }
            Some(StageTransition::Escalated(s)) => {
                info!("Drowsiness escalated to {}", s);
                Some(notice(EventKind::Drowsiness, s.level()))
            }
            Some(StageTransition::Cleared) => {
                info!("Drowsiness episode cleared");
                None
            }
            None => None,
        };
        let yawn = yawn_confirmed.then(|| {
            info!("Yawn confirmed");
            notice(EventKind::Yawning, 0)
        });

        if drowsy.is_some() || yawn.is_some() {
            self.shared
                .buffer
                .update_drowsiness_event_recent(drowsy.clone(), yawn.clone());
            for n in drowsy.into_iter().chain(yawn) {
                self.shared.sink.record(EpisodeRecord {
                    notice: n,
                    frame: processed.clone(),
                });
            }
        }

        let is_calling = analysis.is_calling();
        let phone_onset = is_calling && !self.calling;
        self.calling = is_calling;
        if phone_onset {
            info!("Phone use detected");
            let n = notice(EventKind::PhoneUse, 0);
            self.shared.buffer.publish(n.clone());
            self.shared.sink.notify(n);
        }

        let sequence = raw.sequence;
        let metrics = FacialMetrics {
            ear: analysis.ear(),
            mar: analysis.mar(),
            is_drowsy: stage > AlertStage::None,
            is_calling,
        };
        self.shared.buffer.update_cycle(raw, processed, metrics);
        debug!("Cycle {} done at {}", sequence, stage);

        Some(CycleReport {
            sequence,
            stage,
            eye_transition,
            yawn_confirmed,
            phone_onset,
        })
    }

    fn annotate(
        &self,
        raw: &VideoFrame,
        analysis: &FrameAnalysis,
        stage: AlertStage,
        config: &DetectionConfig,
    ) -> VideoFrame {
        match dms::annotate(raw, analysis, stage.color(), config.drowsiness.apply_masking) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Annotation failed: {}", e);
                raw.clone()
            }
        }
    }
}
