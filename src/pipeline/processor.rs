//! Drives photos through detection, segmentation, tracking, smoothing and
//! aggregation, writing each scene once it is finished.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use super::aggregator::SceneAggregator;
use super::identity::{CenterDistanceMatcher, IdentityMatcher, IdentityTracker};
use super::segmenter::{Boundary, SceneSegmenter};
use super::smoother::LabelSmoother;
use super::{
    FailedScene, PendingPhoto, PhotoFailure, PipelineSettings, ProcessedPhoto, RunSummary,
    SceneOutcome,
};
use crate::config::Config;
use crate::db::PhotoStore;
use crate::detection::{Detection, DetectionSource};

#[derive(Debug, Clone)]
pub enum PipelineProgress {
    Started { total: usize },
    Processing { current: usize, total: usize, path: String },
    SceneWritten { scene_id: i64, photos: usize, unique_identity_count: u32 },
    PhotoFailed { path: String, reason: String },
    Cancelled,
    Completed { photos_processed: usize, scenes: usize },
}

pub struct ScenePipeline<'a, S, P, M> {
    source: &'a S,
    store: &'a P,
    tracker: IdentityTracker<M>,
    settings: PipelineSettings,
    progress_tx: Option<mpsc::Sender<PipelineProgress>>,
}

impl<'a, S, P, M> ScenePipeline<'a, S, P, M>
where
    S: DetectionSource,
    P: PhotoStore,
    M: IdentityMatcher,
{
    pub fn new(source: &'a S, store: &'a P, matcher: M, settings: PipelineSettings) -> Self {
        Self {
            source,
            store,
            tracker: IdentityTracker::new(matcher),
            settings,
            progress_tx: None,
        }
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<PipelineProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Process `photos` in the given order, which must be ascending by
    /// capture time. The smoother is carried across scenes and across calls
    /// unless `reset_smoothing_per_scene` is set.
    ///
    /// A photo whose detection fails is left unprocessed and does not affect
    /// scene boundaries. When `cancel` is raised the scene being built is
    /// dropped; scenes already written stay written.
    pub fn run(
        &mut self,
        photos: &[PendingPhoto],
        smoother: &mut LabelSmoother,
        cancel: &AtomicBool,
    ) -> Result<RunSummary> {
        let total = photos.len();
        let mut summary = RunSummary::default();
        let mut segmenter = SceneSegmenter::new(self.settings.gap_threshold);
        let mut aggregator = SceneAggregator::new();
        let mut current: Option<u64> = None;

        self.tracker.reset();
        self.send(PipelineProgress::Started { total });
        tracing::info!(photos = total, "Starting scene pipeline run");

        for (index, photo) in photos.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                summary.cancelled = true;
                break;
            }

            self.send(PipelineProgress::Processing {
                current: index + 1,
                total,
                path: photo.path.to_string_lossy().to_string(),
            });

            let raw = match self.source.detect(&photo.path) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(path = %photo.path.display(), error = %e, "Detection failed, photo skipped");
                    let reason = e.to_string();
                    self.send(PipelineProgress::PhotoFailed {
                        path: photo.path.to_string_lossy().to_string(),
                        reason: reason.clone(),
                    });
                    summary.failures.push(PhotoFailure {
                        photo_id: photo.id,
                        path: photo.path.clone(),
                        reason,
                    });
                    continue;
                }
            };

            if let Some(last) = segmenter.last_timestamp() {
                if photo.capture_timestamp < last {
                    tracing::warn!(
                        path = %photo.path.display(),
                        capture = %photo.capture_timestamp,
                        previous = %last,
                        "Photo is older than its predecessor; input is not sorted"
                    );
                }
            }

            let key = match (segmenter.observe(photo.capture_timestamp), current) {
                (Boundary::SameScene, Some(key)) => key,
                _ => {
                    if let Some(finished) = current.take() {
                        self.flush(&mut aggregator, finished, &mut summary)?;
                    }
                    self.tracker.reset();
                    if self.settings.reset_smoothing_per_scene {
                        smoother.reset();
                    }
                    let key = aggregator.open();
                    current = Some(key);
                    key
                }
            };

            let mut detections = Vec::with_capacity(raw.len());
            for det in raw {
                let identity_id = self.tracker.assign(&det.bbox);
                let smoothed = smoother.smooth(&det.class_label, photo.capture_timestamp);
                detections.push(Detection {
                    bbox: det.bbox,
                    raw_class_label: det.class_label,
                    smoothed_class_label: smoothed,
                    identity_id,
                });
            }

            let processed = ProcessedPhoto::new(photo, detections);
            tracing::debug!(
                photo_id = photo.id,
                detections = processed.detection_count,
                provisional = processed.provisional_unique_count,
                "Photo processed"
            );
            aggregator.push(key, processed)?;
        }

        if summary.cancelled {
            summary.discarded_photos = aggregator
                .discard_all()
                .iter()
                .map(|scene| scene.photos().len())
                .sum();
            tracing::info!(
                discarded = summary.discarded_photos,
                "Run cancelled, open scene discarded"
            );
            self.send(PipelineProgress::Cancelled);
        } else if let Some(key) = current {
            self.flush(&mut aggregator, key, &mut summary)?;
        }

        tracing::info!(
            photos = summary.photos_processed,
            scenes = summary.scenes.len(),
            failures = summary.failures.len(),
            failed_scenes = summary.failed_scenes.len(),
            "Scene pipeline run finished"
        );
        self.send(PipelineProgress::Completed {
            photos_processed: summary.photos_processed,
            scenes: summary.scenes.len(),
        });

        Ok(summary)
    }

    /// Close, finalize and write one scene. A write that keeps failing is
    /// recorded in the summary rather than aborting the run.
    fn flush(
        &self,
        aggregator: &mut SceneAggregator,
        key: u64,
        summary: &mut RunSummary,
    ) -> Result<()> {
        aggregator.close(key)?;
        let scene = aggregator.finalize(key)?;

        let attempts = self.settings.flush_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.store.commit_scene(&scene) {
                Ok(scene_id) => {
                    tracing::info!(
                        scene_id,
                        photos = scene.photos().len(),
                        unique_identity_count = scene.unique_identity_count(),
                        "Scene written"
                    );
                    self.send(PipelineProgress::SceneWritten {
                        scene_id,
                        photos: scene.photos().len(),
                        unique_identity_count: scene.unique_identity_count(),
                    });
                    summary.photos_processed += scene.photos().len();
                    summary.scenes.push(SceneOutcome {
                        scene_id,
                        photo_ids: scene.photo_ids(),
                        unique_identity_count: scene.unique_identity_count(),
                    });
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %format!("{:#}", e), "Scene write failed");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| format!("{:#}", e))
            .unwrap_or_default();
        tracing::error!(photos = ?scene.photo_ids(), reason = %reason, "Scene not written, photos left unprocessed");
        summary.failed_scenes.push(FailedScene {
            photo_ids: scene.photo_ids(),
            reason,
        });
        Ok(())
    }

    fn send(&self, event: PipelineProgress) {
        if let Some(ref tx) = self.progress_tx {
            let _ = tx.send(event);
        }
    }
}

/// Run every unprocessed photo of `folder` through the pipeline with the
/// configured matcher and thresholds.
pub fn process_folder<S, P>(
    source: &S,
    store: &P,
    folder: &str,
    config: &Config,
    smoother: &mut LabelSmoother,
    cancel: &AtomicBool,
    progress_tx: Option<mpsc::Sender<PipelineProgress>>,
) -> Result<RunSummary>
where
    S: DetectionSource,
    P: PhotoStore,
{
    let mut pending = Vec::new();
    let mut untimed = Vec::new();
    for record in store.query_unprocessed_photos(folder)? {
        match record.pending() {
            Some(photo) => pending.push(photo),
            None => {
                tracing::warn!(path = %record.path, "Photo has no capture timestamp, left unprocessed");
                untimed.push(PhotoFailure {
                    photo_id: record.id,
                    path: PathBuf::from(&record.path),
                    reason: "no capture timestamp".to_string(),
                });
            }
        }
    }

    let matcher = CenterDistanceMatcher::new(config.pipeline.match_distance_px);
    let mut pipeline = ScenePipeline::new(source, store, matcher, config.pipeline.settings()?);
    if let Some(tx) = progress_tx {
        pipeline = pipeline.with_progress(tx);
    }
    let mut summary = pipeline.run(&pending, smoother, cancel)?;
    summary.failures.extend(untimed);
    Ok(summary)
}
