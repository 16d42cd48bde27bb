//! Analysis job processing.
//!
//! A job moves the image to `processing`, runs the vision model and stores the
//! parsed result. On failure the analysis is recorded as failed and the error is
//! returned so the queue's redelivery policy decides what happens next. Jobs for
//! images deleted in the meantime are dropped without leaving an analysis behind.

use std::sync::Arc;
use std::time::Instant;

use crate::db::{MetadataStore, StoreError};
use crate::models::analysis::AnalysisRecord;
use crate::models::image::ImageStatus;
use crate::models::job::AnalysisJob;
use crate::services::response_parser::parse_model_response;
use crate::services::storage::{ObjectStore, StorageError};
use crate::services::vision::{ModelError, VisionModel};

/// Collaborators needed to process analysis jobs.
#[derive(Clone)]
pub struct AnalysisProcessor {
    store: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStore>,
    model: Arc<dyn VisionModel>,
}

impl AnalysisProcessor {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        model: Arc<dyn VisionModel>,
    ) -> Self {
        Self {
            store,
            storage,
            model,
        }
    }

    /// Process one job to completion.
    pub async fn process(&self, job: &AnalysisJob) -> Result<JobOutcome, AnalysisError> {
        let start = Instant::now();
        tracing::info!(
            image_id = %job.image_id,
            user_id = %job.user_id,
            correlation_id = %job.correlation_id,
            "Processing analysis job"
        );

        match self.run(job).await {
            Ok(JobOutcome::Completed(record)) => {
                metrics::counter!("analysis_jobs_completed").increment(1);
                metrics::histogram!("analysis_processing_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::info!(
                    image_id = %job.image_id,
                    correlation_id = %job.correlation_id,
                    keywords = record.keywords.len(),
                    detected_text = record.detected_text.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Analysis completed"
                );
                Ok(JobOutcome::Completed(record))
            }
            Ok(JobOutcome::ImageDeleted) => Ok(self.skip(job)),
            Err(e) => {
                if !self.record_failure(job, &e).await {
                    return Ok(self.skip(job));
                }
                metrics::counter!("analysis_jobs_failed").increment(1);
                tracing::error!(
                    image_id = %job.image_id,
                    correlation_id = %job.correlation_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Analysis failed"
                );
                Err(e)
            }
        }
    }

    async fn run(&self, job: &AnalysisJob) -> Result<JobOutcome, AnalysisError> {
        if self.store.get_image(&job.image_id).await?.is_none() {
            return Ok(JobOutcome::ImageDeleted);
        }

        self.store
            .update_image_status(&job.image_id, ImageStatus::Processing)
            .await?;
        self.store
            .put_analysis(&AnalysisRecord::processing(job))
            .await?;

        let image = self.storage.get(&job.path).await?;

        let model_start = Instant::now();
        let completion = self.model.describe(&image, &job.mimetype).await?;
        tracing::debug!(
            image_id = %job.image_id,
            model_duration_ms = model_start.elapsed().as_millis() as u64,
            "Vision model responded"
        );

        let record = AnalysisRecord::completed(job, parse_model_response(&completion));
        self.store.put_analysis(&record).await?;

        // Deleted while the model was running
        if self.store.get_image(&job.image_id).await?.is_none() {
            self.store.delete_analysis(&job.image_id).await?;
            return Ok(JobOutcome::ImageDeleted);
        }
        self.store
            .update_image_status(&job.image_id, ImageStatus::Analyzed)
            .await?;

        Ok(JobOutcome::Completed(record))
    }

    fn skip(&self, job: &AnalysisJob) -> JobOutcome {
        metrics::counter!("analysis_jobs_skipped").increment(1);
        tracing::info!(
            image_id = %job.image_id,
            correlation_id = %job.correlation_id,
            "Image no longer exists, dropping job"
        );
        JobOutcome::ImageDeleted
    }

    /// Best-effort failure bookkeeping; errors here are logged, not returned.
    /// Returns false when the image has been deleted, after removing any
    /// analysis written for it.
    async fn record_failure(&self, job: &AnalysisJob, error: &AnalysisError) -> bool {
        match self.store.get_image(&job.image_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Err(e) = self.store.delete_analysis(&job.image_id).await {
                    tracing::warn!(image_id = %job.image_id, error = %e, "Failed to remove orphaned analysis");
                }
                return false;
            }
            Err(e) => {
                tracing::warn!(image_id = %job.image_id, error = %e, "Failed to look up image after failure");
            }
        }

        if let Err(e) = self
            .store
            .put_analysis(&AnalysisRecord::failed(job, error.to_string()))
            .await
        {
            tracing::warn!(image_id = %job.image_id, error = %e, "Failed to record failed analysis");
        }
        if let Err(e) = self
            .store
            .update_image_status(&job.image_id, ImageStatus::Failed)
            .await
        {
            tracing::warn!(image_id = %job.image_id, error = %e, "Failed to mark image as failed");
        }
        true
    }
}

/// Result of a successfully handled job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(AnalysisRecord),
    /// The image was deleted before or during analysis. Nothing is kept.
    ImageDeleted,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl AnalysisError {
    /// Whether a redelivery could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Store(_) => true,
            AnalysisError::Storage(StorageError::NotFound(_) | StorageError::Config(_)) => false,
            AnalysisError::Storage(_) => true,
            AnalysisError::Model(ModelError::Status { status, .. }) => {
                *status == 429 || *status >= 500
            }
            AnalysisError::Model(ModelError::Rejected(_)) => false,
            AnalysisError::Model(ModelError::Http(_)) => true,
        }
    }
}
