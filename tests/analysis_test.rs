//! Analysis processing against in-memory collaborators.

mod helpers;

use async_trait::async_trait;
use std::sync::Arc;

use helpers::*;
use image_insight::models::analysis::AnalysisStatus;
use image_insight::models::image::{ImageRecord, ImageStatus};
use image_insight::models::job::AnalysisJob;
use image_insight::models::analysis::AnalysisRecord;
use image_insight::services::analysis::{AnalysisError, AnalysisProcessor, JobOutcome};
use image_insight::services::queue::{JobQueue, Redelivery};
use image_insight::services::storage::ObjectStore;
use image_insight::services::vision::{ModelError, VisionModel};
use image_insight::db::MetadataStore;

const COMPLETION: &str = "DESCRIPTION: A brown dog sitting on a porch.\n\
                          KEYWORDS: [dog, porch, brown, pet, sitting]\n\
                          DETECTED_TEXT: [WELCOME]";

struct Fixture {
    store: Arc<MemoryStore>,
    storage: Arc<MemoryStorage>,
    model: Arc<ScriptedModel>,
    processor: AnalysisProcessor,
    job: AnalysisJob,
}

fn completed(outcome: JobOutcome) -> AnalysisRecord {
    match outcome {
        JobOutcome::Completed(record) => record,
        other => panic!("expected a completed analysis, got {other:?}"),
    }
}

async fn fixture(responses: Vec<Result<String, u16>>, store_object: bool) -> Fixture {
    let store = Arc::new(MemoryStore::default());
    let storage = Arc::new(MemoryStorage::default());
    let model = Arc::new(ScriptedModel::new(responses));

    let record = ImageRecord {
        id: "img-1".to_string(),
        user_id: "alice".to_string(),
        filename: "img-1.jpg".to_string(),
        original_name: "dog.jpg".to_string(),
        mimetype: "image/jpeg".to_string(),
        size: 128,
        uploaded_at: chrono::Utc::now(),
        path: "uploads/alice/img-1.jpg".to_string(),
        status: ImageStatus::Uploaded,
        location: None,
        taken_at: None,
    };
    store.insert_image(&record).await.unwrap();
    if store_object {
        storage
            .put(&record.path, &jpeg_bytes(128), "image/jpeg")
            .await
            .unwrap();
    }

    let processor = AnalysisProcessor::new(store.clone(), storage.clone(), model.clone());
    Fixture {
        store,
        storage,
        model,
        processor,
        job: AnalysisJob::for_image(&record, "corr-1"),
    }
}

#[tokio::test]
async fn successful_job_records_parsed_analysis() {
    let f = fixture(vec![Ok(COMPLETION.to_string())], true).await;

    let record = completed(f.processor.process(&f.job).await.unwrap());

    assert_eq!(record.status, AnalysisStatus::Completed);
    assert_eq!(record.description, "A brown dog sitting on a porch.");
    assert_eq!(record.keywords, vec!["dog", "porch", "brown", "pet", "sitting"]);
    assert_eq!(record.detected_text, vec!["WELCOME"]);
    assert!(record.analyzed_at.is_some());

    let writes = f.store.analysis_writes.lock().unwrap();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].status, AnalysisStatus::Processing);
    assert_eq!(writes[1].status, AnalysisStatus::Completed);

    let image = f.store.images.lock().unwrap().get("img-1").cloned().unwrap();
    assert_eq!(image.status, ImageStatus::Analyzed);

    let calls = f.model.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[(128, "image/jpeg".to_string())]);
    assert_eq!(f.storage.objects.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unstructured_completion_still_completes() {
    let f = fixture(vec![Ok("I cannot describe this.".to_string())], true).await;

    let record = completed(f.processor.process(&f.job).await.unwrap());

    assert_eq!(record.status, AnalysisStatus::Completed);
    assert_eq!(record.description, "Image analysis completed");
    assert_eq!(record.keywords.len(), 2);
}

#[tokio::test]
async fn model_failure_is_recorded_and_returned() {
    let f = fixture(vec![Err(503)], true).await;

    let err = f.processor.process(&f.job).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Model(_)));
    assert!(err.is_retryable());

    let analysis = f.store.analyses.lock().unwrap().get("img-1").cloned().unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Failed);
    assert!(analysis.error.unwrap().contains("503"));

    let image = f.store.images.lock().unwrap().get("img-1").cloned().unwrap();
    assert_eq!(image.status, ImageStatus::Failed);
}

#[tokio::test]
async fn missing_object_is_permanent_failure() {
    let f = fixture(vec![Ok(COMPLETION.to_string())], false).await;

    let err = f.processor.process(&f.job).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Storage(_)));
    assert!(!err.is_retryable());
    assert!(f.model.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn queue_redelivers_then_dead_letters() {
    let f = fixture(vec![Err(500), Err(500)], true).await;
    let queue = MemoryQueue::with_max_deliveries(2);
    queue.enqueue(&f.job).await.unwrap();

    let first = queue.receive().await.unwrap().unwrap();
    assert!(f.processor.process(&first.job).await.is_err());
    assert_eq!(
        queue.nack(&first).await.unwrap(),
        Redelivery::Requeued { attempt: 1 }
    );

    let second = queue.receive().await.unwrap().unwrap();
    assert_eq!(second.attempts, 1);
    assert!(f.processor.process(&second.job).await.is_err());
    assert_eq!(queue.nack(&second).await.unwrap(), Redelivery::DeadLettered);

    assert!(queue.receive().await.unwrap().is_none());
    assert_eq!(queue.dead_letter.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn redelivered_job_can_succeed() {
    let f = fixture(vec![Err(429), Ok(COMPLETION.to_string())], true).await;

    assert!(f.processor.process(&f.job).await.is_err());
    let record = completed(f.processor.process(&f.job).await.unwrap());

    assert_eq!(record.status, AnalysisStatus::Completed);
    assert!(record.error.is_none());
    let image = f.store.images.lock().unwrap().get("img-1").cloned().unwrap();
    assert_eq!(image.status, ImageStatus::Analyzed);
}

#[tokio::test]
async fn job_for_deleted_image_is_dropped_without_writes() {
    let f = fixture(vec![Ok(COMPLETION.to_string())], true).await;
    let queue = MemoryQueue::with_max_deliveries(3);
    queue.enqueue(&f.job).await.unwrap();

    // Same order as the delete route: object, analysis, image.
    f.storage.delete(&f.job.path).await.unwrap();
    f.store.delete_analysis(&f.job.image_id).await.unwrap();
    f.store.delete_image(&f.job.image_id).await.unwrap();

    let delivery = queue.receive().await.unwrap().unwrap();
    let outcome = f.processor.process(&delivery.job).await.unwrap();
    assert_eq!(outcome, JobOutcome::ImageDeleted);
    queue.ack(&delivery).await.unwrap();

    assert!(f.store.analyses.lock().unwrap().is_empty());
    assert!(f.store.analysis_writes.lock().unwrap().is_empty());
    assert!(f.store.images.lock().unwrap().is_empty());
    assert!(f.model.calls.lock().unwrap().is_empty());
    assert_eq!(queue.acked.lock().unwrap().len(), 1);
    assert!(queue.dead_letter.lock().unwrap().is_empty());
}

/// Deletes the image and its object while "thinking", then answers.
struct DeletingModel {
    store: Arc<MemoryStore>,
    storage: Arc<MemoryStorage>,
    image_id: String,
    path: String,
    fail: bool,
}

#[async_trait]
impl VisionModel for DeletingModel {
    async fn describe(&self, _image: &[u8], _content_type: &str) -> Result<String, ModelError> {
        self.storage.delete(&self.path).await.unwrap();
        self.store.delete_analysis(&self.image_id).await.unwrap();
        self.store.delete_image(&self.image_id).await.unwrap();
        if self.fail {
            Err(ModelError::Status {
                status: 500,
                body: "boom".to_string(),
            })
        } else {
            Ok(COMPLETION.to_string())
        }
    }
}

async fn delete_during_analysis(fail: bool) -> (Fixture, JobOutcome) {
    let f = fixture(vec![], true).await;
    let model = Arc::new(DeletingModel {
        store: f.store.clone(),
        storage: f.storage.clone(),
        image_id: f.job.image_id.clone(),
        path: f.job.path.clone(),
        fail,
    });
    let processor = AnalysisProcessor::new(f.store.clone(), f.storage.clone(), model);
    let outcome = processor.process(&f.job).await.unwrap();
    (f, outcome)
}

#[tokio::test]
async fn image_deleted_during_analysis_leaves_no_record() {
    let (f, outcome) = delete_during_analysis(false).await;

    assert_eq!(outcome, JobOutcome::ImageDeleted);
    assert!(f.store.analyses.lock().unwrap().is_empty());
    assert!(f.store.images.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failure_after_image_deleted_is_not_recorded() {
    let (f, outcome) = delete_during_analysis(true).await;

    assert_eq!(outcome, JobOutcome::ImageDeleted);
    assert!(f.store.analyses.lock().unwrap().is_empty());
    assert!(f
        .store
        .analysis_writes
        .lock()
        .unwrap()
        .iter()
        .all(|a| a.status != AnalysisStatus::Failed));
}
