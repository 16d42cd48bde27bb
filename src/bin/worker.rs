use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use image_insight::{
    config::AppConfig,
    db::{self, PgMetadataStore},
    services::{
        analysis::AnalysisProcessor,
        queue::{JobQueue, Redelivery, RedisJobQueue},
        storage::BucketClient,
        vision::WorkersAiClient,
    },
};

#[tokio::main]
async fn main() -> ExitCode {
    image_insight::init_tracing();

    tracing::info!("Starting analysis worker");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Worker failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    // Worker metrics scrape endpoint
    let metrics_addr: SocketAddr = config.worker_metrics_addr.parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    tracing::info!(addr = %metrics_addr, "Serving worker metrics");

    metrics::describe_histogram!(
        "analysis_processing_seconds",
        "Time to process an image analysis job"
    );
    metrics::describe_counter!(
        "analysis_jobs_completed",
        "Total analysis jobs completed"
    );
    metrics::describe_counter!(
        "analysis_jobs_failed",
        "Total analysis job attempts that failed"
    );
    metrics::describe_counter!(
        "analysis_jobs_skipped",
        "Jobs dropped because their image was deleted"
    );

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url).await?;

    tracing::info!("Initializing services");
    let storage = BucketClient::new(
        &config.s3_bucket,
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_access_key,
        &config.s3_secret_key,
    )?;
    let queue = RedisJobQueue::new(
        &config.redis_url,
        config.queue_max_deliveries,
        config.queue_visibility_timeout(),
    )?;
    let model = WorkersAiClient::new(&config.cf_account_id, &config.cf_api_token, &config.vision_model);

    let processor = AnalysisProcessor::new(
        Arc::new(PgMetadataStore::new(db_pool)),
        Arc::new(storage),
        Arc::new(model),
    );
    let poll_interval = Duration::from_millis(config.worker_poll_interval_ms);

    tracing::info!("Worker ready, starting job processing loop");

    loop {
        match process_next_job(&queue, &processor).await {
            Ok(true) => {
                tracing::debug!("Job handled, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No jobs available, sleeping");
                sleep(poll_interval).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Queue error, backing off");
                sleep(poll_interval).await;
            }
        }
    }
}

/// Handle the next queued job.
/// Returns Ok(true) if a job was handled, Ok(false) if the queue was empty.
async fn process_next_job(
    queue: &dyn JobQueue,
    processor: &AnalysisProcessor,
) -> Result<bool, Box<dyn std::error::Error>> {
    let Some(delivery) = queue.receive().await? else {
        return Ok(false);
    };

    match processor.process(&delivery.job).await {
        Ok(_) => queue.ack(&delivery).await?,
        Err(e) => match queue.nack(&delivery).await? {
            Redelivery::Requeued { attempt } => tracing::info!(
                image_id = %delivery.job.image_id,
                attempt,
                retryable = e.is_retryable(),
                "Job returned to queue"
            ),
            Redelivery::DeadLettered => tracing::warn!(
                image_id = %delivery.job.image_id,
                attempts = delivery.attempts + 1,
                "Job moved to dead-letter list"
            ),
            Redelivery::Expired => tracing::warn!(
                image_id = %delivery.job.image_id,
                "Delivery expired before nack, already redelivered"
            ),
        },
    }

    Ok(true)
}
