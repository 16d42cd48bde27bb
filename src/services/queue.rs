use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::job::AnalysisJob;

const QUEUE_KEY: &str = "image_insight:jobs";
const PROCESSING_KEY: &str = "image_insight:processing";
/// Sorted set of in-flight payloads scored by visibility deadline (unix millis).
const INFLIGHT_KEY: &str = "image_insight:inflight";
const DEAD_LETTER_KEY: &str = "image_insight:dead_letter";

/// Pop the next payload into the processing list and start its visibility timer.
const RECEIVE_SCRIPT: &str = r#"
local payload = redis.call('RPOPLPUSH', KEYS[1], KEYS[2])
if payload then
    redis.call('ZADD', KEYS[3], ARGV[1], payload)
end
return payload
"#;

/// Move an in-flight payload to a target list. Returns 0 if another consumer
/// already settled it.
const SETTLE_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[2], ARGV[1]) == 0 then
    return 0
end
redis.call('LREM', KEYS[1], 1, ARGV[1])
if ARGV[2] ~= '' then
    redis.call('LPUSH', KEYS[3], ARGV[2])
end
return 1
"#;

/// A received job plus the bookkeeping needed to acknowledge it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub job: AnalysisJob,
    /// Deliveries before this one.
    pub attempts: u32,
    /// Exact payload held in the in-flight list.
    pub receipt: String,
}

/// What the queue did with a negatively acknowledged delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redelivery {
    Requeued { attempt: u32 },
    DeadLettered,
    /// The visibility timeout expired first and the queue already redelivered it.
    Expired,
}

/// Redelivery decision for a delivery that failed on its `attempt`-th try.
pub fn redelivery_for(attempt: u32, max_deliveries: u32) -> Redelivery {
    if attempt >= max_deliveries.max(1) {
        Redelivery::DeadLettered
    } else {
        Redelivery::Requeued { attempt }
    }
}

/// Analysis job queue. Redelivery and dead-lettering belong to the queue,
/// consumers only ack or nack.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<(), QueueError>;

    /// Next pending job, if any. The job stays in flight until acked, nacked
    /// or its visibility timeout expires.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    async fn nack(&self, delivery: &Delivery) -> Result<Redelivery, QueueError>;

    async fn depth(&self) -> Result<u64, QueueError>;

    async fn ping(&self) -> Result<(), QueueError>;
}

/// Payload serialized into Redis.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    attempts: u32,
    job: AnalysisJob,
}

/// Redis list-backed queue with an in-flight list, a visibility timeout and a
/// dead-letter list.
pub struct RedisJobQueue {
    client: redis::Client,
    max_deliveries: u32,
    visibility_timeout: Duration,
}

impl RedisJobQueue {
    pub fn new(
        redis_url: &str,
        max_deliveries: u32,
        visibility_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            max_deliveries: max_deliveries.max(1),
            visibility_timeout,
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Atomically take `receipt` out of flight and push `payload` onto `target`.
    /// An empty `payload` only removes it.
    async fn settle(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        receipt: &str,
        target: &str,
        payload: &str,
    ) -> Result<bool, QueueError> {
        let settled: i32 = redis::Script::new(SETTLE_SCRIPT)
            .key(PROCESSING_KEY)
            .key(INFLIGHT_KEY)
            .key(target)
            .arg(receipt)
            .arg(payload)
            .invoke_async(conn)
            .await?;
        Ok(settled == 1)
    }

    /// Requeue or dead-letter a failed delivery.
    async fn redeliver(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        receipt: &str,
        job: &AnalysisJob,
        attempt: u32,
    ) -> Result<Redelivery, QueueError> {
        let payload = serde_json::to_string(&Envelope {
            attempts: attempt,
            job: job.clone(),
        })?;

        let decision = redelivery_for(attempt, self.max_deliveries);
        let target = match decision {
            Redelivery::DeadLettered => DEAD_LETTER_KEY,
            _ => QUEUE_KEY,
        };

        if self.settle(conn, receipt, target, &payload).await? {
            Ok(decision)
        } else {
            Ok(Redelivery::Expired)
        }
    }

    /// Return deliveries whose visibility timeout has passed, counting each as
    /// a failed attempt.
    async fn reclaim_expired(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
    ) -> Result<(), QueueError> {
        let now = Utc::now().timestamp_millis();
        let expired: Vec<String> = conn.zrangebyscore(INFLIGHT_KEY, "-inf", now).await?;

        for receipt in expired {
            match serde_json::from_str::<Envelope>(&receipt) {
                Ok(envelope) => {
                    let outcome = self
                        .redeliver(conn, &receipt, &envelope.job, envelope.attempts + 1)
                        .await?;
                    tracing::warn!(
                        image_id = %envelope.job.image_id,
                        outcome = ?outcome,
                        "Reclaimed expired delivery"
                    );
                }
                Err(_) => {
                    self.settle(conn, &receipt, DEAD_LETTER_KEY, &receipt).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(&Envelope {
            attempts: 0,
            job: job.clone(),
        })?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload).await?;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        self.reclaim_expired(&mut conn).await?;

        let deadline =
            Utc::now().timestamp_millis() + self.visibility_timeout.as_millis() as i64;
        let result: Option<String> = redis::Script::new(RECEIVE_SCRIPT)
            .key(QUEUE_KEY)
            .key(PROCESSING_KEY)
            .key(INFLIGHT_KEY)
            .arg(deadline)
            .invoke_async(&mut conn)
            .await?;

        match result {
            Some(payload) => match serde_json::from_str::<Envelope>(&payload) {
                Ok(envelope) => Ok(Some(Delivery {
                    job: envelope.job,
                    attempts: envelope.attempts,
                    receipt: payload,
                })),
                Err(e) => {
                    // Unreadable payloads can never succeed, park them.
                    self.settle(&mut conn, &payload, DEAD_LETTER_KEY, &payload)
                        .await?;
                    Err(QueueError::Serialize(e))
                }
            },
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        self.settle(&mut conn, &delivery.receipt, DEAD_LETTER_KEY, "")
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery) -> Result<Redelivery, QueueError> {
        let mut conn = self.connection().await?;
        self.redeliver(
            &mut conn,
            &delivery.receipt,
            &delivery.job,
            delivery.attempts + 1,
        )
        .await
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(QUEUE_KEY).await?;
        Ok(depth)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
