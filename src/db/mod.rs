use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::str::FromStr;
use std::time::Duration;

use crate::models::analysis::AnalysisRecord;
use crate::models::image::{ImageRecord, ImageStatus};

pub mod analysis_queries;
pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Parse a TEXT status column, failing the row decode on unknown values.
pub(crate) fn parse_status<T>(column: &str, value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = strum::ParseError>,
{
    value.parse().map_err(|e| {
        tracing::warn!(column, value, "Unknown status value in database");
        sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        }
    })
}

/// Image and analysis metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_image(&self, image: &ImageRecord) -> Result<(), StoreError>;

    async fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, StoreError>;

    /// Newest first. `None` lists every owner.
    async fn list_images(&self, owner: Option<&str>) -> Result<Vec<ImageRecord>, StoreError>;

    async fn update_image_status(&self, id: &str, status: ImageStatus) -> Result<(), StoreError>;

    async fn delete_image(&self, id: &str) -> Result<(), StoreError>;

    /// Insert or overwrite the analysis for an image.
    async fn put_analysis(&self, analysis: &AnalysisRecord) -> Result<(), StoreError>;

    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError>;

    async fn list_analyses(&self, owner: Option<&str>) -> Result<Vec<AnalysisRecord>, StoreError>;

    async fn delete_analysis(&self, id: &str) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// [`MetadataStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn insert_image(&self, image: &ImageRecord) -> Result<(), StoreError> {
        Ok(queries::insert_image(&self.pool, image).await?)
    }

    async fn get_image(&self, id: &str) -> Result<Option<ImageRecord>, StoreError> {
        Ok(queries::get_image(&self.pool, id).await?)
    }

    async fn list_images(&self, owner: Option<&str>) -> Result<Vec<ImageRecord>, StoreError> {
        Ok(queries::list_images(&self.pool, owner).await?)
    }

    async fn update_image_status(&self, id: &str, status: ImageStatus) -> Result<(), StoreError> {
        Ok(queries::update_image_status(&self.pool, id, status).await?)
    }

    async fn delete_image(&self, id: &str) -> Result<(), StoreError> {
        Ok(queries::delete_image(&self.pool, id).await?)
    }

    async fn put_analysis(&self, analysis: &AnalysisRecord) -> Result<(), StoreError> {
        Ok(analysis_queries::upsert_analysis(&self.pool, analysis).await?)
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        Ok(analysis_queries::get_analysis(&self.pool, id).await?)
    }

    async fn list_analyses(&self, owner: Option<&str>) -> Result<Vec<AnalysisRecord>, StoreError> {
        Ok(analysis_queries::list_analyses(&self.pool, owner).await?)
    }

    async fn delete_analysis(&self, id: &str) -> Result<(), StoreError> {
        Ok(analysis_queries::delete_analysis(&self.pool, id).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
