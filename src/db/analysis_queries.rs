use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::db::parse_status;
use crate::models::analysis::AnalysisRecord;

const ANALYSIS_COLUMNS: &str =
    "id, user_id, filename, description, keywords, detected_text, status, error, analyzed_at";

/// Insert an analysis, or overwrite the existing one for the same image
pub async fn upsert_analysis(pool: &PgPool, analysis: &AnalysisRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO image_analyses (id, user_id, filename, description, keywords, detected_text,
                                    status, error, analyzed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO UPDATE
        SET description = EXCLUDED.description,
            keywords = EXCLUDED.keywords,
            detected_text = EXCLUDED.detected_text,
            status = EXCLUDED.status,
            error = EXCLUDED.error,
            analyzed_at = EXCLUDED.analyzed_at,
            updated_at = NOW()
        "#,
    )
    .bind(&analysis.id)
    .bind(&analysis.user_id)
    .bind(&analysis.filename)
    .bind(&analysis.description)
    .bind(&analysis.keywords)
    .bind(&analysis.detected_text)
    .bind(analysis.status.to_string())
    .bind(analysis.error.as_deref())
    .bind(analysis.analyzed_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_analysis(pool: &PgPool, id: &str) -> Result<Option<AnalysisRecord>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM image_analyses WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| analysis_from_row(&r)).transpose()
}

pub async fn list_analyses(
    pool: &PgPool,
    owner: Option<&str>,
) -> Result<Vec<AnalysisRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM image_analyses \
         WHERE ($1::TEXT IS NULL OR user_id = $1) \
         ORDER BY created_at DESC"
    ))
    .bind(owner)
    .fetch_all(pool)
    .await?;

    rows.iter().map(analysis_from_row).collect()
}

pub async fn delete_analysis(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM image_analyses WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

fn analysis_from_row(r: &PgRow) -> Result<AnalysisRecord, sqlx::Error> {
    let status: String = r.try_get("status")?;

    Ok(AnalysisRecord {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        filename: r.try_get("filename")?,
        description: r.try_get("description")?,
        keywords: r.try_get("keywords")?,
        detected_text: r.try_get("detected_text")?,
        status: parse_status("status", &status)?,
        error: r.try_get("error")?,
        analyzed_at: r.try_get("analyzed_at")?,
    })
}
