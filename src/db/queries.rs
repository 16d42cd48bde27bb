use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::db::parse_status;
use crate::models::image::{GeoPoint, ImageRecord, ImageStatus};

const IMAGE_COLUMNS: &str = "id, user_id, filename, original_name, mimetype, size, uploaded_at, \
                             path, status, latitude, longitude, taken_at";

/// Insert a new image record
pub async fn insert_image(pool: &PgPool, image: &ImageRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO images (id, user_id, filename, original_name, mimetype, size, uploaded_at,
                            path, status, latitude, longitude, taken_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(&image.id)
    .bind(&image.user_id)
    .bind(&image.filename)
    .bind(&image.original_name)
    .bind(&image.mimetype)
    .bind(image.size)
    .bind(image.uploaded_at)
    .bind(&image.path)
    .bind(image.status.to_string())
    .bind(image.location.map(|l| l.latitude))
    .bind(image.location.map(|l| l.longitude))
    .bind(image.taken_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get an image by ID
pub async fn get_image(pool: &PgPool, id: &str) -> Result<Option<ImageRecord>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(|r| image_from_row(&r)).transpose()
}

/// List images, newest first, optionally for a single owner
pub async fn list_images(
    pool: &PgPool,
    owner: Option<&str>,
) -> Result<Vec<ImageRecord>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        "SELECT {IMAGE_COLUMNS} FROM images \
         WHERE ($1::TEXT IS NULL OR user_id = $1) \
         ORDER BY uploaded_at DESC"
    ))
    .bind(owner)
    .fetch_all(pool)
    .await?;

    rows.iter().map(image_from_row).collect()
}

/// Update image status
pub async fn update_image_status(
    pool: &PgPool,
    id: &str,
    status: ImageStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE images SET status = $1 WHERE id = $2")
        .bind(status.to_string())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn delete_image(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM images WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

fn image_from_row(r: &PgRow) -> Result<ImageRecord, sqlx::Error> {
    let status: String = r.try_get("status")?;
    let latitude: Option<f64> = r.try_get("latitude")?;
    let longitude: Option<f64> = r.try_get("longitude")?;

    Ok(ImageRecord {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        filename: r.try_get("filename")?,
        original_name: r.try_get("original_name")?,
        mimetype: r.try_get("mimetype")?,
        size: r.try_get("size")?,
        uploaded_at: r.try_get("uploaded_at")?,
        path: r.try_get("path")?,
        status: parse_status("status", &status)?,
        location: latitude
            .zip(longitude)
            .map(|(latitude, longitude)| GeoPoint { latitude, longitude }),
        taken_at: r.try_get("taken_at")?,
    })
}
