use crate::{DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomRow {
    pub id: i64,
    pub slug: Option<String>,
    pub name: String,
}

pub async fn create_room(
    pool: &DbPool,
    id: i64,
    slug: Option<&str>,
    name: &str,
    created_at_ms: i64,
) -> Result<RoomRow, DbError> {
    let row = sqlx::query_as::<_, RoomRow>(
        "INSERT INTO rooms (id, slug, name, created_at_ms)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id, slug, name",
    )
    .bind(id)
    .bind(slug)
    .bind(name)
    .bind(created_at_ms)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_room(pool: &DbPool, id: i64) -> Result<Option<RoomRow>, DbError> {
    let row = sqlx::query_as::<_, RoomRow>("SELECT id, slug, name FROM rooms WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}
