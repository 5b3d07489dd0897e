use crate::{DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: Option<String>,
    pub image: Option<String>,
    pub role: String,
}

impl UserRow {
    /// Name shown to other participants. Falls back to a short id tag.
    pub fn display_name(&self) -> String {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                let id = self.id.to_string();
                format!("user-{}", &id[..id.len().min(6)])
            })
    }
}

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    username: Option<&str>,
    image: Option<&str>,
    role: &str,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, username, image, role, created_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, username, image, role",
    )
    .bind(id)
    .bind(username)
    .bind(image)
    .bind(role)
    .bind(chrono::Utc::now().timestamp_millis())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, image, role FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    #[tokio::test]
    async fn create_and_fetch_user() {
        let pool = test_pool().await;
        create_user(&pool, 5, Some("carla"), Some("https://img/c.png"), "ADMIN")
            .await
            .unwrap();
        let user = get_user(&pool, 5).await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("carla"));
        assert_eq!(user.role, "ADMIN");
        assert!(get_user(&pool, 6).await.unwrap().is_none());
    }

    #[test]
    fn display_name_falls_back_to_id_tag() {
        let user = UserRow {
            id: 123456789,
            username: Some("  ".into()),
            image: None,
            role: "USER".into(),
        };
        assert_eq!(user.display_name(), "user-123456");
    }
}
