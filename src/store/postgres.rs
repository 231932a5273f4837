/// Postgres-backed store.
///
/// The handle owns its connection pool with an explicit `open`/`close`
/// lifecycle; nothing in the crate keeps ambient connection state. All
/// queries are runtime-checked and scoped to the owning user. Token-set
/// mutations are single conditional statements so their atomicity comes from
/// the database, not from application-level read-then-write.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::configuration::DatabaseSettings;
use crate::error::StoreError;
use crate::store::{
    CredentialStore, DeviceMeta, DeviceType, NewPrincipal, NewScheduledPost, Platform,
    PostFilter, PostPage, PostStats, PostStatus, PostStore, Principal, ScheduledPost,
};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

type PrincipalRow = (Uuid, String, String, String, DateTime<Utc>, DateTime<Utc>);
type PostRow = (
    Uuid,
    Uuid,
    String,
    String,
    DateTime<Utc>,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn principal_from_row(row: PrincipalRow) -> Principal {
    Principal {
        id: row.0,
        email: row.1,
        name: row.2,
        password_hash: row.3,
        created_at: row.4,
        updated_at: row.5,
    }
}

fn post_from_row(row: PostRow) -> Result<ScheduledPost, StoreError> {
    let platform = Platform::parse(&row.2)
        .ok_or_else(|| StoreError::Query(format!("unknown platform '{}'", row.2)))?;
    let status = PostStatus::parse(&row.5)
        .ok_or_else(|| StoreError::Query(format!("unknown post status '{}'", row.5)))?;

    Ok(ScheduledPost {
        id: row.0,
        user_id: row.1,
        platform,
        content: row.3,
        scheduled_for: row.4,
        status,
        created_at: row.6,
        updated_at: row.7,
    })
}

impl PgStore {
    /// Opens a pooled connection to the configured database. Pool acquisition
    /// is bounded; a saturated or unreachable backend surfaces as
    /// `StoreError::Unavailable`, never as a hang.
    pub async fn open(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&settings.connection_string())
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT id, email, name, password_hash, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(principal_from_row))
    }

    async fn find_principal_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT id, email, name, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(principal_from_row))
    }

    async fn create_principal(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&new.email)
        .bind(&new.name)
        .bind(&new.password_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Principal {
            id,
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_principal_owning_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, StoreError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT u.id, u.email, u.name, u.password_hash, u.created_at, u.updated_at
            FROM users u
            JOIN refresh_tokens rt ON rt.user_id = u.id
            WHERE rt.token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(principal_from_row))
    }

    async fn add_token(
        &self,
        principal_id: Uuid,
        token_hash: &str,
        meta: DeviceMeta,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_hash, user_id, device_label, device_type, issued_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(token_hash)
        .bind(principal_id)
        .bind(&meta.device_label)
        .bind(meta.device_type.as_str())
        .bind(meta.issued_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_token(
        &self,
        principal_id: Uuid,
        old_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError> {
        // One conditional UPDATE keyed on the old hash. Of two concurrent
        // rotations, the row matches for exactly one; the other sees zero
        // rows affected. Device metadata rides along untouched.
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET token_hash = $1, issued_at = $2
            WHERE token_hash = $3 AND user_id = $4
            "#,
        )
        .bind(new_hash)
        .bind(Utc::now())
        .bind(old_hash)
        .bind(principal_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_token(
        &self,
        principal_id: Uuid,
        token_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE token_hash = $1 AND user_id = $2
            "#,
        )
        .bind(token_hash)
        .bind(principal_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_all_tokens(&self, principal_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(principal_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn list_tokens(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<(String, DeviceMeta)>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            r#"
            SELECT token_hash, device_label, device_type, issued_at
            FROM refresh_tokens
            WHERE user_id = $1
            ORDER BY issued_at ASC
            "#,
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(hash, label, device_type, issued_at)| {
                let device_type = DeviceType::from_header(Some(&device_type));
                (
                    hash,
                    DeviceMeta {
                        device_label: label,
                        device_type,
                        issued_at,
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn create_post(&self, new: NewScheduledPost) -> Result<ScheduledPost, StoreError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO scheduled_posts
                (id, user_id, platform, content, scheduled_for, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(new.user_id)
        .bind(new.platform.as_str())
        .bind(&new.content)
        .bind(new.scheduled_for)
        .bind(PostStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(ScheduledPost {
            id,
            user_id: new.user_id,
            platform: new.platform,
            content: new.content,
            scheduled_for: new.scheduled_for,
            status: PostStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    async fn list_posts(
        &self,
        user_id: Uuid,
        filter: PostFilter,
        page: i64,
        limit: i64,
    ) -> Result<PostPage, StoreError> {
        let status = filter.status.map(|s| s.as_str());
        let platform = filter.platform.map(|p| p.as_str());
        let offset = (page - 1).max(0) * limit;

        let total_count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM scheduled_posts
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR platform = $3)
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(platform)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, user_id, platform, content, scheduled_for, status, created_at, updated_at
            FROM scheduled_posts
            WHERE user_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR platform = $3)
            ORDER BY scheduled_for ASC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(platform)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let posts = rows
            .into_iter()
            .map(post_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PostPage { posts, total_count })
    }

    async fn get_post(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<ScheduledPost>, StoreError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, user_id, platform, content, scheduled_for, status, created_at, updated_at
            FROM scheduled_posts
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(post_from_row).transpose()
    }

    async fn update_post_content(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        content: &str,
    ) -> Result<Option<ScheduledPost>, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET content = $1, updated_at = $2
            WHERE id = $3 AND user_id = $4
            "#,
        )
        .bind(content)
        .bind(Utc::now())
        .bind(post_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_post(user_id, post_id).await
    }

    async fn update_post_time(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<ScheduledPost>, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET scheduled_for = $1, updated_at = $2
            WHERE id = $3 AND user_id = $4
            "#,
        )
        .bind(scheduled_for)
        .bind(Utc::now())
        .bind(post_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_post(user_id, post_id).await
    }

    async fn delete_post(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM scheduled_posts
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn post_stats(&self, user_id: Uuid) -> Result<PostStats, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT status, COUNT(*)
            FROM scheduled_posts
            WHERE user_id = $1
            GROUP BY status
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = PostStats::default();
        for (status, count) in rows {
            stats.total += count;
            match PostStatus::parse(&status) {
                Some(PostStatus::Pending) => stats.pending = count,
                Some(PostStatus::Posted) => stats.posted = count,
                Some(PostStatus::Failed) => stats.failed = count,
                None => return Err(StoreError::Query(format!("unknown post status '{}'", status))),
            }
        }
        Ok(stats)
    }

    async fn recent_posts(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, user_id, platform, content, scheduled_for, status, created_at, updated_at
            FROM scheduled_posts
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(post_from_row).collect()
    }
}
