/// Durable state behind the application: principals with their live session
/// sets, and scheduled posts.
///
/// The per-principal session set is the only shared mutable resource in the
/// session core. It is owned by the `CredentialStore` and mutated exclusively
/// through the operations below; `replace_token` is a single atomic
/// compare-and-swap so concurrent rotations of the same token have exactly
/// one winner.
///
/// Stores deal in SHA-256 hashes of refresh tokens. Plaintext token values
/// never reach persistence.

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// An authenticated identity. `password_hash` is the only credential ever
/// stored for it.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// Caller category used to label sessions. Never changes security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Web,
    Mobile,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Web => "web",
            DeviceType::Mobile => "mobile",
        }
    }

    /// Parses the `x-device-type` header value, defaulting to `web`.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("mobile") => DeviceType::Mobile,
            _ => DeviceType::Web,
        }
    }

    pub fn label_prefix(&self) -> &'static str {
        match self {
            DeviceType::Web => "Web App",
            DeviceType::Mobile => "Mobile App",
        }
    }
}

/// Per-session metadata, fixed at issuance. The label is stored rather than
/// recomputed so it survives rotation and set mutations.
#[derive(Debug, Clone)]
pub struct DeviceMeta {
    pub device_label: String,
    pub device_type: DeviceType,
    pub issued_at: DateTime<Utc>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_principal_by_email(&self, email: &str)
        -> Result<Option<Principal>, StoreError>;

    async fn find_principal_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError>;

    async fn create_principal(&self, new: NewPrincipal) -> Result<Principal, StoreError>;

    /// Reverse lookup: which principal currently holds this token?
    async fn find_principal_owning_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, StoreError>;

    async fn add_token(
        &self,
        principal_id: Uuid,
        token_hash: &str,
        meta: DeviceMeta,
    ) -> Result<(), StoreError>;

    /// Atomically swaps `old_hash` for `new_hash`, keeping the session's
    /// device metadata. Returns `false` when `old_hash` is not present,
    /// including when a concurrent rotation already consumed it. Must be a
    /// single conditional update, never a read-then-write pair.
    async fn replace_token(
        &self,
        principal_id: Uuid,
        old_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Removes one token. Returns `false` when it was already gone.
    async fn remove_token(&self, principal_id: Uuid, token_hash: &str)
        -> Result<bool, StoreError>;

    /// Drops the principal's entire session set. Returns how many were removed.
    async fn clear_all_tokens(&self, principal_id: Uuid) -> Result<u64, StoreError>;

    /// All live (hash, metadata) pairs for a principal, oldest first.
    async fn list_tokens(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<(String, DeviceMeta)>, StoreError>;
}

/// Target platform for a scheduled post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    X,
    Hashnode,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::X => "x",
            Platform::Hashnode => "hashnode",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "linkedin" => Some(Platform::Linkedin),
            "x" => Some(Platform::X),
            "hashnode" => Some(Platform::Hashnode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Pending,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Pending => "pending",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PostStatus::Pending),
            "posted" => Some(PostStatus::Posted),
            "failed" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledPost {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform: Platform,
    pub content: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewScheduledPost {
    pub user_id: Uuid,
    pub platform: Platform,
    pub content: String,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone)]
pub struct PostPage {
    pub posts: Vec<ScheduledPost>,
    pub total_count: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PostStats {
    pub total: i64,
    pub pending: i64,
    pub posted: i64,
    pub failed: i64,
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, new: NewScheduledPost) -> Result<ScheduledPost, StoreError>;

    /// Pages are 1-based; posts come back ordered by scheduled time.
    async fn list_posts(
        &self,
        user_id: Uuid,
        filter: PostFilter,
        page: i64,
        limit: i64,
    ) -> Result<PostPage, StoreError>;

    async fn get_post(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<ScheduledPost>, StoreError>;

    async fn update_post_content(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        content: &str,
    ) -> Result<Option<ScheduledPost>, StoreError>;

    async fn update_post_time(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<ScheduledPost>, StoreError>;

    async fn delete_post(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, StoreError>;

    async fn post_stats(&self, user_id: Uuid) -> Result<PostStats, StoreError>;

    /// Most recently created posts, newest first.
    async fn recent_posts(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_header_defaults_to_web() {
        assert_eq!(DeviceType::from_header(None), DeviceType::Web);
        assert_eq!(DeviceType::from_header(Some("web")), DeviceType::Web);
        assert_eq!(DeviceType::from_header(Some("mobile")), DeviceType::Mobile);
        assert_eq!(DeviceType::from_header(Some("toaster")), DeviceType::Web);
    }

    #[test]
    fn platform_round_trips_through_strings() {
        for platform in [Platform::Linkedin, Platform::X, Platform::Hashnode] {
            assert_eq!(Platform::parse(platform.as_str()), Some(platform));
        }
        assert_eq!(Platform::parse("myspace"), None);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [PostStatus::Pending, PostStatus::Posted, PostStatus::Failed] {
            assert_eq!(PostStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PostStatus::parse("archived"), None);
    }
}
