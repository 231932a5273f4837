/// In-memory store used by the test suite and for database-free local runs.
/// A single mutex guards all state and no await happens while it is held, so
/// every operation (`replace_token` in particular) is linearizable, matching
/// the atomicity the Postgres store gets from single-statement conditional
/// updates.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{
    CredentialStore, DeviceMeta, NewPrincipal, NewScheduledPost, PostFilter, PostPage, PostStats,
    PostStatus, PostStore, Principal, ScheduledPost,
};

#[derive(Default)]
struct MemState {
    principals: HashMap<Uuid, PrincipalEntry>,
    email_index: HashMap<String, Uuid>,
    /// Reverse index: token hash → owning principal.
    token_index: HashMap<String, Uuid>,
    posts: HashMap<Uuid, ScheduledPost>,
}

struct PrincipalEntry {
    principal: Principal,
    tokens: HashMap<String, DeviceMeta>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))
    }

    /// Moves a post through its lifecycle. Publishing is driven by a worker
    /// outside this crate; this stands in for it in tests and local runs.
    pub fn set_post_status(&self, post_id: Uuid, status: PostStatus) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        match state.posts.get_mut(&post_id) {
            Some(post) => {
                post.status = status;
                post.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_principal_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Principal>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .email_index
            .get(email)
            .and_then(|id| state.principals.get(id))
            .map(|entry| entry.principal.clone()))
    }

    async fn find_principal_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError> {
        let state = self.lock()?;
        Ok(state.principals.get(&id).map(|entry| entry.principal.clone()))
    }

    async fn create_principal(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        let mut state = self.lock()?;
        if state.email_index.contains_key(&new.email) {
            return Err(StoreError::DuplicateKey(new.email));
        }

        let now = Utc::now();
        let principal = Principal {
            id: Uuid::new_v4(),
            email: new.email.clone(),
            name: new.name,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: now,
        };

        state.email_index.insert(new.email, principal.id);
        state.principals.insert(
            principal.id,
            PrincipalEntry {
                principal: principal.clone(),
                tokens: HashMap::new(),
            },
        );

        Ok(principal)
    }

    async fn find_principal_owning_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Principal>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .token_index
            .get(token_hash)
            .and_then(|id| state.principals.get(id))
            .map(|entry| entry.principal.clone()))
    }

    async fn add_token(
        &self,
        principal_id: Uuid,
        token_hash: &str,
        meta: DeviceMeta,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let entry = state
            .principals
            .get_mut(&principal_id)
            .ok_or_else(|| StoreError::Query(format!("unknown principal {}", principal_id)))?;

        entry.tokens.insert(token_hash.to_string(), meta);
        state.token_index.insert(token_hash.to_string(), principal_id);
        Ok(())
    }

    async fn replace_token(
        &self,
        principal_id: Uuid,
        old_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let entry = match state.principals.get_mut(&principal_id) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        // Compare-then-swap under one lock: the second of two concurrent
        // rotations finds the old hash gone and reports it.
        let meta = match entry.tokens.remove(old_hash) {
            Some(meta) => meta,
            None => return Ok(false),
        };

        entry.tokens.insert(
            new_hash.to_string(),
            DeviceMeta {
                issued_at: Utc::now(),
                ..meta
            },
        );
        state.token_index.remove(old_hash);
        state.token_index.insert(new_hash.to_string(), principal_id);
        Ok(true)
    }

    async fn remove_token(
        &self,
        principal_id: Uuid,
        token_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let entry = match state.principals.get_mut(&principal_id) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        let removed = entry.tokens.remove(token_hash).is_some();
        if removed {
            state.token_index.remove(token_hash);
        }
        Ok(removed)
    }

    async fn clear_all_tokens(&self, principal_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let hashes: Vec<String> = match state.principals.get_mut(&principal_id) {
            Some(entry) => entry.tokens.drain().map(|(hash, _)| hash).collect(),
            None => return Ok(0),
        };

        for hash in &hashes {
            state.token_index.remove(hash);
        }
        Ok(hashes.len() as u64)
    }

    async fn list_tokens(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<(String, DeviceMeta)>, StoreError> {
        let state = self.lock()?;
        let mut tokens: Vec<(String, DeviceMeta)> = state
            .principals
            .get(&principal_id)
            .map(|entry| {
                entry
                    .tokens
                    .iter()
                    .map(|(hash, meta)| (hash.clone(), meta.clone()))
                    .collect()
            })
            .unwrap_or_default();

        tokens.sort_by_key(|(_, meta)| meta.issued_at);
        Ok(tokens)
    }
}

#[async_trait]
impl PostStore for InMemoryStore {
    async fn create_post(&self, new: NewScheduledPost) -> Result<ScheduledPost, StoreError> {
        let mut state = self.lock()?;
        let now = Utc::now();
        let post = ScheduledPost {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            platform: new.platform,
            content: new.content,
            scheduled_for: new.scheduled_for,
            status: PostStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn list_posts(
        &self,
        user_id: Uuid,
        filter: PostFilter,
        page: i64,
        limit: i64,
    ) -> Result<PostPage, StoreError> {
        let state = self.lock()?;
        let mut matching: Vec<ScheduledPost> = state
            .posts
            .values()
            .filter(|post| post.user_id == user_id)
            .filter(|post| filter.status.map_or(true, |s| post.status == s))
            .filter(|post| filter.platform.map_or(true, |p| post.platform == p))
            .cloned()
            .collect();
        matching.sort_by_key(|post| post.scheduled_for);

        let total_count = matching.len() as i64;
        let offset = ((page - 1) * limit).max(0) as usize;
        let posts = matching
            .into_iter()
            .skip(offset)
            .take(limit.max(0) as usize)
            .collect();

        Ok(PostPage { posts, total_count })
    }

    async fn get_post(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<ScheduledPost>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .posts
            .get(&post_id)
            .filter(|post| post.user_id == user_id)
            .cloned())
    }

    async fn update_post_content(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        content: &str,
    ) -> Result<Option<ScheduledPost>, StoreError> {
        let mut state = self.lock()?;
        let post = match state
            .posts
            .get_mut(&post_id)
            .filter(|post| post.user_id == user_id)
        {
            Some(post) => post,
            None => return Ok(None),
        };

        post.content = content.to_string();
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    async fn update_post_time(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<ScheduledPost>, StoreError> {
        let mut state = self.lock()?;
        let post = match state
            .posts
            .get_mut(&post_id)
            .filter(|post| post.user_id == user_id)
        {
            Some(post) => post,
            None => return Ok(None),
        };

        post.scheduled_for = scheduled_for;
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, user_id: Uuid, post_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let owned = state
            .posts
            .get(&post_id)
            .map_or(false, |post| post.user_id == user_id);
        if owned {
            state.posts.remove(&post_id);
        }
        Ok(owned)
    }

    async fn post_stats(&self, user_id: Uuid) -> Result<PostStats, StoreError> {
        let state = self.lock()?;
        let mut stats = PostStats::default();
        for post in state.posts.values().filter(|post| post.user_id == user_id) {
            stats.total += 1;
            match post.status {
                PostStatus::Pending => stats.pending += 1,
                PostStatus::Posted => stats.posted += 1,
                PostStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn recent_posts(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, StoreError> {
        let state = self.lock()?;
        let mut posts: Vec<ScheduledPost> = state
            .posts
            .values()
            .filter(|post| post.user_id == user_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts.truncate(limit.max(0) as usize);
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DeviceType;

    fn meta(label: &str) -> DeviceMeta {
        DeviceMeta {
            device_label: label.to_string(),
            device_type: DeviceType::Web,
            issued_at: Utc::now(),
        }
    }

    async fn new_principal(store: &InMemoryStore) -> Principal {
        store
            .create_principal(NewPrincipal {
                email: format!("{}@example.com", Uuid::new_v4()),
                name: "Test".to_string(),
                password_hash: "$2b$10$hash".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryStore::new();
        let new = NewPrincipal {
            email: "same@example.com".to_string(),
            name: "One".to_string(),
            password_hash: "h".to_string(),
        };
        store.create_principal(new.clone()).await.unwrap();

        let result = store.create_principal(new).await;
        assert!(matches!(result, Err(StoreError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn replace_token_consumes_the_old_hash_exactly_once() {
        let store = InMemoryStore::new();
        let principal = new_principal(&store).await;

        store.add_token(principal.id, "old", meta("Web App 1")).await.unwrap();

        assert!(store.replace_token(principal.id, "old", "new").await.unwrap());
        // Stale handle: the same swap must now fail cleanly instead of
        // silently no-opping.
        assert!(!store.replace_token(principal.id, "old", "other").await.unwrap());

        let owner = store.find_principal_owning_token("new").await.unwrap();
        assert_eq!(owner.map(|p| p.id), Some(principal.id));
        assert!(store.find_principal_owning_token("old").await.unwrap().is_none());
        assert!(store.find_principal_owning_token("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replace_token_keeps_device_metadata() {
        let store = InMemoryStore::new();
        let principal = new_principal(&store).await;

        store.add_token(principal.id, "old", meta("Web App 3")).await.unwrap();
        store.replace_token(principal.id, "old", "new").await.unwrap();

        let tokens = store.list_tokens(principal.id).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].0, "new");
        assert_eq!(tokens[0].1.device_label, "Web App 3");
    }

    #[tokio::test]
    async fn remove_token_is_idempotent() {
        let store = InMemoryStore::new();
        let principal = new_principal(&store).await;

        store.add_token(principal.id, "t1", meta("Web App 1")).await.unwrap();

        assert!(store.remove_token(principal.id, "t1").await.unwrap());
        assert!(!store.remove_token(principal.id, "t1").await.unwrap());
    }

    #[tokio::test]
    async fn clear_all_tokens_empties_the_reverse_index_too() {
        let store = InMemoryStore::new();
        let principal = new_principal(&store).await;

        store.add_token(principal.id, "t1", meta("Web App 1")).await.unwrap();
        store.add_token(principal.id, "t2", meta("Web App 2")).await.unwrap();

        assert_eq!(store.clear_all_tokens(principal.id).await.unwrap(), 2);
        assert!(store.list_tokens(principal.id).await.unwrap().is_empty());
        assert!(store.find_principal_owning_token("t1").await.unwrap().is_none());
        assert!(store.find_principal_owning_token("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tokens_of_two_principals_do_not_interfere() {
        let store = InMemoryStore::new();
        let alpha = new_principal(&store).await;
        let beta = new_principal(&store).await;

        store.add_token(alpha.id, "a1", meta("Web App 1")).await.unwrap();
        store.add_token(beta.id, "b1", meta("Web App 1")).await.unwrap();

        store.clear_all_tokens(alpha.id).await.unwrap();

        let owner = store.find_principal_owning_token("b1").await.unwrap();
        assert_eq!(owner.map(|p| p.id), Some(beta.id));
    }

    #[tokio::test]
    async fn list_posts_pages_and_filters() {
        let store = InMemoryStore::new();
        let principal = new_principal(&store).await;

        for i in 0..5 {
            store
                .create_post(NewScheduledPost {
                    user_id: principal.id,
                    platform: crate::store::Platform::Linkedin,
                    content: format!("post {}", i),
                    scheduled_for: Utc::now() + chrono::Duration::days(i),
                })
                .await
                .unwrap();
        }

        let page = store
            .list_posts(principal.id, PostFilter::default(), 1, 2)
            .await
            .unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.posts[0].content, "post 0");

        let page_three = store
            .list_posts(principal.id, PostFilter::default(), 3, 2)
            .await
            .unwrap();
        assert_eq!(page_three.posts.len(), 1);

        let filtered = store
            .list_posts(
                principal.id,
                PostFilter {
                    status: Some(PostStatus::Posted),
                    platform: None,
                },
                1,
                10,
            )
            .await
            .unwrap();
        assert_eq!(filtered.total_count, 0);
    }
}
