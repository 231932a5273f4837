/// Scheduled-post endpoints. Every route is behind the auth gate and scoped
/// to the authenticated user; there is no way to address another user's
/// posts.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai_client::AiClient;
use crate::auth::CurrentUser;
use crate::error::{AppError, ValidationError};
use crate::store::{
    NewScheduledPost, Platform, PostFilter, PostStatus, PostStore, ScheduledPost,
};
use crate::validators::{is_valid_post_content, is_valid_prompt};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;
const DEFAULT_RECENT_LIMIT: i64 = 5;
const MAX_RECENT_LIMIT: i64 = 20;
/// Generated posts are spread one per day, publishing at this UTC hour.
const PUBLISH_HOUR: u32 = 10;

#[derive(Deserialize)]
pub struct GeneratePostsRequest {
    pub prompt: String,
    pub platform: Option<Platform>,
}

#[derive(Serialize)]
pub struct GeneratedPostsResponse {
    pub total_posts: usize,
    pub posts: Vec<ScheduledPost>,
}

#[derive(Deserialize)]
pub struct ListPostsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub platform: Option<String>,
}

#[derive(Serialize)]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub limit: i64,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Serialize)]
pub struct PostListResponse {
    pub posts: Vec<ScheduledPost>,
    pub pagination: Pagination,
}

#[derive(Deserialize)]
pub struct UpdateContentRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct UpdateScheduleRequest {
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct RecentPostsQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct RecentPostsResponse {
    pub posts: Vec<ScheduledPost>,
    pub count: usize,
}

fn ensure_mutable(post: &ScheduledPost, action: &str) -> Result<(), AppError> {
    if post.status == PostStatus::Posted {
        return Err(AppError::Validation(ValidationError::BadInput(format!(
            "Cannot {} already posted content",
            action
        ))));
    }
    Ok(())
}

/// The i-th generated draft publishes i days out, at a fixed morning hour.
fn publish_time(days_out: i64) -> Result<DateTime<Utc>, AppError> {
    (Utc::now() + Duration::days(days_out))
        .date_naive()
        .and_hms_opt(PUBLISH_HOUR, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| AppError::Internal("could not derive publish time".to_string()))
}

/// POST /posts/generate
///
/// Generates 1–3 drafts from a prompt and schedules them a day apart.
///
/// # Errors
/// - 400: missing or oversized prompt
/// - 503: generation service unconfigured or failing
pub async fn generate_posts(
    form: web::Json<GeneratePostsRequest>,
    user: web::ReqData<CurrentUser>,
    posts: web::Data<dyn PostStore>,
    ai: web::Data<Option<AiClient>>,
) -> Result<HttpResponse, AppError> {
    let prompt = is_valid_prompt(&form.prompt)?;
    let platform = form.platform.unwrap_or(Platform::Linkedin);

    let client = ai
        .get_ref()
        .as_ref()
        .ok_or_else(|| AppError::AiUnavailable("generation is not configured".to_string()))?;

    let drafts = client.generate_posts(&prompt).await?;

    let mut created = Vec::with_capacity(drafts.len());
    for (i, content) in drafts.into_iter().enumerate() {
        let post = posts
            .create_post(NewScheduledPost {
                user_id: user.id,
                platform,
                content,
                scheduled_for: publish_time(i as i64)?,
            })
            .await?;
        created.push(post);
    }

    tracing::info!(user_id = %user.id, posts = created.len(), "Generated and scheduled posts");

    Ok(HttpResponse::Created().json(GeneratedPostsResponse {
        total_posts: created.len(),
        posts: created,
    }))
}

/// GET /posts
///
/// Paginated listing ordered by scheduled time. Unknown `status`/`platform`
/// filter values are ignored rather than rejected.
pub async fn list_posts(
    query: web::Query<ListPostsQuery>,
    user: web::ReqData<CurrentUser>,
    posts: web::Data<dyn PostStore>,
) -> Result<HttpResponse, AppError> {
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    if page < 1 {
        return Err(AppError::Validation(ValidationError::BadInput(
            "Page number must be greater than 0".to_string(),
        )));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::Validation(ValidationError::BadInput(format!(
            "Limit must be between 1 and {}",
            MAX_PAGE_SIZE
        ))));
    }

    let filter = PostFilter {
        status: query.status.as_deref().and_then(PostStatus::parse),
        platform: query.platform.as_deref().and_then(Platform::parse),
    };

    let page_result = posts.list_posts(user.id, filter, page, limit).await?;

    let total_pages = (page_result.total_count + limit - 1) / limit;
    let pagination = Pagination {
        current_page: page,
        total_pages,
        total_count: page_result.total_count,
        limit,
        has_next_page: page < total_pages,
        has_prev_page: page > 1,
    };

    Ok(HttpResponse::Ok().json(PostListResponse {
        posts: page_result.posts,
        pagination,
    }))
}

/// GET /posts/{post_id}
pub async fn get_post(
    path: web::Path<Uuid>,
    user: web::ReqData<CurrentUser>,
    posts: web::Data<dyn PostStore>,
) -> Result<HttpResponse, AppError> {
    let post = posts
        .get_post(user.id, path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Scheduled post".to_string()))?;

    Ok(HttpResponse::Ok().json(post))
}

/// PATCH /posts/{post_id}/content
pub async fn update_post_content(
    path: web::Path<Uuid>,
    form: web::Json<UpdateContentRequest>,
    user: web::ReqData<CurrentUser>,
    posts: web::Data<dyn PostStore>,
) -> Result<HttpResponse, AppError> {
    let content = is_valid_post_content(&form.content)?;
    let post_id = path.into_inner();

    let post = posts
        .get_post(user.id, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Scheduled post".to_string()))?;
    ensure_mutable(&post, "update")?;

    let updated = posts
        .update_post_content(user.id, post_id, &content)
        .await?
        .ok_or_else(|| AppError::NotFound("Scheduled post".to_string()))?;

    Ok(HttpResponse::Ok().json(updated))
}

/// PATCH /posts/{post_id}/schedule
pub async fn update_post_schedule(
    path: web::Path<Uuid>,
    form: web::Json<UpdateScheduleRequest>,
    user: web::ReqData<CurrentUser>,
    posts: web::Data<dyn PostStore>,
) -> Result<HttpResponse, AppError> {
    let post_id = path.into_inner();

    if form.scheduled_for < Utc::now() {
        return Err(AppError::Validation(ValidationError::BadInput(
            "Post time cannot be in the past".to_string(),
        )));
    }

    let post = posts
        .get_post(user.id, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Scheduled post".to_string()))?;
    ensure_mutable(&post, "reschedule")?;

    let updated = posts
        .update_post_time(user.id, post_id, form.scheduled_for)
        .await?
        .ok_or_else(|| AppError::NotFound("Scheduled post".to_string()))?;

    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /posts/{post_id}
pub async fn delete_post(
    path: web::Path<Uuid>,
    user: web::ReqData<CurrentUser>,
    posts: web::Data<dyn PostStore>,
) -> Result<HttpResponse, AppError> {
    let post_id = path.into_inner();

    let post = posts
        .get_post(user.id, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Scheduled post".to_string()))?;
    ensure_mutable(&post, "delete")?;

    posts.delete_post(user.id, post_id).await?;

    tracing::info!(user_id = %user.id, post_id = %post_id, "Deleted scheduled post");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Scheduled post deleted successfully"
    })))
}

/// GET /posts/stats
pub async fn get_post_stats(
    user: web::ReqData<CurrentUser>,
    posts: web::Data<dyn PostStore>,
) -> Result<HttpResponse, AppError> {
    let stats = posts.post_stats(user.id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

/// GET /posts/recent
pub async fn get_recent_posts(
    query: web::Query<RecentPostsQuery>,
    user: web::ReqData<CurrentUser>,
    posts: web::Data<dyn PostStore>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    if !(1..=MAX_RECENT_LIMIT).contains(&limit) {
        return Err(AppError::Validation(ValidationError::BadInput(format!(
            "Limit must be between 1 and {}",
            MAX_RECENT_LIMIT
        ))));
    }

    let recent = posts.recent_posts(user.id, limit).await?;
    let count = recent.len();

    Ok(HttpResponse::Ok().json(RecentPostsResponse {
        posts: recent,
        count,
    }))
}
