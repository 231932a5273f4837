mod auth;
mod health_check;
mod posts;

pub use auth::{
    get_current_user, get_sessions, login, logout, logout_all, refresh, register,
};
pub use health_check::health_check;
pub use posts::{
    delete_post, generate_posts, get_post, get_post_stats, get_recent_posts, list_posts,
    update_post_content, update_post_schedule,
};
