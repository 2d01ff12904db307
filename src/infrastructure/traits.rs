// Collaborator interfaces - services this crate consumes but does not own

use async_trait::async_trait;

use crate::core::{PostId, UserId};
use crate::error::AppResult;

/// Post service lookup, consulted before a root comment is written
#[async_trait]
pub trait PostDirectory: Send + Sync {
    async fn post_exists(&self, post_id: PostId) -> AppResult<bool>;
}

/// Session layer: who is making the current request
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user_id(&self) -> AppResult<UserId>;
}
