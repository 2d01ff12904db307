use crate::core::UserId;
use crate::error::AppResult;
use crate::infrastructure::traits::IdentityProvider;
use crate::models::Comment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewerContext {
    pub user_id: UserId,
    pub is_moderator: bool,
}

impl ViewerContext {
    pub fn new(user_id: UserId) -> Self {
        ViewerContext {
            user_id,
            is_moderator: false,
        }
    }

    pub fn moderator(user_id: UserId) -> Self {
        ViewerContext {
            user_id,
            is_moderator: true,
        }
    }

    /// Viewer for whoever the identity provider says is calling
    pub async fn current(identity: &dyn IdentityProvider, is_moderator: bool) -> AppResult<Self> {
        let user_id = identity.current_user_id().await?;
        Ok(ViewerContext { user_id, is_moderator })
    }

    /// Authors may delete their own comments; moderators may delete any
    pub fn can_delete(&self, comment: &Comment) -> bool {
        self.is_moderator || comment.author_id == self.user_id
    }
}
