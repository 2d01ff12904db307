use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};

/// A single row of the `comments` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    /// `None` for a root comment
    pub parent_id: Option<CommentId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Sibling ordering key: creation time, then id
    pub fn sort_key(&self) -> (DateTime<Utc>, CommentId) {
        (self.created_at, self.id)
    }
}

/// A comment together with its replies, in chronological order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<ThreadNode>,
}

impl ThreadNode {
    pub fn leaf(comment: Comment) -> Self {
        Self {
            comment,
            replies: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.replies.iter());
        }
        count
    }

    /// Depth of this subtree; a leaf has depth 1
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            stack.extend(node.replies.iter().map(|r| (r, depth + 1)));
        }
        max
    }
}

// Replies are unlinked onto a heap stack so a long reply chain does not
// recurse once per level when the tree is dropped.
impl Drop for ThreadNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.replies);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.replies);
        }
    }
}

/// Instrumentation collected while materializing one thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStats {
    pub nodes: usize,
    pub store_calls: usize,
    pub max_depth: usize,
}

pub fn current_time_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn millis_to_datetime(millis: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| AppError::Internal(format!("Timestamp {} is out of range", millis)))
}
