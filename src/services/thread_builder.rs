// ThreadBuilder - Materializes a post's comments into a reply tree and
// applies the comment mutation policy on top of a CommentStore

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::ThreadConfig;
use crate::core::{CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{comment_not_found, CommentStore};
use crate::infrastructure::traits::PostDirectory;
use crate::infrastructure::viewer::ViewerContext;
use crate::models::{Comment, ThreadNode, ThreadStats};

/// Flat arena entry; `replies` holds arena indices in chronological order
struct Slot {
    comment: Comment,
    replies: Vec<usize>,
}

impl Slot {
    fn new(comment: Comment) -> Self {
        Self {
            comment,
            replies: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ThreadBuilder {
    store: Arc<dyn CommentStore>,
    posts: Arc<dyn PostDirectory>,
    config: ThreadConfig,
}

impl ThreadBuilder {
    pub fn new(store: Arc<dyn CommentStore>, posts: Arc<dyn PostDirectory>, config: ThreadConfig) -> Self {
        Self { store, posts, config }
    }

    pub fn config(&self) -> &ThreadConfig {
        &self.config
    }

    /// Every root comment of `post_id` with its full reply tree.
    ///
    /// An empty vector means the post has no comments. Any store failure
    /// fails the whole call; a partially loaded tree is never returned.
    pub async fn build_thread(&self, post_id: PostId) -> AppResult<Vec<ThreadNode>> {
        let (thread, _) = self.build_thread_with_stats(post_id).await?;
        Ok(thread)
    }

    /// Same as `build_thread`, also reporting node count, store round trips
    /// and depth reached.
    ///
    /// Traversal is level by level over a flat arena. Children of one level
    /// are fetched with at most `fanout_width` calls in flight and yielded in
    /// submission order, so the result matches a sequential walk exactly.
    ///
    /// Cost is N + 1 store calls for a thread of N comments: one `roots_of`
    /// plus one `children_of` per comment, leaves included. A comment is only
    /// known to be a leaf once its children have been asked for, so this is
    /// not K + 1 over internal nodes.
    #[instrument(skip_all, fields(post_id = %post_id))]
    pub async fn build_thread_with_stats(&self, post_id: PostId) -> AppResult<(Vec<ThreadNode>, ThreadStats)> {
        let mut stats = ThreadStats::default();

        let roots = self.store.roots_of(post_id).await?;
        stats.store_calls += 1;

        let mut arena: Vec<Slot> = Vec::with_capacity(roots.len());
        let mut frontier: Vec<usize> = Vec::with_capacity(roots.len());
        for comment in roots {
            frontier.push(arena.len());
            arena.push(Slot::new(comment));
        }
        let root_count = arena.len();
        let mut depth = usize::from(root_count > 0);

        // Each reachable row is fetched once, through its own parent, so the
        // walk terminates even if a dangling or self-referencing row exists.
        while !frontier.is_empty() {
            let parents: Vec<(usize, CommentId)> = frontier
                .iter()
                .map(|&idx| (idx, arena[idx].comment.id))
                .collect();

            let store = &self.store;
            let fetched: Vec<(usize, Vec<Comment>)> = stream::iter(parents)
                .map(|(idx, id)| async move {
                    store.children_of(id).await.map(|children| (idx, children))
                })
                .buffered(self.config.fanout_width.max(1))
                .try_collect()
                .await?;
            stats.store_calls += fetched.len();

            let mut next = Vec::new();
            for (parent, children) in fetched {
                for comment in children {
                    let idx = arena.len();
                    arena.push(Slot::new(comment));
                    arena[parent].replies.push(idx);
                    next.push(idx);
                }
            }

            if !next.is_empty() {
                depth += 1;
                if let Some(limit) = self.config.max_depth {
                    if depth > limit {
                        warn!(limit, nodes = arena.len(), "Thread exceeds depth limit");
                        return Err(AppError::DepthLimitExceeded { limit });
                    }
                }
            }
            frontier = next;
        }

        stats.nodes = arena.len();
        stats.max_depth = depth;

        let thread = assemble(arena, root_count);
        info!(
            nodes = stats.nodes,
            store_calls = stats.store_calls,
            max_depth = stats.max_depth,
            "Thread built"
        );
        Ok((thread, stats))
    }

    /// Add a top-level comment after checking the post exists
    pub async fn add_root_comment(&self, post_id: PostId, author_id: UserId, body: &str) -> AppResult<Comment> {
        self.validate_body(body)?;

        if !self.posts.post_exists(post_id).await? {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }

        let comment = self.store.insert_root(post_id, author_id, body).await?;
        debug!(comment_id = %comment.id, post_id = %post_id, "Root comment added");
        Ok(comment)
    }

    /// Reply to an existing comment; the reply joins the parent's post
    pub async fn add_reply(&self, parent_id: CommentId, author_id: UserId, body: &str) -> AppResult<Comment> {
        self.validate_body(body)?;

        let comment = self.store.insert_reply(parent_id, author_id, body).await?;
        debug!(comment_id = %comment.id, parent_id = %parent_id, "Reply added");
        Ok(comment)
    }

    /// Remove exactly one comment and return it.
    ///
    /// Replies are left in place. Replies to a deleted root keep a dangling
    /// parent id and are no longer reachable from `build_thread`.
    pub async fn delete_comment(&self, comment_id: CommentId) -> AppResult<Comment> {
        let deleted = self.store.delete_by_id(comment_id).await?;
        info!(comment_id = %comment_id, post_id = %deleted.post_id, was_root = deleted.is_root(), "Comment deleted");
        Ok(deleted)
    }

    /// Delete on behalf of a viewer: the author or a moderator
    pub async fn delete_comment_as(&self, viewer: &ViewerContext, comment_id: CommentId) -> AppResult<Comment> {
        let comment = self.get_comment(comment_id).await?;

        if !viewer.can_delete(&comment) {
            warn!(comment_id = %comment_id, user_id = %viewer.user_id, "Delete refused");
            return Err(AppError::Forbidden(format!(
                "User {} may not delete comment {}",
                viewer.user_id, comment_id
            )));
        }

        self.delete_comment(comment_id).await
    }

    pub async fn get_comment(&self, comment_id: CommentId) -> AppResult<Comment> {
        self.store
            .get(comment_id)
            .await?
            .ok_or_else(|| comment_not_found(comment_id))
    }

    /// Stored comments of a post, including ones orphaned by a root delete
    pub async fn comment_count(&self, post_id: PostId) -> AppResult<u64> {
        self.store.count_for_post(post_id).await
    }

    fn validate_body(&self, body: &str) -> AppResult<()> {
        if body.trim().is_empty() {
            return Err(AppError::Validation("Comment cannot be empty".to_string()));
        }
        let length = body.chars().count();
        if length > self.config.max_body_chars {
            return Err(AppError::Validation(format!(
                "Comment is {} characters, the limit is {}",
                length, self.config.max_body_chars
            )));
        }
        Ok(())
    }
}

/// Turn the arena into nested nodes without recursion. Children always sit
/// at higher indices than their parent, so a reverse sweep finishes every
/// subtree before its parent needs it.
fn assemble(arena: Vec<Slot>, root_count: usize) -> Vec<ThreadNode> {
    let mut built: Vec<Option<ThreadNode>> = (0..arena.len()).map(|_| None).collect();

    for (idx, slot) in arena.into_iter().enumerate().rev() {
        let replies = slot
            .replies
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[idx] = Some(ThreadNode {
            comment: slot.comment,
            replies,
        });
    }

    built.into_iter().take(root_count).flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::monitoring::MetricsCollector;
    use crate::infrastructure::sqlite_database::SqliteCommentStore;
    use crate::infrastructure::store_decorators::InstrumentedStore;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::time::Duration;

    struct KnownPosts(HashSet<PostId>);

    #[async_trait]
    impl PostDirectory for KnownPosts {
        async fn post_exists(&self, post_id: PostId) -> AppResult<bool> {
            Ok(self.0.contains(&post_id))
        }
    }

    /// Delegates to SQLite, but can fail or stall `children_of`
    struct ScriptedStore {
        inner: SqliteCommentStore,
        fail_children_of: Option<CommentId>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl CommentStore for ScriptedStore {
        async fn insert_root(&self, post_id: PostId, author_id: UserId, body: &str) -> AppResult<Comment> {
            self.inner.insert_root(post_id, author_id, body).await
        }

        async fn insert_reply(&self, parent_id: CommentId, author_id: UserId, body: &str) -> AppResult<Comment> {
            self.inner.insert_reply(parent_id, author_id, body).await
        }

        async fn children_of(&self, comment_id: CommentId) -> AppResult<Vec<Comment>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_children_of == Some(comment_id) {
                return Err(AppError::StoreUnavailable("connection reset".to_string()));
            }
            self.inner.children_of(comment_id).await
        }

        async fn roots_of(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
            self.inner.roots_of(post_id).await
        }

        async fn delete_by_id(&self, comment_id: CommentId) -> AppResult<Comment> {
            self.inner.delete_by_id(comment_id).await
        }

        async fn get(&self, comment_id: CommentId) -> AppResult<Option<Comment>> {
            self.inner.get(comment_id).await
        }

        async fn count_for_post(&self, post_id: PostId) -> AppResult<u64> {
            self.inner.count_for_post(post_id).await
        }
    }

    async fn sqlite() -> SqliteCommentStore {
        SqliteCommentStore::new_in_memory().await.unwrap()
    }

    fn posts() -> Arc<dyn PostDirectory> {
        Arc::new(KnownPosts([PostId::new(1)].into_iter().collect()))
    }

    async fn builder(config: ThreadConfig) -> ThreadBuilder {
        ThreadBuilder::new(Arc::new(sqlite().await), posts(), config)
    }

    #[tokio::test]
    async fn test_assemble_keeps_order_and_nesting() {
        let threads = builder(ThreadConfig::default()).await;
        let post = PostId::new(1);
        let author = UserId::new(1);

        let a = threads.add_root_comment(post, author, "a").await.unwrap();
        let b = threads.add_root_comment(post, author, "b").await.unwrap();
        let a1 = threads.add_reply(a.id, author, "a1").await.unwrap();
        let b1 = threads.add_reply(b.id, author, "b1").await.unwrap();
        let a2 = threads.add_reply(a.id, author, "a2").await.unwrap();
        let a1x = threads.add_reply(a1.id, author, "a1x").await.unwrap();

        let (thread, stats) = threads.build_thread_with_stats(post).await.unwrap();

        let expected = vec![
            ThreadNode {
                comment: a,
                replies: vec![
                    ThreadNode {
                        comment: a1,
                        replies: vec![ThreadNode::leaf(a1x)],
                    },
                    ThreadNode::leaf(a2),
                ],
            },
            ThreadNode {
                comment: b,
                replies: vec![ThreadNode::leaf(b1)],
            },
        ];
        assert_eq!(thread, expected);
        // three internal nodes, but every one of the six is asked for children
        assert_eq!(stats, ThreadStats { nodes: 6, store_calls: 7, max_depth: 3 });
    }

    #[tokio::test]
    async fn test_root_comment_requires_existing_post() {
        let threads = builder(ThreadConfig::default()).await;

        let err = threads
            .add_root_comment(PostId::new(2), UserId::new(1), "hello")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(threads.comment_count(PostId::new(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_body_validation() {
        let threads = builder(ThreadConfig {
            max_body_chars: 5,
            ..ThreadConfig::default()
        })
        .await;
        let post = PostId::new(1);

        let empty = threads.add_root_comment(post, UserId::new(1), "   ").await.unwrap_err();
        assert!(matches!(empty, AppError::Validation(_)));

        let long = threads.add_root_comment(post, UserId::new(1), "too long").await.unwrap_err();
        assert!(matches!(long, AppError::Validation(_)));

        // limit counts characters, not bytes
        threads.add_root_comment(post, UserId::new(1), "ñññññ").await.unwrap();
    }

    #[tokio::test]
    async fn test_subtree_failure_fails_whole_build() {
        let inner = sqlite().await;
        let post = PostId::new(1);
        let root = inner.insert_root(post, UserId::new(1), "root").await.unwrap();
        let ok = inner.insert_reply(root.id, UserId::new(2), "fine").await.unwrap();
        let broken = inner.insert_reply(root.id, UserId::new(3), "broken").await.unwrap();
        inner.insert_reply(ok.id, UserId::new(4), "deeper").await.unwrap();

        let store = ScriptedStore {
            inner,
            fail_children_of: Some(broken.id),
            delay: None,
        };
        let threads = ThreadBuilder::new(Arc::new(store), posts(), ThreadConfig::default());

        let err = threads.build_thread(post).await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fanout_is_bounded() {
        let inner = sqlite().await;
        let post = PostId::new(1);
        for i in 0..10 {
            inner.insert_root(post, UserId::new(i), "root").await.unwrap();
        }

        let scripted = ScriptedStore {
            inner,
            fail_children_of: None,
            delay: Some(Duration::from_millis(20)),
        };
        let metrics = Arc::new(MetricsCollector::new());
        let store = InstrumentedStore::new(Arc::new(scripted), Arc::clone(&metrics));
        let config = ThreadConfig {
            fanout_width: 3,
            ..ThreadConfig::default()
        };
        let threads = ThreadBuilder::new(Arc::new(store), posts(), config);

        let thread = threads.build_thread(post).await.unwrap();

        assert_eq!(thread.len(), 10);
        assert_eq!(metrics.peak_in_flight(), 3);
        assert_eq!(metrics.calls("children_of").await, 10);
        assert_eq!(metrics.calls("roots_of").await, 1);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let limited = ThreadConfig {
            max_depth: Some(2),
            ..ThreadConfig::default()
        };
        let threads = builder(limited).await;
        let post = PostId::new(1);
        let author = UserId::new(1);

        let root = threads.add_root_comment(post, author, "1").await.unwrap();
        let reply = threads.add_reply(root.id, author, "2").await.unwrap();
        assert_eq!(threads.build_thread(post).await.unwrap()[0].depth(), 2);

        threads.add_reply(reply.id, author, "3").await.unwrap();
        let err = threads.build_thread(post).await.unwrap_err();
        assert!(matches!(err, AppError::DepthLimitExceeded { limit: 2 }));
    }

    #[tokio::test]
    async fn test_delete_as_author_or_moderator() {
        let threads = builder(ThreadConfig::default()).await;
        let post = PostId::new(1);
        let author = UserId::new(7);
        let first = threads.add_root_comment(post, author, "first").await.unwrap();
        let second = threads.add_root_comment(post, author, "second").await.unwrap();

        let stranger = ViewerContext::new(UserId::new(8));
        let err = threads.delete_comment_as(&stranger, first.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let deleted = threads
            .delete_comment_as(&ViewerContext::new(author), first.id)
            .await
            .unwrap();
        assert_eq!(deleted, first);

        let moderator = ViewerContext::moderator(UserId::new(99));
        threads.delete_comment_as(&moderator, second.id).await.unwrap();

        let gone = threads.delete_comment_as(&moderator, second.id).await.unwrap_err();
        assert!(gone.is_not_found());
        assert!(threads.build_thread(post).await.unwrap().is_empty());
    }
}
