use std::collections::HashMap;

use chrono::{DateTime, SubsecRound, Utc};

use crate::models::*;
use crate::thread::{build_forest, effective_limit};

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("{0}")] Validation(String),
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Forbidden(String),
    #[error("storage failure: {0}")] Storage(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        RepoError::Storage(e.to_string())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> RepoResult<Post>;
    /// The post with its full comment tree attached.
    async fn get_post_by_id(&self, id: Id) -> RepoResult<Post>;
    async fn get_posts(&self) -> RepoResult<Vec<Post>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn add_comment(&self, new: NewComment) -> RepoResult<Comment>;
    /// One page of a post's comments, threaded. Unknown posts and unknown
    /// cursors both produce an empty connection.
    async fn get_comments_for_post(
        &self,
        post_id: Id,
        limit: Option<u32>,
        cursor: Option<Id>,
    ) -> RepoResult<CommentConnection>;
}

pub trait Repo: PostRepo + CommentRepo {}

impl<T> Repo for T where T: PostRepo + CommentRepo {}

// ---- write-path checks shared by both backends ----------------------

fn require(field: &str, value: &str) -> RepoResult<()> {
    if value.is_empty() {
        return Err(RepoError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn validate_new_post(new: &NewPost) -> RepoResult<()> {
    require("title", &new.title)?;
    require("content", &new.content)?;
    require("author_id", &new.author_id)
}

fn validate_new_comment(new: &NewComment) -> RepoResult<()> {
    require("author_id", &new.author_id)?;
    require("content", &new.content)
}

/// Fails unless the post exists and accepts comments; `comments_disabled` is
/// `None` when the post is missing.
fn ensure_post_open(post_id: Id, comments_disabled: Option<bool>) -> RepoResult<()> {
    match comments_disabled {
        None => Err(RepoError::NotFound(format!("post {post_id} not found"))),
        Some(true) => {
            Err(RepoError::Forbidden(format!("comments are disabled for post {post_id}")))
        }
        Some(false) => Ok(()),
    }
}

fn parent_not_found(parent_id: Id) -> RepoError {
    RepoError::NotFound(format!("parent comment {parent_id} not found on this post"))
}

// Postgres keeps microseconds; match it so a record reads back unchanged.
fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use crate::thread::{chronological, paginate};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

    #[derive(Default)]
    struct State {
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        last_stamp: Option<DateTime<Utc>>,
    }

    impl State {
        // strictly increasing, so creation order survives equal clock reads
        fn stamp(&mut self) -> DateTime<Utc> {
            let now = now_micros();
            let ts = match self.last_stamp {
                Some(prev) if now <= prev => prev + chrono::Duration::microseconds(1),
                _ => now,
            };
            self.last_stamp = Some(ts);
            ts
        }

        fn comments_of(&self, post_id: Id) -> Vec<Comment> {
            let mut v: Vec<_> = self.comments
                .values()
                .filter(|c| c.post_id == post_id)
                .cloned()
                .collect();
            v.sort_by(chronological);
            v
        }
    }

    /// Map-backed store. Clones share the same state.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Storage("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Storage("state lock poisoned".into()))
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            validate_new_post(&new)?;
            let mut s = self.write()?;
            let post = Post {
                id: Id::new_v4(),
                title: new.title,
                content: new.content,
                author_id: new.author_id,
                created_at: s.stamp(),
                comments_disabled: new.comments_disabled,
                comments: Vec::new(),
            };
            s.posts.insert(post.id, post.clone());
            drop(s);
            tracing::info!(post_id = %post.id, "post created");
            Ok(post)
        }

        async fn get_post_by_id(&self, id: Id) -> RepoResult<Post> {
            let s = self.read()?;
            let mut post = s.posts.get(&id).cloned()
                .ok_or_else(|| RepoError::NotFound(format!("post {id} not found")))?;
            let comments = s.comments_of(id);
            drop(s);
            post.comments = build_forest(comments);
            Ok(post)
        }

        async fn get_posts(&self) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            let mut posts: Vec<_> = s.posts.values().cloned().collect();
            posts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            for post in &mut posts {
                post.comments = build_forest(s.comments_of(post.id));
            }
            Ok(posts)
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn add_comment(&self, new: NewComment) -> RepoResult<Comment> {
            validate_new_comment(&new)?;
            // checks and insert under one write lock
            let mut s = self.write()?;
            let disabled = s.posts.get(&new.post_id).map(|p| p.comments_disabled);
            ensure_post_open(new.post_id, disabled)?;
            if let Some(parent_id) = new.parent_id {
                let on_post = s.comments.get(&parent_id).is_some_and(|p| p.post_id == new.post_id);
                if !on_post {
                    return Err(parent_not_found(parent_id));
                }
            }
            let comment = Comment {
                id: Id::new_v4(),
                post_id: new.post_id,
                parent_id: new.parent_id,
                author_id: new.author_id,
                content: new.content,
                created_at: s.stamp(),
            };
            s.comments.insert(comment.id, comment.clone());
            drop(s);
            tracing::info!(comment_id = %comment.id, post_id = %comment.post_id, "comment added");
            Ok(comment)
        }

        async fn get_comments_for_post(
            &self,
            post_id: Id,
            limit: Option<u32>,
            cursor: Option<Id>,
        ) -> RepoResult<CommentConnection> {
            let comments = self.read()?.comments_of(post_id);
            let page = paginate(comments, effective_limit(limit), cursor);
            tracing::debug!(%post_id, count = page.items.len(), "comments fetched");
            Ok(page.into_connection())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::thread::Page;
    use sqlx::{Pool, Postgres};

    const POST_COLUMNS: &str = "id, title, content, author_id, created_at, comments_disabled";
    const COMMENT_COLUMNS: &str = "id, post_id, parent_id, author_id, content, created_at";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        async fn comments_of(&self, post_id: Id) -> RepoResult<Vec<Comment>> {
            let recs = sqlx::query_as::<_, Comment>(&format!(
                "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = $1 ORDER BY created_at, id"
            ))
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(recs)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: NewPost) -> RepoResult<Post> {
            validate_new_post(&new)?;
            let mut tx = self.pool.begin().await?;
            let post = sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (id, title, content, author_id, comments_disabled, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6) RETURNING {POST_COLUMNS}"
            ))
            .bind(Id::new_v4())
            .bind(&new.title)
            .bind(&new.content)
            .bind(&new.author_id)
            .bind(new.comments_disabled)
            .bind(now_micros())
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            tracing::info!(post_id = %post.id, "post created");
            Ok(post)
        }

        async fn get_post_by_id(&self, id: Id) -> RepoResult<Post> {
            let mut post = sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("post {id} not found")))?;
            post.comments = build_forest(self.comments_of(id).await?);
            Ok(post)
        }

        async fn get_posts(&self) -> RepoResult<Vec<Post>> {
            let mut posts = sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at, id"
            ))
            .fetch_all(&self.pool)
            .await?;
            let ids: Vec<Id> = posts.iter().map(|p| p.id).collect();
            let comments = sqlx::query_as::<_, Comment>(&format!(
                "SELECT {COMMENT_COLUMNS} FROM comments
                 WHERE post_id = ANY($1) ORDER BY created_at, id"
            ))
            .bind(&ids[..])
            .fetch_all(&self.pool)
            .await?;

            let mut by_post: HashMap<Id, Vec<Comment>> = HashMap::new();
            for c in comments {
                by_post.entry(c.post_id).or_default().push(c);
            }
            for post in &mut posts {
                post.comments = build_forest(by_post.remove(&post.id).unwrap_or_default());
            }
            Ok(posts)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn add_comment(&self, new: NewComment) -> RepoResult<Comment> {
            validate_new_comment(&new)?;
            // dropping `tx` on any early return rolls back
            let mut tx = self.pool.begin().await?;
            let disabled: Option<bool> =
                sqlx::query_scalar("SELECT comments_disabled FROM posts WHERE id = $1")
                    .bind(new.post_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            ensure_post_open(new.post_id, disabled)?;
            if let Some(parent_id) = new.parent_id {
                let found: Option<Id> =
                    sqlx::query_scalar("SELECT id FROM comments WHERE id = $1 AND post_id = $2")
                        .bind(parent_id)
                        .bind(new.post_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                if found.is_none() {
                    return Err(parent_not_found(parent_id));
                }
            }
            let comment = sqlx::query_as::<_, Comment>(&format!(
                "INSERT INTO comments (id, post_id, parent_id, author_id, content, created_at)
                 VALUES ($1,$2,$3,$4,$5,$6) RETURNING {COMMENT_COLUMNS}"
            ))
            .bind(Id::new_v4())
            .bind(new.post_id)
            .bind(new.parent_id)
            .bind(&new.author_id)
            .bind(&new.content)
            .bind(now_micros())
            .fetch_one(&mut *tx)
            .await?;
            tx.commit().await?;
            tracing::info!(comment_id = %comment.id, post_id = %comment.post_id, "comment added");
            Ok(comment)
        }

        async fn get_comments_for_post(
            &self,
            post_id: Id,
            limit: Option<u32>,
            cursor: Option<Id>,
        ) -> RepoResult<CommentConnection> {
            let limit = effective_limit(limit);
            // one extra row tells whether another page exists
            let fetch = limit as i64 + 1;
            let window = match cursor {
                None => sqlx::query_as::<_, Comment>(&format!(
                    "SELECT {COMMENT_COLUMNS} FROM comments
                     WHERE post_id = $1 ORDER BY created_at, id LIMIT $2"
                ))
                .bind(post_id)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?,
                // an anchor outside this post joins nothing: empty page
                Some(cursor) => sqlx::query_as::<_, Comment>(
                    "SELECT c.id, c.post_id, c.parent_id, c.author_id, c.content, c.created_at
                     FROM comments c
                     JOIN comments anchor ON anchor.id = $2 AND anchor.post_id = $1
                     WHERE c.post_id = $1 AND (c.created_at, c.id) > (anchor.created_at, anchor.id)
                     ORDER BY c.created_at, c.id LIMIT $3",
                )
                .bind(post_id)
                .bind(cursor)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?,
            };
            let page = Page::from_window(window, limit);
            tracing::debug!(%post_id, count = page.items.len(), "comments fetched");
            Ok(page.into_connection())
        }
    }
}
