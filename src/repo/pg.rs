use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::{debug, info, instrument};

use super::*;
use crate::slug::{slugify, unique_slug};

const THREAD_COLUMNS: &str =
    "id, topic_id, author_id, title, slug, body, solution_reply_id, created_at, updated_at";
const REPLY_COLUMNS: &str =
    "id, body, author_id, replyable_type, replyable_id, created_at, updated_at";

#[derive(Clone)]
pub struct PgRepo { pool: Pool<Postgres> }

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    pub fn pool(&self) -> &Pool<Postgres> { &self.pool }

    /// Applies the bundled `migrations/` to the connected database.
    pub async fn migrate(&self) -> RepoResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn page_where(&self, topic_id: Option<Id>, req: PageRequest) -> RepoResult<Page<Thread>> {
        // one snapshot for both statements so `total` agrees with `items`
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx).await?;
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM threads WHERE ($1::BIGINT IS NULL OR topic_id = $1)",
        )
        .bind(topic_id)
        .fetch_one(&mut *tx).await?;
        let items = sqlx::query_as::<_, Thread>(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads
             WHERE ($1::BIGINT IS NULL OR topic_id = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(topic_id)
        .bind(i64::from(req.per_page))
        .bind(i64::try_from(req.offset()).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(Page::new(items, u64::try_from(total).unwrap_or(0), req))
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let name = required("name", &new.name)?;
        let username = required("username", &new.username)?;
        let rec = sqlx::query_as::<_, User>(
            "INSERT INTO users (name, username) VALUES ($1,$2) RETURNING id, name, username, created_at",
        )
        .bind(&name).bind(&username)
        .fetch_one(&self.pool).await?;
        Ok(rec)
    }

    async fn find_user(&self, id: Id) -> RepoResult<User> {
        let rec = sqlx::query_as::<_, User>("SELECT id, name, username, created_at FROM users WHERE id=$1")
            .bind(id)
            .fetch_one(&self.pool).await?;
        Ok(rec)
    }
}

#[async_trait]
impl TopicRepo for PgRepo {
    async fn list_topics(&self) -> RepoResult<Vec<Topic>> {
        let recs = sqlx::query_as::<_, Topic>("SELECT id, name, slug, created_at FROM topics ORDER BY name")
            .fetch_all(&self.pool).await?;
        Ok(recs)
    }

    async fn create_topic(&self, new: NewTopic) -> RepoResult<Topic> {
        let name = required("name", &new.name)?;
        let rec = sqlx::query_as::<_, Topic>(
            "INSERT INTO topics (name, slug) VALUES ($1,$2) RETURNING id, name, slug, created_at",
        )
        .bind(&name).bind(slugify(&name))
        .fetch_one(&self.pool).await?;
        Ok(rec)
    }

    async fn find_topic(&self, id: Id) -> RepoResult<Topic> {
        let rec = sqlx::query_as::<_, Topic>("SELECT id, name, slug, created_at FROM topics WHERE id=$1")
            .bind(id)
            .fetch_one(&self.pool).await?;
        Ok(rec)
    }
}

#[async_trait]
impl ThreadRepo for PgRepo {
    #[instrument(skip(self))]
    async fn find_all_paginated(&self, req: PageRequest) -> RepoResult<Page<Thread>> {
        self.page_where(None, req).await
    }

    #[instrument(skip(self))]
    async fn find_all_for_topic_paginated(&self, topic_id: Id, req: PageRequest) -> RepoResult<Page<Thread>> {
        self.page_where(Some(topic_id), req).await
    }

    async fn find_thread(&self, id: Id) -> RepoResult<Thread> {
        let thread = sqlx::query_as::<_, Thread>(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id=$1"))
            .bind(id)
            .fetch_one(&self.pool).await?;
        Ok(thread)
    }

    async fn find_by_slug(&self, slug: &str) -> RepoResult<Thread> {
        debug!(slug, "thread lookup by slug");
        let thread = sqlx::query_as::<_, Thread>(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE slug=$1"))
            .bind(slug)
            .fetch_one(&self.pool).await?;
        Ok(thread)
    }

    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
        let title = valid_title(&new.title)?;
        let body = valid_body(&new.body)?;
        let base = slugify(&title);

        let mut tx = self.pool.begin().await?;
        // slugs only hold [a-z0-9-], so LIKE needs no escaping
        let taken: HashSet<String> = sqlx::query_scalar::<_, String>(
            "SELECT slug FROM threads WHERE slug = $1 OR slug LIKE $2",
        )
        .bind(&base)
        .bind(format!("{base}-%"))
        .fetch_all(&mut *tx).await?
        .into_iter()
        .collect();
        let slug = unique_slug(&base, |c| taken.contains(c));

        // a concurrent insert of the same slug fails the unique index -> Conflict
        let thread = sqlx::query_as::<_, Thread>(&format!(
            "INSERT INTO threads (topic_id, author_id, title, slug, body) VALUES ($1,$2,$3,$4,$5) RETURNING {THREAD_COLUMNS}"
        ))
        .bind(new.topic_id)
        .bind(new.author_id)
        .bind(&title)
        .bind(&slug)
        .bind(&body)
        .fetch_one(&mut *tx).await?;
        tx.commit().await?;
        info!(thread_id = thread.id, slug = %thread.slug, "thread created");
        Ok(thread)
    }

    async fn update_thread(&self, id: Id, upd: UpdateThread) -> RepoResult<Thread> {
        let upd = validate_thread_update(upd)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query_scalar::<_, Id>("SELECT id FROM threads WHERE id=$1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx).await?;
        if let Some(ref slug) = upd.slug {
            let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM threads WHERE slug=$1 AND id<>$2)")
                .bind(slug).bind(id)
                .fetch_one(&mut *tx).await?;
            if taken {
                return Err(RepoError::Conflict);
            }
        }
        let thread = sqlx::query_as::<_, Thread>(&format!(
            "UPDATE threads SET title = COALESCE($2, title), body = COALESCE($3, body),
                    topic_id = COALESCE($4, topic_id), slug = COALESCE($5, slug), updated_at = now()
             WHERE id=$1 RETURNING {THREAD_COLUMNS}"
        ))
        .bind(id)
        .bind(upd.title.as_ref())
        .bind(upd.body.as_ref())
        .bind(upd.topic_id)
        .bind(upd.slug.as_ref())
        .fetch_one(&mut *tx).await?;
        tx.commit().await?;
        info!(thread_id = id, "thread updated");
        Ok(thread)
    }

    async fn delete_thread(&self, id: Id) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        // lock the thread first so a create_reply holding FOR SHARE finishes
        // before we collect replies, and later ones see the row gone
        sqlx::query_scalar::<_, Id>("SELECT id FROM threads WHERE id=$1 FOR UPDATE")
            .bind(id)
            .fetch_one(&mut *tx).await?;
        // replies go first; the solution_reply_id FK nulls itself on their removal
        let replies = sqlx::query("DELETE FROM replies WHERE replyable_type=$1 AND replyable_id=$2")
            .bind(REPLYABLE_THREAD).bind(id)
            .execute(&mut *tx).await?
            .rows_affected();
        let deleted = sqlx::query("DELETE FROM threads WHERE id=$1")
            .bind(id)
            .execute(&mut *tx).await?
            .rows_affected();
        if deleted == 0 {
            return Err(RepoError::NotFound); // tx dropped -> rollback
        }
        tx.commit().await?;
        info!(thread_id = id, replies_removed = replies, "thread deleted");
        Ok(())
    }

    async fn mark_solution(&self, reply: &Reply) -> RepoResult<Thread> {
        let mut tx = self.pool.begin().await?;
        let (kind, parent_id): (String, Id) =
            sqlx::query_as("SELECT replyable_type, replyable_id FROM replies WHERE id=$1 FOR SHARE")
                .bind(reply.id)
                .fetch_one(&mut *tx).await?;
        let thread_id = Replyable { kind, id: parent_id }.thread_id().ok_or(RepoError::Conflict)?;
        let thread = sqlx::query_as::<_, Thread>(&format!(
            "UPDATE threads SET solution_reply_id=$2, updated_at=now() WHERE id=$1 RETURNING {THREAD_COLUMNS}"
        ))
        .bind(thread_id)
        .bind(reply.id)
        .fetch_one(&mut *tx).await?;
        tx.commit().await?;
        info!(thread_id, reply_id = reply.id, "solution marked");
        Ok(thread)
    }

    async fn unmark_solution(&self, thread: &Thread) -> RepoResult<Thread> {
        let updated = sqlx::query_as::<_, Thread>(&format!(
            "UPDATE threads
             SET updated_at = CASE WHEN solution_reply_id IS NULL THEN updated_at ELSE now() END,
                 solution_reply_id = NULL
             WHERE id=$1 RETURNING {THREAD_COLUMNS}"
        ))
        .bind(thread.id)
        .fetch_one(&self.pool).await?;
        info!(thread_id = thread.id, "solution unmarked");
        Ok(updated)
    }
}

#[async_trait]
impl ReplyRepo for PgRepo {
    async fn list_replies_for_thread(&self, thread_id: Id) -> RepoResult<Vec<Reply>> {
        let recs = sqlx::query_as::<_, Reply>(&format!(
            "SELECT {REPLY_COLUMNS} FROM replies
             WHERE replyable_type=$1 AND replyable_id=$2
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(REPLYABLE_THREAD)
        .bind(thread_id)
        .fetch_all(&self.pool).await?;
        Ok(recs)
    }

    async fn create_reply(&self, new: NewReply) -> RepoResult<Reply> {
        let body = valid_body(&new.body)?;
        required("replyable type", &new.replyable.kind)?;
        let mut tx = self.pool.begin().await?;
        // polymorphic parent has no FK; lock the thread row so it cannot vanish mid-insert
        if let Some(thread_id) = new.replyable.thread_id() {
            sqlx::query_scalar::<_, Id>("SELECT id FROM threads WHERE id=$1 FOR SHARE")
                .bind(thread_id)
                .fetch_one(&mut *tx).await?;
        }
        let reply = sqlx::query_as::<_, Reply>(&format!(
            "INSERT INTO replies (body, author_id, replyable_type, replyable_id) VALUES ($1,$2,$3,$4) RETURNING {REPLY_COLUMNS}"
        ))
        .bind(&body)
        .bind(new.author_id)
        .bind(&new.replyable.kind)
        .bind(new.replyable.id)
        .fetch_one(&mut *tx).await?;
        tx.commit().await?;
        info!(reply_id = reply.id, replyable = %reply.replyable_type, replyable_id = reply.replyable_id, "reply created");
        Ok(reply)
    }

    async fn find_reply(&self, id: Id) -> RepoResult<Reply> {
        let reply = sqlx::query_as::<_, Reply>(&format!("SELECT {REPLY_COLUMNS} FROM replies WHERE id=$1"))
            .bind(id)
            .fetch_one(&self.pool).await?;
        Ok(reply)
    }

    async fn update_reply(&self, id: Id, upd: UpdateReply) -> RepoResult<Reply> {
        let body = upd.body.as_deref().map(valid_body).transpose()?;
        let reply = sqlx::query_as::<_, Reply>(&format!(
            "UPDATE replies SET body = COALESCE($2, body), updated_at = now() WHERE id=$1 RETURNING {REPLY_COLUMNS}"
        ))
        .bind(id)
        .bind(body.as_ref())
        .fetch_one(&self.pool).await?;
        Ok(reply)
    }

    async fn delete_reply(&self, id: Id) -> RepoResult<()> {
        let deleted = sqlx::query("DELETE FROM replies WHERE id=$1")
            .bind(id)
            .execute(&self.pool).await?
            .rows_affected();
        if deleted == 0 {
            return Err(RepoError::NotFound);
        }
        info!(reply_id = id, "reply deleted");
        Ok(())
    }
}
