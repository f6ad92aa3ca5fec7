use async_trait::async_trait;

use crate::models::*;

pub use crate::error::{RepoError, RepoResult};

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn find_user(&self, id: Id) -> RepoResult<User>;
}

#[async_trait]
pub trait TopicRepo: Send + Sync {
    async fn list_topics(&self) -> RepoResult<Vec<Topic>>;
    async fn create_topic(&self, new: NewTopic) -> RepoResult<Topic>;
    async fn find_topic(&self, id: Id) -> RepoResult<Topic>;
}

#[async_trait]
pub trait ThreadRepo: Send + Sync {
    /// Newest first (`created_at` desc, then `id` desc).
    async fn find_all_paginated(&self, req: PageRequest) -> RepoResult<Page<Thread>>;
    async fn find_all_for_topic_paginated(&self, topic_id: Id, req: PageRequest) -> RepoResult<Page<Thread>>;
    async fn find_thread(&self, id: Id) -> RepoResult<Thread>;
    /// Exact, case-sensitive match.
    async fn find_by_slug(&self, slug: &str) -> RepoResult<Thread>;
    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread>;
    async fn update_thread(&self, id: Id, upd: UpdateThread) -> RepoResult<Thread>;
    /// Removes the thread together with its replies. `NotFound` if already gone.
    async fn delete_thread(&self, id: Id) -> RepoResult<()>;
    async fn mark_solution(&self, reply: &Reply) -> RepoResult<Thread>;
    async fn unmark_solution(&self, thread: &Thread) -> RepoResult<Thread>;
}

#[async_trait]
pub trait ReplyRepo: Send + Sync {
    /// Oldest first.
    async fn list_replies_for_thread(&self, thread_id: Id) -> RepoResult<Vec<Reply>>;
    async fn create_reply(&self, new: NewReply) -> RepoResult<Reply>;
    async fn find_reply(&self, id: Id) -> RepoResult<Reply>;
    async fn update_reply(&self, id: Id, upd: UpdateReply) -> RepoResult<Reply>;
    /// Also clears any solution reference pointing at the reply.
    async fn delete_reply(&self, id: Id) -> RepoResult<()>;
}

pub trait Repo: UserRepo + TopicRepo + ThreadRepo + ReplyRepo {}

impl<T> Repo for T where T: UserRepo + TopicRepo + ThreadRepo + ReplyRepo {}

// ── input checks shared by every backend ────────────────────────────

pub(crate) fn required(field: &str, value: &str) -> RepoResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RepoError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn valid_title(title: &str) -> RepoResult<String> {
    let title = required("title", title)?;
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(RepoError::Validation(format!("title may not exceed {TITLE_MAX_LEN} characters")));
    }
    Ok(title)
}

pub(crate) fn valid_body(body: &str) -> RepoResult<String> {
    required("body", body)?;
    Ok(body.to_string())
}

pub(crate) fn valid_slug(slug: &str) -> RepoResult<String> {
    if !crate::slug::is_valid_slug(slug) {
        return Err(RepoError::Validation(format!("'{slug}' is not a valid slug")));
    }
    Ok(slug.to_string())
}

/// Checked copy of an update; `None` fields stay `None`.
pub(crate) fn validate_thread_update(upd: UpdateThread) -> RepoResult<UpdateThread> {
    Ok(UpdateThread {
        title: upd.title.as_deref().map(valid_title).transpose()?,
        body: upd.body.as_deref().map(valid_body).transpose()?,
        topic_id: upd.topic_id,
        slug: upd.slug.as_deref().map(valid_slug).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(valid_title("  Foo ").unwrap(), "Foo");
        assert!(matches!(valid_title("   "), Err(RepoError::Validation(_))));
        let long = "x".repeat(TITLE_MAX_LEN + 1);
        assert!(matches!(valid_title(&long), Err(RepoError::Validation(_))));
    }

    #[test]
    fn update_validation_only_touches_supplied_fields() {
        let upd = validate_thread_update(UpdateThread { body: Some("baz".into()), ..Default::default() }).unwrap();
        assert_eq!(upd.body.as_deref(), Some("baz"));
        assert!(upd.title.is_none() && upd.slug.is_none() && upd.topic_id.is_none());

        let bad = validate_thread_update(UpdateThread { slug: Some("Not A Slug".into()), ..Default::default() });
        assert!(matches!(bad, Err(RepoError::Validation(_))));
    }
}
