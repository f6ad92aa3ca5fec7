use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Postgres-compatible row identity (BIGSERIAL)
pub type Id = i64;

/// `replyable_type` value for replies attached to a thread.
pub const REPLYABLE_THREAD: &str = "threads";

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const TITLE_MAX_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Topic {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTopic {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Thread {
    pub id: Id,
    pub topic_id: Id,
    pub author_id: Id,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub solution_reply_id: Option<Id>, // weak reference, never owns the reply
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    pub fn is_solution_reply(&self, reply: &Reply) -> bool {
        self.solution_reply_id == Some(reply.id)
    }

    pub fn was_resolved(&self) -> bool {
        self.solution_reply_id.is_some()
    }

    pub fn is_authored_by(&self, user: &User) -> bool {
        self.author_id == user.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewThread {
    pub author_id: Id,
    pub topic_id: Id,
    pub title: String,
    pub body: String,
}

impl NewThread {
    pub fn new(author: &User, topic: &Topic, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author_id: author.id,
            topic_id: topic.id,
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Partial update; `None` leaves the column as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateThread {
    pub title: Option<String>,
    pub body: Option<String>,
    pub topic_id: Option<Id>,
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reply {
    pub id: Id,
    pub body: String,
    pub author_id: Id,
    pub replyable_type: String,
    pub replyable_id: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reply {
    pub fn replyable(&self) -> Replyable {
        Replyable { kind: self.replyable_type.clone(), id: self.replyable_id }
    }

    pub fn is_authored_by(&self, user: &User) -> bool {
        self.author_id == user.id
    }
}

/// Typed foreign key pair naming the entity a reply belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Replyable {
    pub kind: String,
    pub id: Id,
}

impl Replyable {
    pub fn thread(id: Id) -> Self {
        Self { kind: REPLYABLE_THREAD.to_string(), id }
    }

    /// Thread id when the parent is a thread.
    pub fn thread_id(&self) -> Option<Id> {
        (self.kind == REPLYABLE_THREAD).then_some(self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReply {
    pub author_id: Id,
    pub replyable: Replyable,
    pub body: String,
}

impl NewReply {
    pub fn to_thread(author: &User, thread: &Thread, body: impl Into<String>) -> Self {
        Self {
            author_id: author.id,
            replyable: Replyable::thread(thread.id),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReply {
    pub body: Option<String>,
}

/// 1-based page selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(per_page: u32) -> Self {
        Self { page: 1, per_page: per_page.max(1) }
    }

    pub fn page(self, page: u32) -> Self {
        Self { page: page.max(1), ..self }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, req: PageRequest) -> Self {
        Self { items, total, page: req.page, per_page: req.per_page }
    }

    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn last_page(&self) -> u32 {
        let pages = self.total.div_ceil(u64::from(self.per_page.max(1)));
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }

    pub fn next_page(&self) -> Option<u32> {
        (self.page < self.last_page()).then(|| self.page + 1)
    }

    pub fn has_more_pages(&self) -> bool {
        self.next_page().is_some()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Page<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_math() {
        let p = Page::new(vec![1, 2], 5, PageRequest::new(2));
        assert_eq!(p.len(), 2);
        assert_eq!(p.last_page(), 3);
        assert_eq!(p.next_page(), Some(2));

        let last = Page::new(vec![5], 5, PageRequest::new(2).page(3));
        assert_eq!(last.next_page(), None);
        assert!(!last.has_more_pages());
    }

    #[test]
    fn empty_page_is_single_last_page() {
        let p: Page<i32> = Page::new(vec![], 0, PageRequest::default());
        assert!(p.is_empty());
        assert_eq!(p.last_page(), 1);
        assert_eq!(p.next_page(), None);
    }

    #[test]
    fn request_offset_clamps_page_zero() {
        assert_eq!(PageRequest::new(10).page(0).offset(), 0);
        assert_eq!(PageRequest::new(10).page(3).offset(), 20);
        assert_eq!(PageRequest::new(0).per_page, 1);
    }

    #[test]
    fn replyable_thread_id_only_for_threads() {
        assert_eq!(Replyable::thread(7).thread_id(), Some(7));
        let other = Replyable { kind: "articles".into(), id: 7 };
        assert_eq!(other.thread_id(), None);
    }
}
