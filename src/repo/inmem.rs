use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::*;
use crate::slug::{slugify, unique_slug};

pub const SNAPSHOT_FILE: &str = "state.json";

#[derive(Default, Serialize, Deserialize)]
struct State {
    users: HashMap<Id, User>,
    topics: HashMap<Id, Topic>,
    threads: HashMap<Id, Thread>,
    replies: HashMap<Id, Reply>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn thread_slug_taken(&self, slug: &str, except: Option<Id>) -> bool {
        self.threads.values().any(|t| t.slug == slug && Some(t.id) != except)
    }

    fn page_of<F>(&self, req: PageRequest, keep: F) -> Page<Thread>
    where
        F: Fn(&Thread) -> bool,
    {
        let mut matching: Vec<&Thread> = self.threads.values().filter(|t| keep(t)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matching.len() as u64;
        let skip = usize::try_from(req.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(skip)
            .take(req.per_page as usize)
            .cloned()
            .collect();
        Page::new(items, total, req)
    }
}

/// Process-local repository. Every mutation happens under one write lock,
/// so a call rejected by its checks leaves the state untouched. A snapshot
/// write failure is reported as `Internal` after the change is applied.
#[derive(Clone, Default)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

impl InMemRepo {
    /// Empty repository without a snapshot file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `<dir>/state.json` if present and rewrites it after every mutation.
    pub async fn open(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join(SNAPSHOT_FILE);
        let state = Self::load_state_from(&path).await;
        Self {
            state: Arc::new(RwLock::new(state)),
            snapshot_path: Some(Arc::new(path)),
        }
    }

    async fn load_state_from(path: &Path) -> State {
        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    info!(path = %path.display(), "loaded snapshot");
                    s
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse snapshot, starting empty");
                    State::default()
                }
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no snapshot, starting empty");
                State::default()
            }
        }
    }

    // Called with the write guard still held so snapshots land in mutation order.
    // A failed write surfaces as `Internal`; memory already holds the change.
    async fn persist(&self, state: &State) -> RepoResult<()> {
        let Some(path) = self.snapshot_path.as_deref() else { return Ok(()) };
        let bytes = serde_json::to_vec_pretty(state).map_err(|e| {
            warn!(error = %e, "failed to serialize snapshot");
            RepoError::Internal(format!("snapshot serialization: {e}"))
        })?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                warn!(dir = %dir.display(), error = %e, "failed to create snapshot directory");
                RepoError::Internal(format!("snapshot directory: {e}"))
            })?;
        }
        tokio::fs::write(path, bytes).await.map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to write snapshot");
            RepoError::Internal(format!("snapshot write: {e}"))
        })
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let name = required("name", &new.name)?;
        let username = required("username", &new.username)?;
        let mut s = self.state.write().await;
        if s.users.values().any(|u| u.username == username) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let user = User { id, name, username, created_at: Utc::now() };
        s.users.insert(id, user.clone());
        self.persist(&s).await?;
        Ok(user)
    }

    async fn find_user(&self, id: Id) -> RepoResult<User> {
        let s = self.state.read().await;
        s.users.get(&id).cloned().ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl TopicRepo for InMemRepo {
    async fn list_topics(&self) -> RepoResult<Vec<Topic>> {
        let s = self.state.read().await;
        let mut v: Vec<_> = s.topics.values().cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn create_topic(&self, new: NewTopic) -> RepoResult<Topic> {
        let name = required("name", &new.name)?;
        let slug = slugify(&name);
        let mut s = self.state.write().await;
        if s.topics.values().any(|t| t.slug == slug) {
            return Err(RepoError::Conflict);
        }
        let id = s.next_id();
        let topic = Topic { id, name, slug, created_at: Utc::now() };
        s.topics.insert(id, topic.clone());
        self.persist(&s).await?;
        Ok(topic)
    }

    async fn find_topic(&self, id: Id) -> RepoResult<Topic> {
        let s = self.state.read().await;
        s.topics.get(&id).cloned().ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl ThreadRepo for InMemRepo {
    async fn find_all_paginated(&self, req: PageRequest) -> RepoResult<Page<Thread>> {
        let s = self.state.read().await;
        Ok(s.page_of(req, |_| true))
    }

    async fn find_all_for_topic_paginated(&self, topic_id: Id, req: PageRequest) -> RepoResult<Page<Thread>> {
        let s = self.state.read().await;
        Ok(s.page_of(req, |t| t.topic_id == topic_id))
    }

    async fn find_thread(&self, id: Id) -> RepoResult<Thread> {
        let s = self.state.read().await;
        s.threads.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn find_by_slug(&self, slug: &str) -> RepoResult<Thread> {
        let s = self.state.read().await;
        s.threads.values().find(|t| t.slug == slug).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_thread(&self, new: NewThread) -> RepoResult<Thread> {
        let title = valid_title(&new.title)?;
        let body = valid_body(&new.body)?;
        let mut s = self.state.write().await;
        if !s.users.contains_key(&new.author_id) || !s.topics.contains_key(&new.topic_id) {
            return Err(RepoError::NotFound);
        }
        let slug = unique_slug(&slugify(&title), |c| s.thread_slug_taken(c, None));
        let now = Utc::now();
        let id = s.next_id();
        let thread = Thread {
            id,
            topic_id: new.topic_id,
            author_id: new.author_id,
            title,
            slug,
            body,
            solution_reply_id: None,
            created_at: now,
            updated_at: now,
        };
        s.threads.insert(id, thread.clone());
        self.persist(&s).await?;
        info!(thread_id = id, slug = %thread.slug, "thread created");
        Ok(thread)
    }

    async fn update_thread(&self, id: Id, upd: UpdateThread) -> RepoResult<Thread> {
        let upd = validate_thread_update(upd)?;
        let mut s = self.state.write().await;

        // ── 1. every check BEFORE the mutable borrow ────────────
        if !s.threads.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        if let Some(topic_id) = upd.topic_id {
            if !s.topics.contains_key(&topic_id) {
                return Err(RepoError::NotFound);
            }
        }
        if let Some(ref slug) = upd.slug {
            if s.thread_slug_taken(slug, Some(id)) {
                return Err(RepoError::Conflict);
            }
        }

        // ── 2. apply ────────────────────────────────────────────
        let thread = s.threads.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(title) = upd.title { thread.title = title; }
        if let Some(body) = upd.body { thread.body = body; }
        if let Some(topic_id) = upd.topic_id { thread.topic_id = topic_id; }
        if let Some(slug) = upd.slug { thread.slug = slug; }
        thread.updated_at = Utc::now();

        let updated = thread.clone();
        self.persist(&s).await?;
        info!(thread_id = id, "thread updated");
        Ok(updated)
    }

    async fn delete_thread(&self, id: Id) -> RepoResult<()> {
        let mut s = self.state.write().await;
        s.threads.remove(&id).ok_or(RepoError::NotFound)?;
        let parent = Replyable::thread(id);
        let before = s.replies.len();
        s.replies.retain(|_, r| r.replyable() != parent);
        let removed = before - s.replies.len();
        self.persist(&s).await?;
        info!(thread_id = id, replies_removed = removed, "thread deleted");
        Ok(())
    }

    async fn mark_solution(&self, reply: &Reply) -> RepoResult<Thread> {
        let mut s = self.state.write().await;
        let parent = s.replies.get(&reply.id).ok_or(RepoError::NotFound)?.replyable();
        let thread_id = parent.thread_id().ok_or(RepoError::Conflict)?;
        let thread = s.threads.get_mut(&thread_id).ok_or(RepoError::NotFound)?;
        thread.solution_reply_id = Some(reply.id);
        thread.updated_at = Utc::now();
        let updated = thread.clone();
        self.persist(&s).await?;
        info!(thread_id, reply_id = reply.id, "solution marked");
        Ok(updated)
    }

    async fn unmark_solution(&self, thread: &Thread) -> RepoResult<Thread> {
        let mut s = self.state.write().await;
        let stored = s.threads.get_mut(&thread.id).ok_or(RepoError::NotFound)?;
        if stored.solution_reply_id.take().is_some() {
            stored.updated_at = Utc::now();
        }
        let updated = stored.clone();
        self.persist(&s).await?;
        info!(thread_id = thread.id, "solution unmarked");
        Ok(updated)
    }
}

#[async_trait]
impl ReplyRepo for InMemRepo {
    async fn list_replies_for_thread(&self, thread_id: Id) -> RepoResult<Vec<Reply>> {
        let s = self.state.read().await;
        let parent = Replyable::thread(thread_id);
        let mut v: Vec<_> = s.replies
            .values()
            .filter(|r| r.replyable() == parent)
            .cloned()
            .collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn create_reply(&self, new: NewReply) -> RepoResult<Reply> {
        let body = valid_body(&new.body)?;
        required("replyable type", &new.replyable.kind)?;
        let mut s = self.state.write().await;
        if !s.users.contains_key(&new.author_id) {
            return Err(RepoError::NotFound);
        }
        if let Some(thread_id) = new.replyable.thread_id() {
            if !s.threads.contains_key(&thread_id) {
                return Err(RepoError::NotFound);
            }
        }
        let now = Utc::now();
        let id = s.next_id();
        let reply = Reply {
            id,
            body,
            author_id: new.author_id,
            replyable_type: new.replyable.kind,
            replyable_id: new.replyable.id,
            created_at: now,
            updated_at: now,
        };
        s.replies.insert(id, reply.clone());
        self.persist(&s).await?;
        info!(reply_id = id, replyable = %reply.replyable_type, replyable_id = reply.replyable_id, "reply created");
        Ok(reply)
    }

    async fn find_reply(&self, id: Id) -> RepoResult<Reply> {
        let s = self.state.read().await;
        s.replies.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn update_reply(&self, id: Id, upd: UpdateReply) -> RepoResult<Reply> {
        let body = upd.body.as_deref().map(valid_body).transpose()?;
        let mut s = self.state.write().await;
        let reply = s.replies.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(body) = body { reply.body = body; }
        reply.updated_at = Utc::now();
        let updated = reply.clone();
        self.persist(&s).await?;
        Ok(updated)
    }

    async fn delete_reply(&self, id: Id) -> RepoResult<()> {
        let mut s = self.state.write().await;
        s.replies.remove(&id).ok_or(RepoError::NotFound)?;
        for thread in s.threads.values_mut().filter(|t| t.solution_reply_id == Some(id)) {
            thread.solution_reply_id = None;
        }
        self.persist(&s).await?;
        info!(reply_id = id, "reply deleted");
        Ok(())
    }
}
