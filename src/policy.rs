//! Ownership-based authorization for forum content.
//!
//! Checks are pure predicates over an actor and a resource. A denial is a
//! plain `false`; callers decide whether to attempt the mutation at all.

use serde::{Deserialize, Serialize};

use crate::models::{Id, Reply, Thread, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Update,
    Delete,
}

impl Ability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ability::Update => "update",
            Ability::Delete => "delete",
        }
    }
}

/// Resources with a single owning author.
pub trait Authored {
    fn author_id(&self) -> Id;
}

impl Authored for Thread {
    fn author_id(&self) -> Id { self.author_id }
}

impl Authored for Reply {
    fn author_id(&self) -> Id { self.author_id }
}

fn is_owner<R: Authored + ?Sized>(actor: &User, resource: &R) -> bool {
    resource.author_id() == actor.id
}

pub struct ReplyPolicy;

impl ReplyPolicy {
    pub fn can_update(actor: &User, reply: &Reply) -> bool {
        is_owner(actor, reply)
    }

    pub fn can_delete(actor: &User, reply: &Reply) -> bool {
        is_owner(actor, reply)
    }

    pub fn allows(ability: Ability, actor: &User, reply: &Reply) -> bool {
        match ability {
            Ability::Update => Self::can_update(actor, reply),
            Ability::Delete => Self::can_delete(actor, reply),
        }
    }
}

pub struct ThreadPolicy;

impl ThreadPolicy {
    pub fn can_update(actor: &User, thread: &Thread) -> bool {
        is_owner(actor, thread)
    }

    pub fn can_delete(actor: &User, thread: &Thread) -> bool {
        is_owner(actor, thread)
    }

    pub fn allows(ability: Ability, actor: &User, thread: &Thread) -> bool {
        match ability {
            Ability::Update => Self::can_update(actor, thread),
            Ability::Delete => Self::can_delete(actor, thread),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::REPLYABLE_THREAD;
    use chrono::Utc;

    fn user(id: Id) -> User {
        User { id, name: format!("User {id}"), username: format!("user{id}"), created_at: Utc::now() }
    }

    fn reply_by(author_id: Id) -> Reply {
        let now = Utc::now();
        Reply {
            id: 10,
            body: "answer".into(),
            author_id,
            replyable_type: REPLYABLE_THREAD.into(),
            replyable_id: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn thread_by(author_id: Id) -> Thread {
        let now = Utc::now();
        Thread {
            id: 1,
            topic_id: 1,
            author_id,
            title: "Question".into(),
            slug: "question".into(),
            body: "body".into(),
            solution_reply_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reply_author_may_update_and_delete() {
        let author = user(1);
        let reply = reply_by(1);
        assert!(ReplyPolicy::can_update(&author, &reply));
        assert!(ReplyPolicy::can_delete(&author, &reply));
    }

    #[test]
    fn other_user_is_denied_on_reply() {
        let other = user(2);
        let reply = reply_by(1);
        assert!(!ReplyPolicy::can_update(&other, &reply));
        assert!(!ReplyPolicy::can_delete(&other, &reply));
        assert!(!ReplyPolicy::allows(Ability::Delete, &other, &reply));
    }

    #[test]
    fn thread_policy_follows_ownership() {
        let thread = thread_by(3);
        assert!(ThreadPolicy::allows(Ability::Update, &user(3), &thread));
        assert!(!ThreadPolicy::allows(Ability::Update, &user(4), &thread));
        assert!(!ThreadPolicy::can_delete(&user(4), &thread));
    }

    #[test]
    fn ability_names() {
        assert_eq!(Ability::Update.as_str(), "update");
        assert_eq!(serde_json::to_string(&Ability::Delete).unwrap(), "\"delete\"");
    }
}
