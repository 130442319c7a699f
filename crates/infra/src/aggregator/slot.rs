//! The notification slot and its aggregate payload (spec §3).

use serde::{Deserialize, Serialize};

use notifyhub_core::{PostId, UserId};

/// Primary key of a notification slot: `(recipient, slot, term)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub recipient: UserId,
    pub slot: String,
    pub term: String,
}

impl SlotKey {
    pub fn follow(recipient: UserId, term: String) -> Self {
        Self {
            recipient,
            slot: "follow".to_string(),
            term,
        }
    }

    pub fn like(recipient: UserId, post_id: &PostId, term: String) -> Self {
        Self {
            recipient,
            slot: format!("like:{post_id}"),
            term,
        }
    }

    pub fn reply(recipient: UserId, post_id: &PostId, term: String) -> Self {
        Self {
            recipient,
            slot: format!("reply:{post_id}"),
            term,
        }
    }

    pub fn mention(recipient: UserId, post_id: &PostId, term: String) -> Self {
        Self {
            recipient,
            slot: format!("mention:{post_id}"),
            term,
        }
    }
}

/// A record in a user-centric (follow) slot's `records` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "userNickname")]
    pub user_nickname: String,
    pub ts: i64,
}

/// A record in a post-centric (like/reply/mention) slot's `records` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "userNickname")]
    pub user_nickname: String,
    #[serde(rename = "postId")]
    pub post_id: PostId,
    #[serde(rename = "postSnippet")]
    pub post_snippet: String,
    pub ts: i64,
}

/// The JSON document stored in a slot (spec §3). Two shapes, chosen by the
/// slot's kind. Tagged explicitly rather than left `untagged`: both shapes
/// share a `records` field, and an untagged enum would let a malformed
/// post-centric row silently deserialize as user-centric (extra fields are
/// ignored by default), masking a schema bug instead of reporting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregatePayload {
    UserCentric {
        #[serde(rename = "countUsers")]
        count_users: u64,
        records: Vec<UserRecord>,
    },
    PostCentric {
        #[serde(rename = "countUsers")]
        count_users: u64,
        #[serde(rename = "countPosts", skip_serializing_if = "Option::is_none")]
        count_posts: Option<u64>,
        records: Vec<PostRecord>,
    },
}

/// A slot row as stored (spec §3).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSlot {
    pub is_read: bool,
    pub payload: AggregatePayload,
    /// Milliseconds since Unix epoch of the event that produced this write.
    pub updated_at: i64,
}

/// The single inbound contribution a merge applies to a slot; which variant
/// is used is fixed by the event type (spec §4.5.2).
#[derive(Debug, Clone)]
pub enum IncomingRecord {
    User(UserRecord),
    /// `counts_post` is true for reply/mention, false for like (spec §3:
    /// `countPosts` only applies to reply/mention slots).
    Post { record: PostRecord, counts_post: bool },
}

/// Whether `existing` already has a record keyed by `user_id`, ignoring the
/// referenced post — used both to decide `isNewUser` and to decide whether
/// a nickname lookup can be skipped in favor of the cached value.
pub fn user_record_in(records: &[UserRecord], user_id: &UserId) -> Option<&UserRecord> {
    records.iter().find(|r| &r.user_id == user_id)
}

pub fn post_user_record_in<'a>(
    records: &'a [PostRecord],
    user_id: &UserId,
) -> Option<&'a PostRecord> {
    records.iter().find(|r| &r.user_id == user_id)
}

pub fn post_record_in<'a>(records: &'a [PostRecord], post_id: &PostId) -> Option<&'a PostRecord> {
    records.iter().find(|r| &r.post_id == post_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_key_names_match_spec_table() {
        let recipient = UserId::new("u2");
        let post = PostId::new("p9");
        assert_eq!(SlotKey::follow(recipient.clone(), "2025-06-01".into()).slot, "follow");
        assert_eq!(SlotKey::like(recipient.clone(), &post, "2025-06-01".into()).slot, "like:p9");
        assert_eq!(SlotKey::reply(recipient.clone(), &post, "2025-06-01".into()).slot, "reply:p9");
        assert_eq!(SlotKey::mention(recipient, &post, "2025-06-01".into()).slot, "mention:p9");
    }

    #[test]
    fn cross_day_likes_key_into_distinct_terms() {
        // 2025-06-01T23:59:00Z and 2025-06-02T00:01:00Z (UTC), same post.
        let term_a = notifyhub_core::term_for(1_748_822_340_000, notifyhub_core::parse_tz("UTC").unwrap());
        let term_b = notifyhub_core::term_for(1_748_822_460_000, notifyhub_core::parse_tz("UTC").unwrap());
        assert_ne!(term_a, term_b);

        let recipient = UserId::new("U2");
        let post = PostId::new("P9");
        let key_a = SlotKey::like(recipient.clone(), &post, term_a);
        let key_b = SlotKey::like(recipient, &post, term_b);
        assert_ne!(key_a, key_b);
    }
}
