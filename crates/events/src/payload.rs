//! The event payload tagged union (spec §3 "Event payload variants").

use serde::{Deserialize, Serialize};

use notifyhub_core::{PostId, UserId};

/// A domain-agnostic fact appended to the event log.
///
/// Each variant carries its own recipient-affinity key (spec §4.2.1), used
/// to choose the partition an event lands on so that every event destined
/// for the same notification slot is processed, in order, by one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Reply {
        #[serde(rename = "userId")]
        user_id: UserId,
        #[serde(rename = "postId")]
        post_id: PostId,
        #[serde(rename = "replyToPostId")]
        reply_to_post_id: PostId,
    },
    Like {
        #[serde(rename = "userId")]
        user_id: UserId,
        #[serde(rename = "postId")]
        post_id: PostId,
    },
    Follow {
        #[serde(rename = "followerId")]
        follower_id: UserId,
        #[serde(rename = "followeeId")]
        followee_id: UserId,
    },
    /// Declared in the data model; spec §9 leaves wiring this into the
    /// merge algorithm as an open question. Resolved here by treating it
    /// like reply/like: a post-centric slot keyed on the mentioning post,
    /// recipient resolved directly from `mentionedUserId` (see
    /// `aggregator::recipient::resolve_recipient`).
    Mention {
        #[serde(rename = "userId")]
        user_id: UserId,
        #[serde(rename = "postId")]
        post_id: PostId,
        #[serde(rename = "mentionedUserId")]
        mentioned_user_id: UserId,
    },
}

impl EventPayload {
    /// Stable tag used for logging and for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::Reply { .. } => "reply",
            EventPayload::Like { .. } => "like",
            EventPayload::Follow { .. } => "follow",
            EventPayload::Mention { .. } => "mention",
        }
    }

    /// The recipient-affinity key this event's partition is chosen from
    /// (spec §4.2.1): `followeeId` for follow, `postId` for like,
    /// `replyToPostId` for reply, `mentionedUserId` for mention.
    pub fn affinity_key(&self) -> &str {
        match self {
            EventPayload::Reply { reply_to_post_id, .. } => reply_to_post_id.as_str(),
            EventPayload::Like { post_id, .. } => post_id.as_str(),
            EventPayload::Follow { followee_id, .. } => followee_id.as_str(),
            EventPayload::Mention { mentioned_user_id, .. } => mentioned_user_id.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_key_matches_spec_table() {
        let reply = EventPayload::Reply {
            user_id: UserId::new("u1"),
            post_id: PostId::new("p10"),
            reply_to_post_id: PostId::new("p9"),
        };
        assert_eq!(reply.affinity_key(), "p9");

        let like = EventPayload::Like {
            user_id: UserId::new("u1"),
            post_id: PostId::new("p9"),
        };
        assert_eq!(like.affinity_key(), "p9");

        let follow = EventPayload::Follow {
            follower_id: UserId::new("u1"),
            followee_id: UserId::new("u2"),
        };
        assert_eq!(follow.affinity_key(), "u2");

        let mention = EventPayload::Mention {
            user_id: UserId::new("u1"),
            post_id: PostId::new("p9"),
            mentioned_user_id: UserId::new("u3"),
        };
        assert_eq!(mention.affinity_key(), "u3");
    }

    #[test]
    fn serializes_with_type_tag() {
        let like = EventPayload::Like {
            user_id: UserId::new("u1"),
            post_id: PostId::new("p9"),
        };
        let json = serde_json::to_value(&like).unwrap();
        assert_eq!(json["type"], "like");
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["postId"], "p9");
    }
}
