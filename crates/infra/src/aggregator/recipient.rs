//! Recipient resolution and self-interaction detection (spec §4.5.1).

use notifyhub_core::{PostId, UserId};
use notifyhub_events::EventPayload;

use super::error::AggregatorError;
use crate::read_model::PostLookup;

/// Resolves the recipient of an event. `like`/`reply`/`mention` look up the
/// owner of the referenced post; `follow`'s recipient is the followee
/// directly. Returns `Ok(None)` when the referenced post has been deleted
/// (spec §4.5.1: "recipient is null and the event is dropped").
pub fn resolve_recipient(
    payload: &EventPayload,
    posts: &dyn PostLookup,
) -> Result<Option<UserId>, AggregatorError> {
    match payload {
        EventPayload::Follow { followee_id, .. } => Ok(Some(followee_id.clone())),
        EventPayload::Like { post_id, .. } => owner_of(post_id, posts),
        EventPayload::Reply { reply_to_post_id, .. } => owner_of(reply_to_post_id, posts),
        EventPayload::Mention { mentioned_user_id, .. } => Ok(Some(mentioned_user_id.clone())),
    }
}

fn owner_of(post_id: &PostId, posts: &dyn PostLookup) -> Result<Option<UserId>, AggregatorError> {
    posts
        .owner_of(post_id)
        .map_err(|e| AggregatorError::Transient(format!("post lookup: {e}")))
}

/// Spec §4.5.1: follow (`followerId == followeeId`), like/reply (`userId ==
/// recipient`), mention (`userId == mentionedUserId`).
pub fn is_self_interaction(payload: &EventPayload, recipient: &UserId) -> bool {
    match payload {
        EventPayload::Follow { follower_id, followee_id } => follower_id == followee_id,
        EventPayload::Like { user_id, .. } => user_id == recipient,
        EventPayload::Reply { user_id, .. } => user_id == recipient,
        EventPayload::Mention { user_id, mentioned_user_id, .. } => user_id == mentioned_user_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_self_is_self_interaction() {
        let payload = EventPayload::Follow {
            follower_id: UserId::new("u1"),
            followee_id: UserId::new("u1"),
        };
        assert!(is_self_interaction(&payload, &UserId::new("u1")));
    }

    #[test]
    fn like_by_recipient_is_self_interaction() {
        let payload = EventPayload::Like {
            user_id: UserId::new("u1"),
            post_id: PostId::new("p1"),
        };
        assert!(is_self_interaction(&payload, &UserId::new("u1")));
        assert!(!is_self_interaction(&payload, &UserId::new("u2")));
    }
}
