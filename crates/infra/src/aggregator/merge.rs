//! The merge algorithm (spec §4.5.2): dedup, cap, count-on-new-only.

use super::slot::{AggregatePayload, IncomingRecord, PostRecord, StoredSlot, UserRecord};

/// Upserts `incoming` into `existing` (`None` if the slot does not exist
/// yet), returning the new stored slot. Pure and total: every input
/// produces a result, matching the invariants in spec §3 and the
/// boundary/dedup cases in spec §8.
pub fn merge_slot(existing: Option<StoredSlot>, incoming: IncomingRecord, ms: i64, cap: usize) -> StoredSlot {
    match incoming {
        IncomingRecord::User(rec) => merge_user_slot(existing, rec, ms, cap),
        IncomingRecord::Post { record, counts_post } => {
            merge_post_slot(existing, record, ms, cap, counts_post)
        }
    }
}

fn merge_user_slot(existing: Option<StoredSlot>, rec: UserRecord, ms: i64, cap: usize) -> StoredSlot {
    let (count_users, mut records) = match existing {
        None => {
            return StoredSlot {
                is_read: false,
                payload: AggregatePayload::UserCentric {
                    count_users: 1,
                    records: vec![rec],
                },
                updated_at: ms,
            };
        }
        Some(StoredSlot {
            payload: AggregatePayload::UserCentric { count_users, records },
            ..
        }) => (count_users, records),
        // Shape mismatch (e.g. store corruption). Treat as absent rather
        // than panic: the spec scopes exactly-once/consistency-repair out.
        Some(_) => {
            return StoredSlot {
                is_read: false,
                payload: AggregatePayload::UserCentric {
                    count_users: 1,
                    records: vec![rec],
                },
                updated_at: ms,
            };
        }
    };

    let is_new_user = !records.iter().any(|r| r.user_id == rec.user_id);
    records.push(rec);
    let deduped = dedup_keep_latest(records, |r| r.user_id.clone());
    let mut deduped = deduped;
    deduped.sort_by(|a, b| b.ts.cmp(&a.ts));
    deduped.truncate(cap);

    StoredSlot {
        is_read: false,
        payload: AggregatePayload::UserCentric {
            count_users: count_users + u64::from(is_new_user),
            records: deduped,
        },
        updated_at: ms,
    }
}

fn merge_post_slot(
    existing: Option<StoredSlot>,
    rec: PostRecord,
    ms: i64,
    cap: usize,
    counts_post: bool,
) -> StoredSlot {
    let (count_users, count_posts, mut records) = match existing {
        None => {
            return StoredSlot {
                is_read: false,
                payload: AggregatePayload::PostCentric {
                    count_users: 1,
                    count_posts: counts_post.then_some(1),
                    records: vec![rec],
                },
                updated_at: ms,
            };
        }
        Some(StoredSlot {
            payload:
                AggregatePayload::PostCentric {
                    count_users,
                    count_posts,
                    records,
                },
            ..
        }) => (count_users, count_posts, records),
        Some(_) => {
            return StoredSlot {
                is_read: false,
                payload: AggregatePayload::PostCentric {
                    count_users: 1,
                    count_posts: counts_post.then_some(1),
                    records: vec![rec],
                },
                updated_at: ms,
            };
        }
    };

    let is_new_user = !records.iter().any(|r| r.user_id == rec.user_id);
    let is_new_post = counts_post && !records.iter().any(|r| r.post_id == rec.post_id);

    records.push(rec);
    let mut deduped = dedup_keep_latest(records, |r| (r.user_id.clone(), r.post_id.clone()));
    deduped.sort_by(|a, b| b.ts.cmp(&a.ts));
    deduped.truncate(cap);

    let count_posts = count_posts.map(|c| c + u64::from(is_new_post));

    StoredSlot {
        is_read: false,
        payload: AggregatePayload::PostCentric {
            count_users: count_users + u64::from(is_new_user),
            count_posts,
            records: deduped,
        },
        updated_at: ms,
    }
}

/// Dedupes `records` (in insertion order) by `key_of`, keeping — for each
/// key — the entry with the largest `ts`; on a tie, the later occurrence in
/// `records` wins (the most recently appended contribution). Stable with
/// respect to the surviving entries' relative order, which the subsequent
/// `ts`-descending sort uses as its tiebreak (spec §4.5.2 "ties broken by
/// insertion order").
fn dedup_keep_latest<T, K, F>(records: Vec<T>, key_of: F) -> Vec<T>
where
    T: HasTs,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut deduped: Vec<T> = Vec::with_capacity(records.len());
    for record in records {
        let key = key_of(&record);
        match deduped.iter().position(|existing| key_of(existing) == key) {
            Some(pos) if record.ts() >= deduped[pos].ts() => deduped[pos] = record,
            Some(_) => {}
            None => deduped.push(record),
        }
    }
    deduped
}

trait HasTs {
    fn ts(&self) -> i64;
}

impl HasTs for UserRecord {
    fn ts(&self) -> i64 {
        self.ts
    }
}

impl HasTs for PostRecord {
    fn ts(&self) -> i64 {
        self.ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifyhub_core::{PostId, UserId};

    fn user(id: &str, ts: i64) -> UserRecord {
        UserRecord {
            user_id: UserId::new(id),
            user_nickname: format!("{id}-nick"),
            ts,
        }
    }

    fn post(user_id: &str, post_id: &str, ts: i64) -> PostRecord {
        PostRecord {
            user_id: UserId::new(user_id),
            user_nickname: format!("{user_id}-nick"),
            post_id: PostId::new(post_id),
            post_snippet: "snippet".to_string(),
            ts,
        }
    }

    #[test]
    fn single_like_creates_slot_with_count_one() {
        let slot = merge_slot(
            None,
            IncomingRecord::Post {
                record: post("U1", "P9", 1_748_772_000),
                counts_post: false,
            },
            1_748_772_000_000,
            3,
        );
        match slot.payload {
            AggregatePayload::PostCentric { count_users, count_posts, records } => {
                assert_eq!(count_users, 1);
                assert_eq!(count_posts, None);
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].ts, 1_748_772_000);
            }
            _ => panic!("expected post-centric payload"),
        }
        assert!(!slot.is_read);
    }

    #[test]
    fn dedup_on_replay_keeps_latest_ts_single_record() {
        let first = merge_slot(
            None,
            IncomingRecord::Post { record: post("U1", "P9", 100), counts_post: false },
            100_000,
            3,
        );
        let second = merge_slot(
            Some(first),
            IncomingRecord::Post { record: post("U1", "P9", 200), counts_post: false },
            200_000,
            3,
        );
        match second.payload {
            AggregatePayload::PostCentric { count_users, records, .. } => {
                assert_eq!(count_users, 1);
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].ts, 200);
            }
            _ => panic!("expected post-centric payload"),
        }
    }

    #[test]
    fn cap_overflow_keeps_most_recent_but_counts_all() {
        let mut slot: Option<StoredSlot> = None;
        for (idx, name) in ["U1", "U2", "U3", "U4", "U5"].iter().enumerate() {
            slot = Some(merge_slot(
                slot,
                IncomingRecord::User(user(name, idx as i64)),
                idx as i64 * 1000,
                3,
            ));
        }
        let slot = slot.unwrap();
        match slot.payload {
            AggregatePayload::UserCentric { count_users, records } => {
                assert_eq!(count_users, 5);
                assert_eq!(records.len(), 3);
                let ids: Vec<_> = records.iter().map(|r| r.user_id.as_str().to_string()).collect();
                assert_eq!(ids, vec!["U5", "U4", "U3"]);
            }
            _ => panic!("expected user-centric payload"),
        }
    }

    #[test]
    fn reply_chain_tracks_distinct_posts_for_same_user() {
        let first = merge_slot(
            None,
            IncomingRecord::Post { record: post("U1", "P10", 100), counts_post: true },
            100_000,
            3,
        );
        let second = merge_slot(
            Some(first),
            IncomingRecord::Post { record: post("U1", "P11", 200), counts_post: true },
            200_000,
            3,
        );
        match second.payload {
            AggregatePayload::PostCentric { count_users, count_posts, records } => {
                assert_eq!(count_users, 1);
                assert_eq!(count_posts, Some(2));
                assert_eq!(records.len(), 2);
                assert_eq!(records[0].post_id.as_str(), "P11");
                assert_eq!(records[1].post_id.as_str(), "P10");
            }
            _ => panic!("expected post-centric payload"),
        }
    }
}
