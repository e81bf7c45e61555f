//! Filter builders scoping Qdrant requests to one profile.

use serde_json::{Value, json};
use uuid::Uuid;

fn profile_condition(profile_id: Uuid) -> Value {
    json!({
        "key": "profile_id",
        "match": { "value": profile_id.to_string() }
    })
}

/// Committed chunks of a profile: ordinals below the profile's recorded chunk count.
///
/// Chunks written by an unfinished or failed request sit at or above that count and stay
/// invisible to readers.
pub fn committed_chunks_filter(profile_id: Uuid, chunk_count: usize) -> Value {
    json!({
        "must": [
            profile_condition(profile_id),
            {
                "key": "ordinal",
                "range": { "lt": chunk_count }
            }
        ]
    })
}

/// Chunks of a profile at or above `start_ordinal`, committed or not.
pub fn chunks_from_ordinal_filter(profile_id: Uuid, start_ordinal: usize) -> Value {
    json!({
        "must": [
            profile_condition(profile_id),
            {
                "key": "ordinal",
                "range": { "gte": start_ordinal }
            }
        ]
    })
}

/// Every chunk of a profile.
pub fn all_chunks_filter(profile_id: Uuid) -> Value {
    json!({ "must": [profile_condition(profile_id)] })
}

/// Restrict profile listings to one owner; `None` when no owner is given.
pub fn owner_filter(owner: Option<&str>) -> Option<Value> {
    let owner = owner.map(str::trim).filter(|value| !value.is_empty())?;
    Some(json!({
        "must": [
            {
                "key": "owner",
                "match": { "value": owner }
            }
        ]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_filter_bounds_ordinals() {
        let id = Uuid::nil();
        assert_eq!(
            committed_chunks_filter(id, 3),
            json!({
                "must": [
                    {
                        "key": "profile_id",
                        "match": { "value": "00000000-0000-0000-0000-000000000000" }
                    },
                    {
                        "key": "ordinal",
                        "range": { "lt": 3 }
                    }
                ]
            })
        );
    }

    #[test]
    fn cleanup_filter_starts_at_ordinal() {
        let filter = chunks_from_ordinal_filter(Uuid::nil(), 7);
        assert_eq!(filter["must"][1]["range"]["gte"], 7);
        assert_eq!(all_chunks_filter(Uuid::nil())["must"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn owner_filter_ignores_blank() {
        assert!(owner_filter(None).is_none());
        assert!(owner_filter(Some("   ")).is_none());
        assert_eq!(
            owner_filter(Some(" alice ")),
            Some(json!({
                "must": [
                    { "key": "owner", "match": { "value": "alice" } }
                ]
            }))
        );
    }
}
