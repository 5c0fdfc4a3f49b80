//! Correlation tags carried in settlement memos.

use serde_json::Value;
use tollgate_api::{MEMO_PUBLIC_KEY, Memo};
use tollgate_primitives::PeerIdentity;

/// Peer identity tagged in a memo.
///
/// Accepts a structured memo or one JSON-encoded as text. Returns `None` for
/// a missing, unparseable or untagged memo.
pub(crate) fn tagged_peer(memo: Option<&Memo>) -> Option<PeerIdentity> {
    match memo? {
        Memo::Json(value) => peer_in_value(value),
        Memo::Text(text) => peer_in_text(text),
    }
}

fn peer_in_text(text: &str) -> Option<PeerIdentity> {
    let value: Value = serde_json::from_str(text).ok()?;
    match value {
        Value::Object(_) => peer_in_value(&value),
        _ => None,
    }
}

fn peer_in_value(value: &Value) -> Option<PeerIdentity> {
    match value {
        Value::Object(map) => map.get(MEMO_PUBLIC_KEY)?.as_str()?.parse().ok(),
        Value::String(text) => peer_in_text(text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_test_utils::test_peer;

    #[test]
    fn test_structured_tag() {
        let peer = test_peer(4);
        assert_eq!(tagged_peer(Some(&Memo::tag(&peer))), Some(peer));
    }

    #[test]
    fn test_text_tag() {
        let peer = test_peer(4);
        let text = format!(r#"{{"public_key":"{peer}"}}"#);
        assert_eq!(tagged_peer(Some(&Memo::Text(text.clone()))), Some(peer));
        assert_eq!(tagged_peer(Some(&Memo::Json(Value::String(text)))), Some(peer));
    }

    #[test]
    fn test_malformed_tags() {
        assert_eq!(tagged_peer(None), None);
        assert_eq!(tagged_peer(Some(&Memo::Text("hello".into()))), None);
        assert_eq!(tagged_peer(Some(&Memo::Text(r#"{"public_key":"0x12"}"#.into()))), None);
        assert_eq!(tagged_peer(Some(&Memo::Json(serde_json::json!({ "other": 1 })))), None);
        assert_eq!(tagged_peer(Some(&Memo::Json(serde_json::json!({ "public_key": 7 })))), None);
    }
}
