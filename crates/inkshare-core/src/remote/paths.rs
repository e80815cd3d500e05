//! Namespace layout of the shared store.

/// Namespace holding session metadata, keyed by session id.
pub const SESSIONS: &str = "sessions";

/// Drawing records of a session, keyed by ObjectId.
pub fn drawings(session_id: &str) -> String {
    format!("drawings/{}/paths", session_id)
}

/// Participants of a session, keyed by user id.
pub fn participants(session_id: &str) -> String {
    format!("participants/{}", session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_layout() {
        assert_eq!(drawings("abc"), "drawings/abc/paths");
        assert_eq!(participants("abc"), "participants/abc");
    }
}
