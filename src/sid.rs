use rand::Rng;

use crate::types::SessionId;

/// Generates a fresh login session id.
///
/// Returns 32 lowercase hex characters (16 random bytes from the thread-local
/// CSPRNG). Panics only if the OS entropy source cannot seed the generator.
#[must_use]
pub fn new_session_id() -> SessionId {
    let random_bytes: [u8; 16] = rand::rng().random();
    SessionId::try_from(hex::encode(random_bytes)).expect("hex is a valid session id")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_session_id_length() {
        assert_eq!(new_session_id().as_str().len(), 32);
    }

    #[test]
    fn test_session_id_lower_hex() {
        let id = new_session_id();
        assert!(
            id.as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
            "session id should be lowercase hex: {id}"
        );
    }

    #[test]
    fn test_session_id_uniqueness() {
        let ids: HashSet<_> = (0..1000).map(|_| new_session_id()).collect();
        assert_eq!(ids.len(), 1000, "session ids should be unique");
    }
}
