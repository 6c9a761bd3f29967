//! Session identity helpers
//!
//! The browser carries a long-lived random session id in an httpOnly cookie.
//! Only its SHA-256 hash is ever stored or compared.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const SESSION_COOKIE_MAX_AGE_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Lowercase hex SHA-256 of a raw session id
pub fn hash_session_id(session_id: &str) -> String {
    format!("{:x}", Sha256::digest(session_id.as_bytes()))
}

/// A fresh random session id
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Extract a cookie value from a `Cookie` header
pub fn read_cookie(cookie_header: Option<&str>, name: &str) -> Option<String> {
    let header = cookie_header?;
    header
        .split(';')
        .map(str::trim)
        .filter_map(|item| item.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for a newly minted session id
pub fn session_cookie(name: &str, session_id: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{name}={session_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_COOKIE_MAX_AGE_SECONDS}{secure}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_session_id() {
        assert_eq!(
            hash_session_id("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_read_cookie() {
        let header = Some("theme=dark; task_sid=abc123; other=1");
        assert_eq!(read_cookie(header, "task_sid"), Some("abc123".to_string()));
        assert_eq!(read_cookie(header, "missing"), None);
        assert_eq!(read_cookie(None, "task_sid"), None);
        assert_eq!(read_cookie(Some("task_sid="), "task_sid"), None);
        assert_eq!(read_cookie(Some("xtask_sid=1"), "task_sid"), None);
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie("task_sid", "abc", true);
        assert!(cookie.starts_with("task_sid=abc; Path=/; HttpOnly"));
        assert!(cookie.ends_with("; Secure"));
        assert!(!session_cookie("task_sid", "abc", false).contains("Secure"));
    }

    #[test]
    fn test_new_session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
        assert_eq!(new_session_id().len(), 32);
    }
}
