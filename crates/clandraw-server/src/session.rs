// Login sessions and credential checks.
//
// Sessions are held in memory and addressed by a random id carried in the
// `clandraw_session` cookie. Each session stores exactly one role. The table
// is bounded: past its capacity the least recently used session is evicted.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap};
use clandraw_core::auth::Role;
use clandraw_core::config::UserConfig;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "clandraw_session";

#[derive(Debug, Clone)]
struct Session {
    username: String,
    role: Role,
    last_seen: Instant,
}

/// In-memory session table with optional idle expiry and a size cap.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: Option<Duration>,
    capacity: usize,
}

impl SessionStore {
    /// `ttl` of `None` keeps sessions until logout, eviction or restart.
    /// `capacity` is clamped to at least one session.
    pub fn new(ttl: Option<Duration>, capacity: usize) -> Self {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        // The table holds no invariants a panicking writer could break.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a session and return its id.
    pub fn create(&self, username: &str, role: Role) -> String {
        let id = Uuid::new_v4().to_string();
        let mut sessions = self.lock();
        if let Some(ttl) = self.ttl {
            sessions.retain(|_, s| s.last_seen.elapsed() <= ttl);
        }
        while sessions.len() >= self.capacity {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_seen)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            if let Some(s) = sessions.remove(&oldest) {
                debug!("Evicted idle session for {}", s.username);
            }
        }
        sessions.insert(
            id.clone(),
            Session {
                username: username.to_string(),
                role,
                last_seen: Instant::now(),
            },
        );
        info!("Session started for {} ({})", username, role);
        id
    }

    /// The role of a live session, refreshing its idle timer.
    pub fn role_of(&self, id: &str) -> Option<Role> {
        let mut sessions = self.lock();
        let session = sessions.get_mut(id)?;
        if self.ttl.is_some_and(|ttl| session.last_seen.elapsed() > ttl) {
            if let Some(s) = sessions.remove(id) {
                debug!("Session for {} expired", s.username);
            }
            return None;
        }
        session.last_seen = Instant::now();
        Some(session.role)
    }

    /// End a session. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        match self.lock().remove(id) {
            Some(s) => {
                info!("Session ended for {}", s.username);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extract the session id from the request's `Cookie` headers.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(id: &str) -> String {
    format!("{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax")
}

pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// bcrypt hash checked when the username is unknown, so a miss costs the
/// same as a wrong password.
const UNKNOWN_USER_HASH: &str = "$2b$10$fJVboospnxfF9K.uVn9LBOZHj/6kQqoXTSSMygZ/PkYI.SzJI7de.";

/// Configured accounts with bcrypt password hashes.
#[derive(Debug, Clone)]
pub struct Credentials {
    users: Vec<UserConfig>,
}

impl Credentials {
    pub fn new(users: Vec<UserConfig>) -> Self {
        Credentials { users }
    }

    /// Check a username/password pair and return the account's role.
    ///
    /// bcrypt is deliberately slow; call this off the async executor.
    pub fn verify(&self, username: &str, password: &str) -> Option<Role> {
        let user = self.users.iter().find(|u| u.username == username);
        let hash = user.map_or(UNKNOWN_USER_HASH, |u| u.password_hash.as_str());

        match bcrypt::verify(password, hash) {
            Ok(true) => user.map(|u| u.role),
            Ok(false) => None,
            Err(e) => {
                warn!("Unusable password hash for {:?}: {}", username, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn credentials() -> Credentials {
        Credentials::new(vec![
            UserConfig {
                username: "admin".into(),
                role: Role::Admin,
                password_hash: bcrypt::hash("admin123", 4).unwrap(),
            },
            UserConfig {
                username: "uploader".into(),
                role: Role::Uploader,
                password_hash: "$2y$04$v0C6EobQRjgNP4G4hQ6yNe8O3omXwvwmRNFdpFSkxZdS81Ykx87Ru".into(),
            },
        ])
    }

    #[test]
    fn verify_accepts_correct_password() {
        let creds = credentials();
        assert_eq!(creds.verify("admin", "admin123"), Some(Role::Admin));
        assert_eq!(creds.verify("uploader", "upload123"), Some(Role::Uploader));
    }

    #[test]
    fn verify_rejects_wrong_password_or_user() {
        let creds = credentials();
        assert_eq!(creds.verify("admin", "upload123"), None);
        assert_eq!(creds.verify("admin", ""), None);
        assert_eq!(creds.verify("nobody", "admin123"), None);
    }

    #[test]
    fn verify_rejects_malformed_stored_hash() {
        let creds = Credentials::new(vec![UserConfig {
            username: "broken".into(),
            role: Role::Admin,
            password_hash: "not-a-hash".into(),
        }]);
        assert_eq!(creds.verify("broken", "not-a-hash"), None);
    }

    #[test]
    fn verify_accepts_the_shipped_defaults() {
        let creds = Credentials::new(vec![
            UserConfig {
                username: "admin".into(),
                role: Role::Admin,
                password_hash: "$2b$10$fbov/3MrduGBDiw3xJL4H.6db/0b847FcN2eUWtZink9kVKHtxHLO"
                    .into(),
            },
            UserConfig {
                username: "uploader".into(),
                role: Role::Uploader,
                password_hash: "$2b$10$Ir2W5RBbgr8cv732yt/cWO7iUoLcEVUYIR3pu2KJJRxR.S8RgFm3e"
                    .into(),
            },
        ]);
        assert_eq!(creds.verify("admin", "admin123"), Some(Role::Admin));
        assert_eq!(creds.verify("uploader", "upload123"), Some(Role::Uploader));
    }

    #[test]
    fn session_lifecycle() {
        let store = SessionStore::new(None, 16);
        let id = store.create("admin", Role::Admin);

        assert_eq!(store.role_of(&id), Some(Role::Admin));
        assert_eq!(store.len(), 1);
        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert_eq!(store.role_of(&id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn sessions_expire_after_idle_ttl() {
        let store = SessionStore::new(Some(Duration::from_millis(20)), 16);
        let id = store.create("admin", Role::Admin);
        assert_eq!(store.role_of(&id), Some(Role::Admin));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(store.role_of(&id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn least_recently_used_session_is_evicted_at_capacity() {
        let store = SessionStore::new(None, 2);
        let first = store.create("admin", Role::Admin);
        std::thread::sleep(Duration::from_millis(5));
        let second = store.create("uploader", Role::Uploader);
        std::thread::sleep(Duration::from_millis(5));

        // Touching the first session makes the second the oldest.
        assert_eq!(store.role_of(&first), Some(Role::Admin));
        std::thread::sleep(Duration::from_millis(5));
        let third = store.create("admin", Role::Admin);

        assert_eq!(store.len(), 2);
        assert_eq!(store.role_of(&second), None);
        assert_eq!(store.role_of(&first), Some(Role::Admin));
        assert_eq!(store.role_of(&third), Some(Role::Admin));
    }

    #[test]
    fn many_logins_never_exceed_capacity() {
        let store = SessionStore::new(None, 8);
        for _ in 0..100 {
            store.create("admin", Role::Admin);
        }
        assert_eq!(store.len(), 8);
    }

    #[test]
    fn session_ids_are_unique() {
        let store = SessionStore::new(None, 16);
        let a = store.create("admin", Role::Admin);
        let b = store.create("admin", Role::Admin);
        assert_ne!(a, b);
    }

    #[test]
    fn session_id_is_read_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; clandraw_session=abc-123; other=1"),
        );
        assert_eq!(session_id(&headers).as_deref(), Some("abc-123"));

        let mut empty = HeaderMap::new();
        empty.insert(header::COOKIE, HeaderValue::from_static("clandraw_session="));
        assert_eq!(session_id(&empty), None);
        assert_eq!(session_id(&HeaderMap::new()), None);
    }
}
