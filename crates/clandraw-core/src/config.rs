// Configuration loading and parsing (clandraw.toml, users.toml).

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::archive::DEFAULT_MAX_BYTES;
use crate::auth::Role;

const SETTINGS_FILE: &str = "clandraw.toml";
const USERS_FILE: &str = "users.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub archive: ArchiveConfig,
    pub draw: DrawConfig,
    pub users: Vec<UserConfig>,
}

// ---------------------------------------------------------------------------
// clandraw.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for clandraw.toml.
#[derive(Debug, Clone, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    archive: ArchiveConfig,
    #[serde(default)]
    draw: DrawConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on, e.g. "127.0.0.1:3000".
    pub bind_addr: String,
    /// Directory served under `/public`.
    pub public_dir: String,
    /// Idle lifetime of a login session in seconds. 0 keeps sessions until
    /// logout, eviction or restart.
    pub session_ttl_secs: u64,
    /// Live sessions kept at once; the least recently used is evicted.
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "127.0.0.1:3000".into(),
            public_dir: "public".into(),
            session_ttl_secs: 0,
            max_sessions: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dir: String,
    pub max_bytes: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            dir: "public/screenshots".into(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DrawConfig {
    /// Count used when a draw request carries no `count`.
    pub default_count: i64,
}

impl Default for DrawConfig {
    fn default() -> Self {
        DrawConfig { default_count: 20 }
    }
}

// ---------------------------------------------------------------------------
// users.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub role: Role,
    /// bcrypt hash of the password (`$2b$<cost>$...`).
    pub password_hash: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/clandraw.toml` and
/// `config/users.toml`, relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()` for normal startup.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let settings_path = config_dir.join(SETTINGS_FILE);
    let settings_text = read_file(&settings_path)?;
    let settings: SettingsFile =
        toml::from_str(&settings_text).map_err(|e| ConfigError::ParseError {
            path: settings_path.clone(),
            source: e,
        })?;

    let users_path = config_dir.join(USERS_FILE);
    let users_text = read_file(&users_path)?;
    let users_file: UsersFile =
        toml::from_str(&users_text).map_err(|e| ConfigError::ParseError {
            path: users_path.clone(),
            source: e,
        })?;

    let config = Config {
        server: settings.server,
        archive: settings.archive,
        draw: settings.draw,
        users: users_file.users,
    };

    validate(&config)?;

    Ok(config)
}

/// Copy `clandraw.toml` and `users.toml` from `defaults/` into `config/`
/// when they are missing there. Existing config files are never touched.
/// Returns the files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    let mut copied = Vec::new();
    for name in [SETTINGS_FILE, USERS_FILE] {
        let target = config_dir.join(name);
        if target.exists() {
            continue;
        }

        let source = defaults_dir.join(name);
        if !source.is_file() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "{name} is in neither config/ nor defaults/ under {}",
                    base_dir.display()
                ),
            });
        }

        std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", config_dir.display()),
        })?;
        std::fs::copy(&source, &target).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to copy {} to {}: {e}", source.display(), target.display()),
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying defaults
/// first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.bind_addr.parse::<SocketAddr>().is_err() {
        return Err(invalid(
            "server.bind_addr",
            format!("`{}` is not a socket address", config.server.bind_addr),
        ));
    }

    if config.archive.dir.trim().is_empty() {
        return Err(invalid("archive.dir", "must not be empty"));
    }
    if config.archive.max_bytes == 0 {
        return Err(invalid("archive.max_bytes", "must be > 0"));
    }

    if config.draw.default_count < 1 {
        return Err(invalid(
            "draw.default_count",
            format!("must be >= 1, got {}", config.draw.default_count),
        ));
    }

    if config.server.max_sessions == 0 {
        return Err(invalid("server.max_sessions", "must be > 0"));
    }

    if config.users.is_empty() {
        return Err(invalid("users", "at least one user is required"));
    }

    let mut seen = HashSet::new();
    for (idx, user) in config.users.iter().enumerate() {
        if user.username.is_empty() {
            return Err(invalid(format!("users[{idx}].username"), "must not be empty"));
        }
        if !seen.insert(user.username.as_str()) {
            return Err(invalid(
                format!("users[{idx}].username"),
                format!("duplicate username `{}`", user.username),
            ));
        }
        if !is_bcrypt_hash(&user.password_hash) {
            return Err(invalid(
                format!("users[{idx}].password_hash"),
                "must be a bcrypt hash such as `$2b$12$...`",
            ));
        }
    }

    Ok(())
}

/// Shape check for a modular-crypt bcrypt string: `$2a$`, `$2b$` or `$2y$`,
/// a two-digit cost from 04 to 31, then 53 characters of salt and digest.
fn is_bcrypt_hash(hash: &str) -> bool {
    const ALPHABET: &str = "./ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    let mut parts = hash.splitn(4, '$');
    let (Some(""), Some(version), Some(cost), Some(rest)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    matches!(version, "2a" | "2b" | "2y")
        && cost.len() == 2
        && cost.parse::<u32>().is_ok_and(|c| (4..=31).contains(&c))
        && rest.len() == 53
        && rest.chars().all(|c| ALPHABET.contains(c))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ADMIN_HASH: &str = "$2b$04$hiServpzcX2zPmEdbx/jFOJCBwA2UVyJrSJhYz735bbCTxorbjCPa";

    /// The workspace root, which holds `defaults/`.
    fn project_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
    }

    fn write_config(tmp: &TempDir, settings: &str, users: &str) {
        let config_dir = tmp.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("clandraw.toml"), settings).unwrap();
        fs::write(config_dir.join("users.toml"), users).unwrap();
    }

    fn one_admin() -> String {
        format!(
            "[[users]]\nusername = \"admin\"\nrole = \"admin\"\npassword_hash = \"{ADMIN_HASH}\"\n"
        )
    }

    fn validation_field(err: ConfigError) -> String {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    #[test]
    fn load_valid_config_from_project_defaults() {
        let tmp = TempDir::new().unwrap();
        let defaults = tmp.path().join("defaults");
        fs::create_dir_all(&defaults).unwrap();
        for name in ["clandraw.toml", "users.toml"] {
            fs::copy(project_root().join("defaults").join(name), defaults.join(name)).unwrap();
        }

        ensure_config_files(tmp.path()).expect("should copy default configs");
        let config = load_config_from(tmp.path()).expect("should load valid config");

        assert_eq!(config.server.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.archive.dir, "public/screenshots");
        assert_eq!(config.archive.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.draw.default_count, 20);
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[0].username, "admin");
        assert_eq!(config.users[0].role, Role::Admin);
        assert_eq!(config.users[1].role, Role::Uploader);
        assert!(config.users.iter().all(|u| is_bcrypt_hash(&u.password_hash)));
    }

    #[test]
    fn empty_settings_use_defaults() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "", &one_admin());

        let config = load_config_from(tmp.path()).unwrap();
        assert_eq!(config.server.public_dir, "public");
        assert_eq!(config.server.session_ttl_secs, 0);
        assert_eq!(config.server.max_sessions, 1024);
        assert_eq!(config.archive.max_bytes, DEFAULT_MAX_BYTES);
        assert_eq!(config.draw.default_count, 20);
    }

    #[test]
    fn missing_users_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let config_dir = tmp.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("clandraw.toml"), "").unwrap();

        match load_config_from(tmp.path()).unwrap_err() {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("users.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "this is not valid [[[ toml", &one_admin());

        match load_config_from(tmp.path()).unwrap_err() {
            ConfigError::ParseError { path, .. } => assert!(path.ends_with("clandraw.toml")),
            other => panic!("expected ParseError, got: {other}"),
        }
    }

    #[test]
    fn unknown_role_is_a_parse_error() {
        let tmp = TempDir::new().unwrap();
        let users = format!(
            "[[users]]\nusername = \"x\"\nrole = \"root\"\npassword_hash = \"{ADMIN_HASH}\"\n"
        );
        write_config(&tmp, "", &users);
        assert!(matches!(
            load_config_from(tmp.path()).unwrap_err(),
            ConfigError::ParseError { .. }
        ));
    }

    #[test]
    fn rejects_bad_bind_addr() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "[server]\nbind_addr = \"localhost\"\n", &one_admin());
        let err = load_config_from(tmp.path()).unwrap_err();
        assert_eq!(validation_field(err), "server.bind_addr");
    }

    #[test]
    fn rejects_zero_max_bytes() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "[archive]\nmax_bytes = 0\n", &one_admin());
        let err = load_config_from(tmp.path()).unwrap_err();
        assert_eq!(validation_field(err), "archive.max_bytes");
    }

    #[test]
    fn rejects_zero_default_count() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "[draw]\ndefault_count = 0\n", &one_admin());
        let err = load_config_from(tmp.path()).unwrap_err();
        assert_eq!(validation_field(err), "draw.default_count");
    }

    #[test]
    fn rejects_empty_user_list() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "", "");
        let err = load_config_from(tmp.path()).unwrap_err();
        assert_eq!(validation_field(err), "users");
    }

    #[test]
    fn rejects_duplicate_usernames() {
        let tmp = TempDir::new().unwrap();
        let users = format!("{}{}", one_admin(), one_admin());
        write_config(&tmp, "", &users);
        let err = load_config_from(tmp.path()).unwrap_err();
        assert_eq!(validation_field(err), "users[1].username");
    }

    #[test]
    fn rejects_zero_max_sessions() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "[server]\nmax_sessions = 0\n", &one_admin());
        let err = load_config_from(tmp.path()).unwrap_err();
        assert_eq!(validation_field(err), "server.max_sessions");
    }

    #[test]
    fn rejects_plaintext_and_sha256_passwords() {
        for hash in [
            "admin123",
            "240be518fabd2724ddb6f04eeb1da5967448d7e831c08c8fa822809f74c720a9",
        ] {
            let tmp = TempDir::new().unwrap();
            let users = format!(
                "[[users]]\nusername = \"admin\"\nrole = \"admin\"\npassword_hash = \"{hash}\"\n"
            );
            write_config(&tmp, "", &users);
            let err = load_config_from(tmp.path()).unwrap_err();
            assert_eq!(validation_field(err), "users[0].password_hash");
        }
    }

    #[test]
    fn bcrypt_hash_shape() {
        assert!(is_bcrypt_hash(ADMIN_HASH));
        assert!(is_bcrypt_hash(
            "$2a$05$CCCCCCCCCCCCCCCCCCCCC.E5YPO9kmyuRGyh0XouQYb4YMJKvyOeW"
        ));
        assert!(!is_bcrypt_hash("$2b$03$hiServpzcX2zPmEdbx/jFOJCBwA2UVyJrSJhYz735bbCTxorbjCPa"));
        assert!(!is_bcrypt_hash("$2x$04$hiServpzcX2zPmEdbx/jFOJCBwA2UVyJrSJhYz735bbCTxorbjCPa"));
        assert!(!is_bcrypt_hash("$2b$04$tooshort"));
        assert!(!is_bcrypt_hash("2b$04$hiServpzcX2zPmEdbx/jFOJCBwA2UVyJrSJhYz735bbCTxorbjCPa$"));
    }

    #[test]
    fn ensure_config_files_copies_missing_and_skips_existing() {
        let tmp = TempDir::new().unwrap();
        let defaults_dir = tmp.path().join("defaults");
        let config_dir = tmp.path().join("config");
        fs::create_dir_all(&defaults_dir).unwrap();
        fs::create_dir_all(&config_dir).unwrap();

        fs::write(defaults_dir.join("clandraw.toml"), "").unwrap();
        fs::write(defaults_dir.join("users.toml"), one_admin()).unwrap();
        fs::write(defaults_dir.join("notes.txt"), "").unwrap();
        fs::write(config_dir.join("clandraw.toml"), "# custom\n").unwrap();

        let copied = ensure_config_files(tmp.path()).unwrap();
        assert_eq!(copied.len(), 1);
        assert!(copied[0].ends_with("users.toml"));
        assert!(!config_dir.join("notes.txt").exists());
        assert_eq!(
            fs::read_to_string(config_dir.join("clandraw.toml")).unwrap(),
            "# custom\n"
        );

        assert!(ensure_config_files(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn ensure_config_files_errors_when_a_file_has_no_source() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("defaults")).unwrap();
        fs::write(tmp.path().join("defaults/clandraw.toml"), "").unwrap();

        match ensure_config_files(tmp.path()).unwrap_err() {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("users.toml"), "{message}");
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }
    }

    #[test]
    fn ensure_config_files_without_defaults_keeps_existing_config() {
        let tmp = TempDir::new().unwrap();
        write_config(&tmp, "", &one_admin());
        assert!(ensure_config_files(tmp.path()).unwrap().is_empty());
    }
}
