//! Nimbus settings
//!
//! Everything comes from environment variables; the daemon's CLI flags are
//! layered on top by `nimbusd`.
//!
//! | Variable | Default |
//! |---|---|
//! | `SERVER_HOST` | `0.0.0.0` |
//! | `SERVER_PORT` | `8080` |
//! | `DATABASE_PATH` | `<data_dir>/nimbus.db` |
//! | `JWT_SECRET` | `nimbus-dev-secret` |
//! | `JWT_EXPIRY` | `24` (hours) |
//! | `NIMBUS_SECRET_KEY` | derived from `JWT_SECRET` |
//! | `NIMBUS_ADMIN_PASSWORD` | `admin` |
//! | `TASK_QUEUE` | `sqlite` |
//! | `ENVIRONMENT` | `development` |

pub mod error;

pub use error::*;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_JWT_SECRET: &str = "nimbus-dev-secret";
pub const DEFAULT_JWT_EXPIRY_HOURS: u64 = 24;
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";
pub const DATABASE_FILE: &str = "nimbus.db";

/// Nimbusのデータディレクトリを取得（なければ作成）
pub fn data_dir() -> Result<PathBuf> {
    let dir = dirs::data_dir()
        .ok_or(ConfigError::DataDirNotFound)?
        .join("nimbus");

    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}

/// Which queue backs task delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueBackend {
    /// Durable lease queue in the task database
    #[default]
    Sqlite,
    /// Process-local queue, lost on restart
    Memory,
    /// No queue; tasks stay pending
    None,
}

impl FromStr for QueueBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(QueueBackend::Sqlite),
            "memory" => Ok(QueueBackend::Memory),
            "none" | "off" => Ok(QueueBackend::None),
            _ => Err(ConfigError::Invalid {
                key: "TASK_QUEUE",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for QueueBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueBackend::Sqlite => write!(f, "sqlite"),
            QueueBackend::Memory => write!(f, "memory"),
            QueueBackend::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub expiry_hours: u64,
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("expiry_hours", &self.expiry_hours)
            .finish()
    }
}

#[derive(Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database_path: PathBuf,
    pub jwt: JwtSettings,
    /// AES-256 key for credential secrets; `None` means derive from the JWT secret
    pub secret_key: Option<[u8; 32]>,
    pub admin_password: String,
    pub task_queue: QueueBackend,
    pub environment: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("server", &self.server)
            .field("database_path", &self.database_path)
            .field("jwt", &self.jwt)
            .field("secret_key", &self.secret_key.map(|_| "<redacted>"))
            .field("task_queue", &self.task_queue)
            .field("environment", &self.environment)
            .finish()
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T> {
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn decode_secret_key(raw: &str) -> Result<[u8; 32]> {
    let invalid = || ConfigError::Invalid {
        key: "NIMBUS_SECRET_KEY",
        value: "<redacted>".to_string(),
    };
    let bytes = BASE64.decode(raw.trim()).map_err(|_| invalid())?;
    bytes.try_into().map_err(|_| invalid())
}

impl Settings {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self> {
        let database_path = match var("DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => data_dir()?.join(DATABASE_FILE),
        };

        let secret_key = var("NIMBUS_SECRET_KEY")
            .map(|raw| decode_secret_key(&raw))
            .transpose()?;

        let task_queue = match var("TASK_QUEUE") {
            Some(raw) => raw.parse()?,
            None => QueueBackend::default(),
        };

        let settings = Self {
            server: ServerSettings {
                host: var("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: parse_var("SERVER_PORT", DEFAULT_PORT)?,
            },
            database_path,
            jwt: JwtSettings {
                secret: var("JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string()),
                expiry_hours: parse_var("JWT_EXPIRY", DEFAULT_JWT_EXPIRY_HOURS)?,
            },
            secret_key,
            admin_password: var("NIMBUS_ADMIN_PASSWORD")
                .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string()),
            task_queue,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
        };

        tracing::debug!(?settings, "settings loaded");
        Ok(settings)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// True when the JWT secret is still the built-in development value
    pub fn uses_default_jwt_secret(&self) -> bool {
        self.jwt.secret == DEFAULT_JWT_SECRET
    }
}
