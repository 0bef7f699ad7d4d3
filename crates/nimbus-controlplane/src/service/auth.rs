//! Registration, login and profile

use serde::{Deserialize, Serialize};

use crate::auth::{TokenIssuer, hash_password, verify_password};
use crate::db::{self, Database, DatabaseError, user_repo};
use crate::error::{ControlPlaneError, Result};
use crate::model::{ROLE_ADMIN, ROLE_USER, User};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_EMAIL: &str = "admin@example.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Profile changes; empty fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ControlPlaneError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// A unique index can still fire when two registrations race
fn duplicate_as_conflict(err: DatabaseError) -> ControlPlaneError {
    if err.is_unique_violation() {
        ControlPlaneError::Conflict("Username or email already exists".to_string())
    } else {
        err.into()
    }
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(db: Database, tokens: TokenIssuer) -> Self {
        Self { db, tokens }
    }

    pub fn register(&self, input: &Registration) -> Result<AuthResponse> {
        let username = input.username.trim();
        let email = input.email.trim();
        if username.is_empty() || email.is_empty() {
            return Err(ControlPlaneError::BadRequest(
                "Username and email are required".to_string(),
            ));
        }
        check_password(&input.password)?;

        if user_repo::find_by_username(&self.db, username)?.is_some() {
            return Err(ControlPlaneError::Conflict("Username already exists".to_string()));
        }
        if user_repo::find_by_email(&self.db, email)?.is_some() {
            return Err(ControlPlaneError::Conflict("Email already exists".to_string()));
        }

        let now = db::now();
        let row = user_repo::UserRow {
            user: User {
                id: db::new_id(),
                username: username.to_string(),
                email: email.to_string(),
                role: ROLE_USER.to_string(),
                created_at: now.clone(),
                updated_at: now,
            },
            password_hash: hash_password(&input.password),
        };
        user_repo::insert(&self.db, &row).map_err(duplicate_as_conflict)?;

        tracing::info!(user_id = %row.user.id, username, "user registered");
        let token = self.tokens.issue(&row.user)?;
        Ok(AuthResponse {
            user: row.user,
            token,
        })
    }

    pub fn login(&self, username: &str, password: &str) -> Result<AuthResponse> {
        let invalid = || ControlPlaneError::Unauthorized("Invalid username or password".to_string());

        let row = user_repo::find_by_username(&self.db, username.trim())?.ok_or_else(invalid)?;
        if !verify_password(password, &row.password_hash) {
            tracing::debug!(username, "password mismatch");
            return Err(invalid());
        }

        let token = self.tokens.issue(&row.user)?;
        Ok(AuthResponse {
            user: row.user,
            token,
        })
    }

    pub fn profile(&self, user_id: &str) -> Result<User> {
        user_repo::find_by_id(&self.db, user_id)?
            .map(|row| row.user)
            .ok_or_else(|| ControlPlaneError::not_found("User"))
    }

    pub fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<User> {
        let mut row = user_repo::find_by_id(&self.db, user_id)?
            .ok_or_else(|| ControlPlaneError::not_found("User"))?;

        if let Some(email) = non_empty(update.email.as_deref()) {
            if email != row.user.email {
                if user_repo::find_by_email(&self.db, email)?.is_some() {
                    return Err(ControlPlaneError::Conflict("Email already exists".to_string()));
                }
                row.user.email = email.to_string();
            }
        }
        if let Some(password) = update.password.as_deref().filter(|p| !p.is_empty()) {
            check_password(password)?;
            row.password_hash = hash_password(password);
        }

        row.user.updated_at = db::now();
        user_repo::update(&self.db, &row).map_err(duplicate_as_conflict)?;
        Ok(row.user)
    }

    /// Seed the `admin` account when no user exists yet
    pub fn ensure_admin(&self, password: &str) -> Result<bool> {
        if user_repo::count(&self.db)? > 0 {
            return Ok(false);
        }

        let now = db::now();
        let row = user_repo::UserRow {
            user: User {
                id: db::new_id(),
                username: ADMIN_USERNAME.to_string(),
                email: ADMIN_EMAIL.to_string(),
                role: ROLE_ADMIN.to_string(),
                created_at: now.clone(),
                updated_at: now,
            },
            password_hash: hash_password(password),
        };
        user_repo::insert(&self.db, &row)?;

        tracing::info!(username = ADMIN_USERNAME, "default admin user created");
        if password == nimbus_config::DEFAULT_ADMIN_PASSWORD {
            tracing::warn!("admin password is the built-in default; set NIMBUS_ADMIN_PASSWORD");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(
            Database::open_in_memory().unwrap(),
            TokenIssuer::new("test-secret", 1),
        )
    }

    fn registration(username: &str, email: &str) -> Registration {
        Registration {
            username: username.into(),
            email: email.into(),
            password: "s3cret!".into(),
        }
    }

    #[test]
    fn test_register_then_login() {
        let auth = service();
        let registered = auth.register(&registration("alice", "alice@example.com")).unwrap();
        assert_eq!(registered.user.role, ROLE_USER);

        let logged_in = auth.login("alice", "s3cret!").unwrap();
        assert_eq!(logged_in.user.id, registered.user.id);
        let claims = auth.tokens.verify(&logged_in.token).unwrap();
        assert_eq!(claims.user_id, registered.user.id);
    }

    #[test]
    fn test_register_rejects_duplicates_and_short_passwords() {
        let auth = service();
        auth.register(&registration("alice", "alice@example.com")).unwrap();

        let err = auth.register(&registration("alice", "other@example.com")).unwrap_err();
        assert_eq!(err.to_string(), "Username already exists");
        let err = auth.register(&registration("bob", "alice@example.com")).unwrap_err();
        assert_eq!(err.to_string(), "Email already exists");

        let mut short = registration("carol", "carol@example.com");
        short.password = "12345".into();
        assert!(matches!(
            auth.register(&short),
            Err(ControlPlaneError::BadRequest(_))
        ));
    }

    #[test]
    fn test_login_failures_look_alike() {
        let auth = service();
        auth.register(&registration("alice", "alice@example.com")).unwrap();

        let wrong_password = auth.login("alice", "nope").unwrap_err();
        let unknown_user = auth.login("mallory", "nope").unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
        assert!(matches!(unknown_user, ControlPlaneError::Unauthorized(_)));
    }

    #[test]
    fn test_update_profile_ignores_empty_fields() {
        let auth = service();
        let user = auth.register(&registration("alice", "alice@example.com")).unwrap().user;

        let updated = auth
            .update_profile(
                &user.id,
                &ProfileUpdate {
                    email: Some(String::new()),
                    password: Some("n3w-password".into()),
                },
            )
            .unwrap();
        assert_eq!(updated.email, "alice@example.com");
        assert!(auth.login("alice", "n3w-password").is_ok());
        assert!(auth.login("alice", "s3cret!").is_err());

        let updated = auth
            .update_profile(
                &user.id,
                &ProfileUpdate {
                    email: Some("new@example.com".into()),
                    password: None,
                },
            )
            .unwrap();
        assert_eq!(updated.email, "new@example.com");
        assert_eq!(auth.profile(&user.id).unwrap().email, "new@example.com");
    }

    #[test]
    fn test_ensure_admin_only_seeds_empty_store() {
        let auth = service();
        assert!(auth.ensure_admin("adminpw").unwrap());
        assert!(!auth.ensure_admin("adminpw").unwrap());

        let admin = auth.login(ADMIN_USERNAME, "adminpw").unwrap().user;
        assert!(admin.is_admin());
        assert_eq!(admin.email, ADMIN_EMAIL);
    }
}
