//! Credential CRUD
//!
//! Secret keys are sealed before they reach the store and opened only when
//! an adapter is about to be built.

use nimbus_cloud::CloudCredentials;
use serde::Deserialize;

use crate::db::{self, Database, credential_repo};
use crate::db::credential_repo::DeleteOutcome;
use crate::error::{ControlPlaneError, Result};
use crate::model::Credential;
use crate::secrets::SecretCipher;

#[derive(Debug, Clone, Deserialize)]
pub struct NewCredential {
    pub cloud_provider: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub region: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update
///
/// `None` keeps the stored value. `Some("")` clears the optional fields
/// (`region`, `description`) and is rejected for the required ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialUpdate {
    #[serde(default)]
    pub cloud_provider: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ControlPlaneError::BadRequest(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

#[derive(Clone)]
pub struct CredentialService {
    db: Database,
    cipher: SecretCipher,
}

impl CredentialService {
    pub fn new(db: Database, cipher: SecretCipher) -> Self {
        Self { db, cipher }
    }

    pub fn list(&self, user_id: &str) -> Result<Vec<Credential>> {
        Ok(credential_repo::list_for_user(&self.db, user_id)?)
    }

    pub fn create(&self, user_id: &str, input: &NewCredential) -> Result<Credential> {
        let now = db::now();
        let credential = Credential {
            id: db::new_id(),
            user_id: user_id.to_string(),
            provider: required("cloud_provider", &input.cloud_provider)?,
            access_key: required("access_key", &input.access_key)?,
            sealed_secret: self.cipher.seal(&required("secret_key", &input.secret_key)?)?,
            region: input.region.trim().to_string(),
            name: required("name", &input.name)?,
            description: input.description.clone(),
            created_at: now.clone(),
            updated_at: now,
        };
        credential_repo::insert(&self.db, &credential)?;

        tracing::info!(
            user_id,
            credential_id = %credential.id,
            provider = %credential.provider,
            "credential created"
        );
        Ok(credential)
    }

    pub fn get(&self, user_id: &str, id: &str) -> Result<Credential> {
        credential_repo::find_for_user(&self.db, id, user_id)?
            .ok_or_else(|| ControlPlaneError::not_found("Credential"))
    }

    pub fn update(&self, user_id: &str, id: &str, update: &CredentialUpdate) -> Result<Credential> {
        let mut credential = self.get(user_id, id)?;

        if let Some(provider) = &update.cloud_provider {
            credential.provider = required("cloud_provider", provider)?;
        }
        if let Some(access_key) = &update.access_key {
            credential.access_key = required("access_key", access_key)?;
        }
        if let Some(secret_key) = &update.secret_key {
            credential.sealed_secret = self.cipher.seal(&required("secret_key", secret_key)?)?;
        }
        if let Some(name) = &update.name {
            credential.name = required("name", name)?;
        }
        if let Some(region) = &update.region {
            credential.region = region.trim().to_string();
        }
        if let Some(description) = &update.description {
            credential.description = description.clone();
        }
        credential.updated_at = db::now();

        if !credential_repo::update(&self.db, &credential)? {
            return Err(ControlPlaneError::not_found("Credential"));
        }
        Ok(credential)
    }

    /// Refused while any task still points at the credential
    pub fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        match credential_repo::delete(&self.db, id, user_id)? {
            DeleteOutcome::Deleted => {
                tracing::info!(user_id, credential_id = id, "credential deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(ControlPlaneError::not_found("Credential")),
            DeleteOutcome::InUse(tasks) => Err(ControlPlaneError::Conflict(format!(
                "Credential is referenced by {} task(s)",
                tasks
            ))),
        }
    }

    /// Owned credential plus the opened key material for an adapter
    ///
    /// A non-empty `region` overrides the stored one.
    pub fn resolve(
        &self,
        user_id: &str,
        id: &str,
        region: Option<&str>,
    ) -> Result<(Credential, CloudCredentials)> {
        let credential = self.get(user_id, id)?;
        let secret = self.cipher.open(&credential.sealed_secret)?;
        let region = region
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(&credential.region)
            .to_string();
        let keys = CloudCredentials::new(credential.access_key.clone(), secret, Some(region));
        Ok((credential, keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{task_repo, user_repo};

    fn service() -> CredentialService {
        let db = Database::open_in_memory().unwrap();
        user_repo::insert(&db, &user_repo::tests::sample_user("alice")).unwrap();
        user_repo::insert(&db, &user_repo::tests::sample_user("bob")).unwrap();
        CredentialService::new(db, SecretCipher::derived_from("test").unwrap())
    }

    fn aws() -> NewCredential {
        NewCredential {
            cloud_provider: "AWS".into(),
            access_key: "AKIAEXAMPLE".into(),
            secret_key: "wJalrXUtnFEMI".into(),
            region: String::new(),
            name: "prod".into(),
            description: "main account".into(),
        }
    }

    #[test]
    fn test_create_seals_secret() {
        let creds = service();
        let created = creds.create("user-alice", &aws()).unwrap();
        assert_ne!(created.sealed_secret, "wJalrXUtnFEMI");

        let (stored, keys) = creds.resolve("user-alice", &created.id, None).unwrap();
        assert_eq!(stored.name, "prod");
        assert_eq!(keys.secret_key, "wJalrXUtnFEMI");
        assert_eq!(keys.region, None);

        let (_, keys) = creds
            .resolve("user-alice", &created.id, Some("ap-northeast-1"))
            .unwrap();
        assert_eq!(keys.region.as_deref(), Some("ap-northeast-1"));
    }

    #[test]
    fn test_create_requires_fields() {
        let creds = service();
        let mut input = aws();
        input.secret_key = "  ".into();
        let err = creds.create("user-alice", &input).unwrap_err();
        assert_eq!(err.to_string(), "secret_key is required");
    }

    #[test]
    fn test_other_users_see_not_found() {
        let creds = service();
        let created = creds.create("user-alice", &aws()).unwrap();

        assert!(matches!(
            creds.get("user-bob", &created.id),
            Err(ControlPlaneError::NotFound(_))
        ));
        assert!(creds.list("user-bob").unwrap().is_empty());
        assert!(matches!(
            creds.delete("user-bob", &created.id),
            Err(ControlPlaneError::NotFound(_))
        ));
        assert_eq!(creds.list("user-alice").unwrap().len(), 1);
    }

    #[test]
    fn test_update_clears_optional_fields_only() {
        let creds = service();
        let created = creds.create("user-alice", &aws()).unwrap();

        let updated = creds
            .update(
                "user-alice",
                &created.id,
                &CredentialUpdate {
                    description: Some(String::new()),
                    region: Some("eu-west-1".into()),
                    secret_key: Some("rotated".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.description, "");
        assert_eq!(updated.region, "eu-west-1");
        assert_eq!(updated.name, "prod");
        let (_, keys) = creds.resolve("user-alice", &created.id, None).unwrap();
        assert_eq!(keys.secret_key, "rotated");

        let err = creds
            .update(
                "user-alice",
                &created.id,
                &CredentialUpdate {
                    name: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::BadRequest(_)));
    }

    #[test]
    fn test_delete_refused_while_tasks_reference_it() {
        let creds = service();
        let created = creds.create("user-alice", &aws()).unwrap();
        task_repo::create(
            &creds.db,
            &task_repo::NewTask {
                user_id: "user-alice",
                credential_id: &created.id,
                task_type: "enumerate",
                name: "scan",
                parameters: "{}",
            },
            &db::now(),
        )
        .unwrap();

        let err = creds.delete("user-alice", &created.id).unwrap_err();
        assert!(matches!(err, ControlPlaneError::Conflict(_)));
        assert!(creds.get("user-alice", &created.id).is_ok());

        let spare = creds.create("user-alice", &aws()).unwrap();
        creds.delete("user-alice", &spare.id).unwrap();
        assert!(creds.get("user-alice", &spare.id).is_err());
    }
}
