use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Institute, NewInstitute};
use crate::store::FeedbackStore;

pub struct Registry<'a> {
    store: &'a dyn FeedbackStore,
}

impl<'a> Registry<'a> {
    pub fn new(store: &'a dyn FeedbackStore) -> Self {
        Self { store }
    }

    pub async fn register(&self, input: NewInstitute) -> Result<String, ServiceError> {
        let name = required(&input.name, "Institute name")?;
        let email = required(&input.email, "Email")?;
        let admin_id = required(&input.admin_id, "Admin id")?;
        if input.password.is_empty() {
            return Err(ServiceError::Validation("Password is required".to_string()));
        }
        if !email.contains('@') {
            return Err(ServiceError::Validation(format!("Invalid email '{email}'")));
        }

        let id = match input.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => generate_code(),
        };

        let institute = Institute {
            id: id.clone(),
            name: name.to_string(),
            email: email.to_string(),
            address: input.address.trim().to_string(),
            admin_id: admin_id.to_string(),
            password_hash: hash_password(&input.password),
            created_at: Utc::now(),
        };

        if !self.store.insert_institute(&institute).await? {
            return Err(ServiceError::Conflict(id));
        }

        info!("Registered institute {id} ({name})");
        Ok(id)
    }

    /// Resolve an access id to its institute; unknown ids are `NotFound`.
    pub async fn verify(&self, id: &str) -> Result<Institute, ServiceError> {
        self.find(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invalid access id '{}'", id.trim())))
    }

    /// Admin sign-in for the dashboard. Wrong credentials and unknown ids
    /// are indistinguishable to the caller.
    pub async fn authenticate(
        &self,
        id: &str,
        admin_id: &str,
        password: &str,
    ) -> Result<Institute, ServiceError> {
        let denied = || ServiceError::NotFound("Invalid admin credentials".to_string());
        let institute = self.find(id).await?.ok_or_else(denied)?;

        if institute.admin_id != admin_id.trim()
            || !verify_password(&institute.password_hash, password)
        {
            return Err(denied());
        }
        Ok(institute)
    }

    pub async fn find(&self, id: &str) -> anyhow::Result<Option<Institute>> {
        self.store.find_institute(id.trim()).await
    }
}

fn required<'s>(value: &'s str, field: &str) -> Result<&'s str, ServiceError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{field} is required")));
    }
    Ok(value)
}

fn generate_code() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("NEXUS-{}", raw[..8].to_uppercase())
}

/// Salted SHA-256, stored as `salt$hexdigest`.
pub fn hash_password(password: &str) -> String {
    let salt = Uuid::new_v4().simple().to_string();
    format!("{salt}${}", digest(&salt, password))
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
