use std::ops::{Deref, DerefMut};

use mongodb::error::Error as DbError;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::model::mongodb::{Coll, Id};

/// Core admin user data.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCore {
    pub username: String,
    pub password_hash: String,
}

impl AdminCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        // Unwrap safe because the only way to create an AdminCore is via
        // From<AdminCredentials>, so the hash is always well-formed.
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap()
    }
}

/// An admin without an ID.
pub type NewAdmin = AdminCore;

/// An admin user from the database, with its unique ID.
#[derive(Serialize, Deserialize)]
pub struct Admin {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub admin: AdminCore,
}

impl Deref for Admin {
    type Target = AdminCore;

    fn deref(&self) -> &Self::Target {
        &self.admin
    }
}

impl DerefMut for Admin {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.admin
    }
}

/// Ensure at least one admin user exists, bootstrapping the default one
/// from the application config if the collection is empty.
pub async fn ensure_admin_exists(admins: &Coll<NewAdmin>, config: &Config) -> Result<(), DbError> {
    let count = admins.count_documents(None, None).await?;
    if count > 0 {
        return Ok(());
    }

    match config.default_admin() {
        Ok(admin) => {
            info!("No admins found, creating default admin '{}'", admin.username);
            admins.insert_one(admin, None).await?;
        }
        Err(_) => {
            error!("No admins found and the configured default credentials are invalid");
        }
    }

    Ok(())
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use crate::model::api::admin::AdminCredentials;

    impl AdminCore {
        pub fn example() -> Self {
            // Hash at runtime so the example always matches its credentials.
            AdminCredentials::example()
                .try_into()
                .expect("Example credentials are valid")
        }
    }
}
