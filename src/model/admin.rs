use std::ops::Deref;

use log::{info, warn};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{hash_password, id::Id, verify_password};
use crate::store::{decode_children, DbPath, Store, Updates};

pub const ADMINS: &str = "admins";

/// Core admin user data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCore {
    pub username: String,
    pub password_hash: String,
}

impl AdminCore {
    /// Check whether the given password is correct.
    pub fn verify_password(&self, password: &str) -> bool {
        verify_password(&self.password_hash, password)
    }
}

/// An admin without an ID.
pub type NewAdmin = AdminCore;

/// An admin user with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admin {
    pub id: Id,
    pub admin: AdminCore,
}

impl Deref for Admin {
    type Target = AdminCore;

    fn deref(&self) -> &Self::Target {
        &self.admin
    }
}

impl Admin {
    pub fn collection_path() -> DbPath {
        DbPath::from(ADMINS)
    }

    pub fn path(id: &Id) -> DbPath {
        Self::collection_path().child(id)
    }

    pub async fn all(store: &Store) -> Result<Vec<Self>> {
        Ok(store
            .fetch_children(&Self::collection_path())
            .await?
            .into_iter()
            .map(|(id, admin)| Self { id, admin })
            .collect())
    }

    pub async fn find_by_username(store: &Store, username: &str) -> Result<Option<Self>> {
        Ok(Self::all(store)
            .await?
            .into_iter()
            .find(|admin| admin.username == username))
    }
}

/// Raw admin credentials, received from a user. These are never stored
/// directly, since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<AdminCredentials> for NewAdmin {
    type Error = Error;

    /// Hash the password. The username must be non-empty and the password
    /// must meet the minimum length.
    fn try_from(cred: AdminCredentials) -> Result<Self> {
        let username = cred.username.trim();
        if username.is_empty() {
            return Err(Error::bad_request("Admin username must not be empty"));
        }
        Ok(Self {
            username: username.to_string(),
            password_hash: hash_password(&cred.password)?,
        })
    }
}

/// Insert `admin` under a fresh ID unless its username is already taken.
/// Returns `None` if the username was taken.
pub async fn insert_admin(store: &Store, admin: NewAdmin) -> Result<Option<Id>> {
    let id = Id::new();
    let record = rocket::serde::json::serde_json::to_value(&admin)?;
    let mut inserted = false;
    store
        .transaction(&[Admin::collection_path()], &mut |values| {
            let existing: Vec<(Id, AdminCore)> = decode_children(values[0].clone())?;
            let mut updates = Updates::new();
            inserted = !existing.iter().any(|(_, a)| a.username == admin.username);
            if inserted {
                updates.set(Admin::path(&id), record.clone());
            }
            Ok(updates)
        })
        .await?;
    Ok(inserted.then_some(id))
}

/// Delete the admin called `username`, refusing to delete the last one.
pub async fn delete_admin(store: &Store, username: &str) -> Result<()> {
    store
        .transaction(&[Admin::collection_path()], &mut |values| {
            let admins: Vec<(Id, AdminCore)> = decode_children(values[0].clone())?;
            let (id, _) = admins
                .iter()
                .find(|(_, admin)| admin.username == username)
                .ok_or_else(|| Error::not_found(format!("Admin {username}")))?;
            if admins.len() == 1 {
                return Err(Error::Status(
                    Status::UnprocessableEntity,
                    "Cannot delete the last admin".to_string(),
                ));
            }
            let mut updates = Updates::new();
            updates.remove(Admin::path(id));
            Ok(updates)
        })
        .await?;
    info!("Deleted admin {username:?}");
    Ok(())
}

/// Make sure at least one admin can log in. If there are none, create one
/// from the configured default credentials.
pub async fn ensure_admin_exists(store: &Store, credentials: AdminCredentials) -> Result<()> {
    if !Admin::all(store).await?.is_empty() {
        return Ok(());
    }
    let username = credentials.username.clone();
    let admin = NewAdmin::try_from(credentials)?;
    if insert_admin(store, admin).await?.is_some() {
        warn!("No admins found; created default admin {username:?}. Change its password!");
    } else {
        info!("Default admin {username:?} was created concurrently");
    }
    Ok(())
}
