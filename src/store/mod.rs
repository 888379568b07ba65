//! The hierarchical key-value store all application state lives in.
//!
//! State is a single JSON tree addressed by [`DbPath`]s. Backends implement
//! [`Tree`]; the rest of the crate talks to a [`Store`] handle.

use std::ops::Deref;
use std::sync::Arc;

use log::error;
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
    serde::json::{serde_json, Value},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};
use crate::model::id::Id;

mod memory;
mod mongo;
mod path;

pub use memory::MemoryTree;
pub use mongo::MongoTree;
pub use path::{DbPath, Updates};

#[cfg(test)]
pub(crate) mod testing;

/// Callback run inside a transaction. It receives the current values of the
/// requested paths and returns the writes to commit, or an error to abort.
/// It may be invoked more than once if the backend retries.
pub type TxFn<'a> = dyn FnMut(&[Option<Value>]) -> Result<Updates> + Send + 'a;

/// A path-addressed JSON tree.
#[rocket::async_trait]
pub trait Tree: Send + Sync {
    /// Short name of the backend, for logging.
    fn backend(&self) -> &'static str;

    /// Read the value at `path`, if any.
    async fn get(&self, path: &DbPath) -> Result<Option<Value>>;

    /// Apply all `updates` as one atomic unit.
    async fn update(&self, updates: Updates) -> Result<()>;

    /// Atomically read `reads`, compute writes from them, and commit.
    async fn transaction(&self, reads: &[DbPath], apply: &mut TxFn<'_>) -> Result<()>;

    async fn set(&self, path: &DbPath, value: Value) -> Result<()> {
        let mut updates = Updates::new();
        updates.set(path.clone(), value);
        self.update(updates).await
    }

    async fn remove(&self, path: &DbPath) -> Result<()> {
        let mut updates = Updates::new();
        updates.remove(path.clone());
        self.update(updates).await
    }
}

/// A shared handle on the store, held in Rocket managed state.
#[derive(Clone)]
pub struct Store(Arc<dyn Tree>);

impl Store {
    pub fn new<T: Tree + 'static>(tree: T) -> Self {
        Self(Arc::new(tree))
    }

    /// A fresh, empty in-memory store.
    pub fn memory() -> Self {
        Self::new(MemoryTree::default())
    }

    /// Read and deserialize the value at `path`.
    pub async fn fetch<T: DeserializeOwned>(&self, path: &DbPath) -> Result<Option<T>> {
        decode(self.get(path).await?)
    }

    /// Read and deserialize every child of `path`, ordered by key.
    pub async fn fetch_children<T: DeserializeOwned>(&self, path: &DbPath) -> Result<Vec<(Id, T)>> {
        decode_children(self.get(path).await?)
    }

    /// Serialize `value` and write it at `path`.
    pub async fn put<T: Serialize + ?Sized>(&self, path: &DbPath, value: &T) -> Result<()> {
        self.set(path, serde_json::to_value(value)?).await
    }
}

impl Deref for Store {
    type Target = dyn Tree;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Store {
    type Error = ();

    /// Get the store handle from managed state.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.rocket().state::<Store>() {
            Some(store) => request::Outcome::Success(store.clone()),
            None => {
                error!("No store is managed by this Rocket instance");
                request::Outcome::Failure((Status::InternalServerError, ()))
            }
        }
    }
}

/// Deserialize an optional raw value.
pub fn decode<T: DeserializeOwned>(value: Option<Value>) -> Result<Option<T>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .map_err(Error::from)
}

/// Deserialize the children of an optional raw object, ordered by key.
pub fn decode_children<T: DeserializeOwned>(value: Option<Value>) -> Result<Vec<(Id, T)>> {
    let map = match value {
        None => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(Error::Store(format!(
                "Expected an object of records, found {other}"
            )))
        }
    };
    let mut children = map
        .into_iter()
        .map(|(key, value)| -> Result<(Id, T)> {
            Ok((key.parse()?, serde_json::from_value(value)?))
        })
        .collect::<Result<Vec<_>>>()?;
    children.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(children)
}
