//! Running the same store-level tests over every backend.
//!
//! MongoDB tests need a replica set (4.4 or newer) at `db_uri`, set in
//! `Rocket.toml` or as `ROCKET_DB_URI`. They are ignored by default; run them
//! with `cargo test -- --include-ignored`. Each test gets its own database,
//! which is dropped afterwards whether or not the test passes.

use std::{future::Future, panic::AssertUnwindSafe};

use mongodb::{bson::oid::ObjectId, Client};
use rocket::{futures::FutureExt, tokio::runtime::Runtime};

use super::{MongoTree, Store};

fn runtime() -> Runtime {
    rocket::tokio::runtime::Builder::new_multi_thread()
        .thread_name("store-test-thread")
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// Run `test` over a fresh in-memory store.
pub fn with_memory_store<F, Fut>(test: F)
where
    F: FnOnce(Store) -> Fut,
    Fut: Future<Output = ()>,
{
    runtime().block_on(test(Store::memory()));
}

/// Run `test` over a fresh database on the configured MongoDB server.
pub fn with_mongo_store<F, Fut>(test: F)
where
    F: FnOnce(Store) -> Fut,
    Fut: Future<Output = ()>,
{
    runtime().block_on(async {
        let db_uri = rocket::Config::figment()
            .extract_inner::<String>("db_uri")
            .expect("`db_uri` not set");
        let client = Client::with_uri_str(&db_uri)
            .await
            .unwrap_or_else(|e| panic!("Could not connect to database at {db_uri:?}: {e}"));
        let db_name = format!("evote_test_{}", ObjectId::new().to_hex());
        let store = Store::new(MongoTree::new(client.clone(), &db_name));

        let result = AssertUnwindSafe(test(store)).catch_unwind().await;

        client.database(&db_name).drop(None).await.unwrap();
        if let Err(cause) = result {
            std::panic::resume_unwind(cause);
        }
    });
}

/// Generate a test per backend for each named `async fn(Store)` in scope:
/// `memory::<name>` always runs, `mongo::<name>` is ignored by default.
macro_rules! store_tests {
    ($($name:ident),* $(,)?) => {
        mod memory {
            $(
                #[test]
                fn $name() {
                    $crate::store::testing::with_memory_store(super::$name);
                }
            )*
        }

        mod mongo {
            $(
                #[test]
                #[ignore = "needs a MongoDB replica set at `db_uri`"]
                fn $name() {
                    $crate::store::testing::with_mongo_store(super::$name);
                }
            )*
        }
    };
}

pub(crate) use store_tests;
