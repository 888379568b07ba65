use chrono::Duration;
use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::admin::{ensure_admin_exists, AdminCredentials};
use crate::store::{MongoTree, Store};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: u32,
    #[serde(default = "default_admin_username")]
    default_admin_username: String,
    // secrets
    jwt_secret: String,
    default_admin_password: String,
}

fn default_admin_username() -> String {
    "admin".to_string()
}

impl Config {
    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Credentials for the admin created when there are none.
    pub fn default_admin(&self) -> AdminCredentials {
        AdminCredentials {
            username: self.default_admin_username.clone(),
            password: self.default_admin_password.clone(),
        }
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which backend holds the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mongodb,
    Memory,
}

/// Configuration for the store.
#[derive(Deserialize)]
struct StoreConfig {
    store: Backend,
    // secrets
    #[serde(default)]
    db_uri: Option<String>,
    #[serde(default = "default_db_name")]
    db_name: String,
}

fn default_db_name() -> String {
    "evote".to_string()
}

/// A fairing that sets up the store and places a [`Store`] into managed
/// state, then makes sure an admin exists. If a store is already managed
/// (e.g. in tests), that one is used as-is.
///
/// Must be attached after [`ConfigFairing`].
pub struct StoreFairing;

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let managed = rocket.state::<Store>().cloned();
        let store = match managed {
            Some(store) => store,
            None => {
                let store = match connect(&rocket).await {
                    Some(store) => store,
                    None => return Err(rocket),
                };
                rocket = rocket.manage(store.clone());
                store
            }
        };
        info!("Using {} store", store.backend());

        // Ensure there is at least one admin user.
        let credentials = match rocket.state::<Config>() {
            Some(config) => config.default_admin(),
            None => {
                error!("Store fairing ran before the config was loaded");
                return Err(rocket);
            }
        };
        if let Err(e) = ensure_admin_exists(&store, credentials).await {
            error!("Failed to set up default admin: {e}");
            return Err(rocket);
        }

        Ok(rocket)
    }
}

/// Load the store config and open the configured backend.
async fn connect(rocket: &Rocket<Build>) -> Option<Store> {
    let config = match rocket.figment().extract::<StoreConfig>() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load store config");
            rocket::config::pretty_print_error(e);
            return None;
        }
    };

    match config.store {
        Backend::Memory => {
            warn!("Using the in-memory store; all data is lost on shutdown");
            Some(Store::memory())
        }
        Backend::Mongodb => {
            let Some(uri) = config.db_uri else {
                error!("`db_uri` must be set when `store = \"mongodb\"`");
                return None;
            };
            info!("Loaded database config, connecting...");
            match MongoTree::connect(&uri, &config.db_name).await {
                Ok(tree) => {
                    info!("...database connection online!");
                    Some(Store::new(tree))
                }
                Err(e) => {
                    error!("Failed to connect to database: {e}");
                    None
                }
            }
        }
    }
}
