#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod store;

use config::{ConfigFairing, StoreFairing};
use logging::LoggerFairing;

/// The server, configured from `Rocket.toml` and the environment.
pub fn build() -> Rocket<Build> {
    assemble(rocket::build())
}

/// Attach fairings and mount routes. The store fairing must follow the
/// config fairing, since it seeds the default admin from the config.
pub fn assemble(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .mount("/", api::routes())
}

/// A server over `store`, with fixed test configuration.
#[cfg(test)]
pub(crate) fn rocket_for_store(store: store::Store) -> Rocket<Build> {
    use model::admin::AdminCredentials;

    let admin = AdminCredentials::example();
    let figment = rocket::Config::figment()
        .merge(("jwt_secret", "test secret"))
        .merge(("auth_ttl", 3600))
        .merge(("default_admin_username", admin.username))
        .merge(("default_admin_password", admin.password))
        .merge(("store", "memory"));
    assemble(rocket::custom(figment).manage(store))
}
