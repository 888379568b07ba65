use log::info;
use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        admin::{Admin, AdminCredentials},
        auth::{AuthToken, AUTH_TOKEN_COOKIE},
        voter::{Voter, VoterCredentials},
    },
    store::Store,
};

pub fn routes() -> Vec<Route> {
    routes![admin_login, voter_login, logout]
}

#[post("/auth/admin", data = "<credentials>", format = "json")]
pub async fn admin_login(
    cookies: &CookieJar<'_>,
    credentials: Json<AdminCredentials>,
    store: Store,
    config: &State<Config>,
) -> Result<()> {
    // Usernames are stored trimmed.
    let admin = Admin::find_by_username(&store, credentials.username.trim())
        .await?
        .filter(|admin| admin.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No admin found with the provided username and password combination.".to_string(),
            )
        })?;

    cookies.add(AuthToken::new(&admin).into_cookie(config)?);
    info!("Admin {:?} logged in", admin.username);
    Ok(())
}

#[post("/auth/voter", data = "<credentials>", format = "json")]
pub async fn voter_login(
    cookies: &CookieJar<'_>,
    credentials: Json<VoterCredentials>,
    store: Store,
    config: &State<Config>,
) -> Result<()> {
    let voter = Voter::load(&store, &credentials.id)
        .await?
        .filter(|voter| voter.verify_password(&credentials.password))
        .ok_or_else(|| {
            Error::Status(
                Status::Unauthorized,
                "No voter found with the provided ID and password combination.".to_string(),
            )
        })?;

    cookies.add(AuthToken::new(&voter).into_cookie(config)?);
    info!("Voter {} logged in", voter.id);
    Ok(())
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}
