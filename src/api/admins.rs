use rocket::{http::Status, serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    model::{
        admin::{delete_admin as remove_admin, insert_admin, Admin, AdminCredentials, NewAdmin},
        auth::AuthToken,
    },
    store::Store,
};

pub fn routes() -> Vec<Route> {
    routes![get_admins, create_admin, delete_admin]
}

#[get("/admins")]
async fn get_admins(_token: AuthToken<Admin>, store: Store) -> Result<Json<Vec<String>>> {
    let usernames = Admin::all(&store)
        .await?
        .into_iter()
        .map(|admin| admin.admin.username)
        .collect();
    Ok(Json(usernames))
}

#[post("/admins", data = "<new_admin>", format = "json")]
async fn create_admin(
    _token: AuthToken<Admin>,
    new_admin: Json<AdminCredentials>,
    store: Store,
) -> Result<()> {
    let username = new_admin.username.clone();
    let admin = NewAdmin::try_from(new_admin.0)?;
    match insert_admin(&store, admin).await? {
        Some(_) => Ok(()),
        None => Err(Error::Status(
            Status::BadRequest,
            format!("Admin username already in use: {username}"),
        )),
    }
}

#[delete("/admins/<username>")]
async fn delete_admin(_token: AuthToken<Admin>, username: &str, store: Store) -> Result<()> {
    remove_admin(&store, username).await
}
