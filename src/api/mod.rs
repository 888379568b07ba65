use rocket::Route;

mod admins;
pub mod auth;
mod categories;
mod elections;
mod public;
mod voters;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(admins::routes());
    routes.extend(public::routes());
    routes.extend(elections::routes());
    routes.extend(voters::routes());
    routes.extend(categories::routes());
    routes.extend(voting::routes());
    routes
}
