use rocket::{serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        admin::Admin,
        auth::AuthToken,
        category::{create_category, delete_category, update_category, Category, CategorySpec},
        id::Id,
    },
    store::Store,
};

pub fn routes() -> Vec<Route> {
    routes![get_categories, get_category, create, modify, remove]
}

#[get("/categories")]
async fn get_categories(_token: AuthToken<Admin>, store: Store) -> Result<Json<Vec<Category>>> {
    Ok(Json(Category::all(&store).await?))
}

#[get("/categories/<category_id>")]
async fn get_category(
    _token: AuthToken<Admin>,
    category_id: Id,
    store: Store,
) -> Result<Json<Category>> {
    Ok(Json(Category::require(&store, &category_id).await?))
}

#[post("/categories", data = "<spec>", format = "json")]
async fn create(
    _token: AuthToken<Admin>,
    spec: Json<CategorySpec>,
    store: Store,
) -> Result<Json<Category>> {
    Ok(Json(create_category(&store, &spec).await?))
}

#[put("/categories/<category_id>", data = "<spec>", format = "json")]
async fn modify(
    _token: AuthToken<Admin>,
    category_id: Id,
    spec: Json<CategorySpec>,
    store: Store,
) -> Result<Json<Category>> {
    update_category(&store, &category_id, &spec).await?;
    Ok(Json(Category::require(&store, &category_id).await?))
}

/// Delete a category; its voters are left without one.
#[delete("/categories/<category_id>")]
async fn remove(_token: AuthToken<Admin>, category_id: Id, store: Store) -> Result<()> {
    delete_category(&store, &category_id).await
}
