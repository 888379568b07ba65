use rocket::{serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        admin::Admin,
        auth::AuthToken,
        candidate::{
            add_candidate, remove_candidate, update_candidate, CandidateSpec, CandidateUpdate,
        },
        election::{
            advance_status, create_election, delete_election, rename_election, Election,
            ElectionDescription, ElectionSpec, StatusChange,
        },
        id::Id,
    },
    store::Store,
};

pub fn routes() -> Vec<Route> {
    routes![
        create,
        rename,
        change_status,
        remove,
        create_candidate,
        modify_candidate,
        delete_candidate,
    ]
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create(
    _token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    store: Store,
) -> Result<Json<ElectionDescription>> {
    let election = create_election(&store, &spec).await?;
    Ok(Json(ElectionDescription::from(&election)))
}

#[put("/elections/<election_id>", data = "<spec>", format = "json")]
async fn rename(
    _token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<ElectionSpec>,
    store: Store,
) -> Result<Json<ElectionDescription>> {
    rename_election(&store, &election_id, &spec).await?;
    described(&store, &election_id).await
}

#[post("/elections/<election_id>/status", data = "<change>", format = "json")]
async fn change_status(
    _token: AuthToken<Admin>,
    election_id: Id,
    change: Json<StatusChange>,
    store: Store,
) -> Result<Json<ElectionDescription>> {
    advance_status(&store, &election_id, change.status).await?;
    described(&store, &election_id).await
}

#[delete("/elections/<election_id>")]
async fn remove(_token: AuthToken<Admin>, election_id: Id, store: Store) -> Result<()> {
    delete_election(&store, &election_id).await
}

#[post("/elections/<election_id>/candidates", data = "<spec>", format = "json")]
async fn create_candidate(
    _token: AuthToken<Admin>,
    election_id: Id,
    spec: Json<CandidateSpec>,
    store: Store,
) -> Result<Json<ElectionDescription>> {
    add_candidate(&store, &election_id, &spec).await?;
    described(&store, &election_id).await
}

#[put(
    "/elections/<election_id>/candidates/<candidate_id>",
    data = "<update>",
    format = "json"
)]
async fn modify_candidate(
    _token: AuthToken<Admin>,
    election_id: Id,
    candidate_id: Id,
    update: Json<CandidateUpdate>,
    store: Store,
) -> Result<Json<ElectionDescription>> {
    update_candidate(&store, &election_id, &candidate_id, &update).await?;
    described(&store, &election_id).await
}

#[delete("/elections/<election_id>/candidates/<candidate_id>")]
async fn delete_candidate(
    _token: AuthToken<Admin>,
    election_id: Id,
    candidate_id: Id,
    store: Store,
) -> Result<Json<ElectionDescription>> {
    remove_candidate(&store, &election_id, &candidate_id).await?;
    described(&store, &election_id).await
}

async fn described(store: &Store, election_id: &Id) -> Result<Json<ElectionDescription>> {
    let election = Election::require(store, election_id).await?;
    Ok(Json(ElectionDescription::from(&election)))
}
