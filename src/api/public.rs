use rocket::{serde::json::Json, Route};

use crate::error::Result;
use crate::model::{
    election::{Election, ElectionDescription, ElectionSummary},
    id::Id,
    results::Recapitulation,
};
use crate::store::Store;

pub fn routes() -> Vec<Route> {
    routes![elections, election, election_results]
}

#[get("/elections")]
async fn elections(store: Store) -> Result<Json<Vec<ElectionSummary>>> {
    let summaries = Election::all(&store)
        .await?
        .iter()
        .map(ElectionSummary::from)
        .collect();
    Ok(Json(summaries))
}

#[get("/elections/<election_id>")]
async fn election(election_id: Id, store: Store) -> Result<Json<ElectionDescription>> {
    let election = Election::require(&store, &election_id).await?;
    Ok(Json(ElectionDescription::from(&election)))
}

/// Live tallies, percentages and turnout.
#[get("/elections/<election_id>/results")]
async fn election_results(election_id: Id, store: Store) -> Result<Json<Recapitulation>> {
    Ok(Json(Recapitulation::load(&store, &election_id).await?))
}
