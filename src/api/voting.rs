use rocket::{serde::json::Json, Route};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    model::{
        auth::AuthToken,
        category::Category,
        election::{Election, ElectionSummary},
        id::Id,
        vote::{ensure_eligible, record_vote, BallotSpec, Receipt},
        voter::{Voter, VoterDescription},
    },
    store::Store,
};

pub fn routes() -> Vec<Route> {
    routes![me, my_elections, vote]
}

/// An election as seen by a voter who may take part in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterElection {
    #[serde(flatten)]
    pub election: ElectionSummary,
    pub has_voted: bool,
}

#[get("/voter/me")]
async fn me(token: AuthToken<Voter>, store: Store) -> Result<Json<VoterDescription>> {
    let voter = Voter::require(&store, &token.id).await?;
    Ok(Json(voter.into()))
}

/// Elections the voter's category lists, whatever their status.
#[get("/voter/elections")]
async fn my_elections(
    token: AuthToken<Voter>,
    store: Store,
) -> Result<Json<Vec<VoterElection>>> {
    let voter = Voter::require(&store, &token.id).await?;
    let listed = match &voter.category {
        Some(category_id) => Category::load(&store, category_id)
            .await?
            .map(|category| category.category.elections)
            .unwrap_or_default(),
        None => Vec::new(),
    };

    let elections = Election::all(&store)
        .await?
        .iter()
        .filter(|election| listed.contains(&election.id))
        .map(|election| VoterElection {
            election: election.into(),
            has_voted: voter.has_voted_in(&election.id),
        })
        .collect();
    Ok(Json(elections))
}

#[post("/voter/elections/<election_id>/vote", data = "<ballot>", format = "json")]
async fn vote(
    token: AuthToken<Voter>,
    election_id: Id,
    ballot: Json<BallotSpec>,
    store: Store,
) -> Result<Json<Receipt>> {
    let voter = Voter::require(&store, &token.id).await?;
    Election::require(&store, &election_id).await?;
    ensure_eligible(&store, &voter, &election_id).await?;
    let receipt = record_vote(&store, &election_id, &ballot.candidate, &voter.id).await?;
    Ok(Json(receipt))
}
