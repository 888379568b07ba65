use std::collections::HashSet;

use rocket::{serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        admin::Admin,
        auth::AuthToken,
        cascade::{delete_voters, CascadeReport},
        id::Id,
        voter::{create_voter, update_voter, Voter, VoterDescription, VoterSpec, VoterUpdate},
    },
    store::Store,
};

pub fn routes() -> Vec<Route> {
    routes![
        get_voters,
        get_voter,
        create,
        modify,
        delete_one,
        delete_many,
    ]
}

#[get("/voters")]
async fn get_voters(_token: AuthToken<Admin>, store: Store) -> Result<Json<Vec<VoterDescription>>> {
    let voters = Voter::all(&store)
        .await?
        .into_iter()
        .map(VoterDescription::from)
        .collect();
    Ok(Json(voters))
}

#[get("/voters/<voter_id>")]
async fn get_voter(
    _token: AuthToken<Admin>,
    voter_id: Id,
    store: Store,
) -> Result<Json<VoterDescription>> {
    let voter = Voter::require(&store, &voter_id).await?;
    Ok(Json(voter.into()))
}

#[post("/voters", data = "<spec>", format = "json")]
async fn create(
    _token: AuthToken<Admin>,
    spec: Json<VoterSpec>,
    store: Store,
) -> Result<Json<VoterDescription>> {
    let voter = create_voter(&store, spec.0).await?;
    Ok(Json(voter.into()))
}

#[put("/voters/<voter_id>", data = "<update>", format = "json")]
async fn modify(
    _token: AuthToken<Admin>,
    voter_id: Id,
    update: Json<VoterUpdate>,
    store: Store,
) -> Result<Json<VoterDescription>> {
    update_voter(&store, &voter_id, update.0).await?;
    let voter = Voter::require(&store, &voter_id).await?;
    Ok(Json(voter.into()))
}

/// Delete one voter, with their votes and candidacies.
#[delete("/voters/<voter_id>")]
async fn delete_one(
    _token: AuthToken<Admin>,
    voter_id: Id,
    store: Store,
) -> Result<Json<CascadeReport>> {
    Voter::require(&store, &voter_id).await?;
    let report = delete_voters(&store, &HashSet::from([voter_id])).await?;
    Ok(Json(report))
}

/// Delete several voters at once. Unknown IDs are skipped.
#[delete("/voters", data = "<voter_ids>", format = "json")]
async fn delete_many(
    _token: AuthToken<Admin>,
    voter_ids: Json<Vec<Id>>,
    store: Store,
) -> Result<Json<CascadeReport>> {
    let voter_ids: HashSet<Id> = voter_ids.0.into_iter().collect();
    let report = delete_voters(&store, &voter_ids).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::{json, serde_json},
    };

    use crate::model::{
        election::{Candidate, Election, ElectionCore, ElectionStatus},
        vote::record_vote,
    };

    use super::*;

    async fn register(client: &Client, id: &str, name: &str) -> Status {
        client
            .post(uri!(create))
            .header(ContentType::JSON)
            .body(json!({ "id": id, "name": name, "password": "ballot-box-42" }).to_string())
            .dispatch()
            .await
            .status()
    }

    #[backend_test(admin)]
    async fn register_list_edit(client: Client) {
        assert_eq!(Status::Ok, register(&client, "s1", "Ada").await);
        assert_eq!(Status::Ok, register(&client, "s2", "Grace").await);
        assert_eq!(Status::Conflict, register(&client, "s1", "Ada again").await);
        assert_eq!(Status::BadRequest, register(&client, "s3", "").await);

        let response = client.get(uri!(get_voters)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let voters: Vec<VoterDescription> =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        let names: Vec<_> = voters.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["Ada", "Grace"]);

        let s1: Id = "s1".parse().unwrap();
        let response = client
            .put(uri!(modify(&s1)))
            .header(ContentType::JSON)
            .body(json!({ "name": "Ada Lovelace" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let response = client.get(uri!(get_voter(&s1))).dispatch().await;
        let voter: VoterDescription =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(voter.name, "Ada Lovelace");

        let response = client.get("/voters/nobody").dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn deletion_cascades(client: Client, store: Store) {
        for (id, name) in [("s1", "Ada"), ("s2", "Grace"), ("s3", "Edsger")] {
            assert_eq!(Status::Ok, register(&client, id, name).await);
        }
        let id = |s: &str| s.parse::<Id>().unwrap();

        let mut election = ElectionCore::new("Chair".into());
        election.status = ElectionStatus::Ongoing;
        election.candidates.insert(
            id("s3"),
            Candidate {
                name: "Edsger".into(),
                running_mate: None,
                order: 1,
            },
        );
        store.put(&Election::path(&id("e1")), &election).await.unwrap();
        record_vote(&store, &id("e1"), &id("s3"), &id("s1"))
            .await
            .unwrap();
        record_vote(&store, &id("e1"), &id("s3"), &id("s2"))
            .await
            .unwrap();

        let response = client.delete(uri!(delete_one(id("s1")))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let report: CascadeReport =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(report.votes_removed, 1);
        assert_eq!(report.voters_removed, 1);
        let stored = Election::require(&store, &id("e1")).await.unwrap();
        assert_eq!(stored.tally(&id("s3")), 1);

        let response = client.delete(uri!(delete_one(id("s1")))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        let response = client
            .delete(uri!(delete_many))
            .header(ContentType::JSON)
            .body(json!(["s2", "s3", "ghost"]).to_string())
            .dispatch()
            .await;
        let report: CascadeReport =
            serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(
            report,
            CascadeReport {
                votes_removed: 1,
                candidates_removed: 1,
                voters_removed: 2,
            }
        );
        assert!(Voter::all(&store).await.unwrap().is_empty());
    }

    #[backend_test]
    async fn requires_admin(client: Client) {
        let response = client.get(uri!(get_voters)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }
}
