//! Recording a ballot.

use log::info;
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    category::Category,
    election::{Election, ElectionCore, ElectionStatus},
    id::Id,
    voter::{Voter, VoterCore},
};
use crate::store::{decode, Store, Updates};

/// A ballot submitted by a voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotSpec {
    pub candidate: Id,
}

/// Acknowledgement of a recorded vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub election: Id,
    pub candidate: Id,
}

/// Atomically record that `voter_id` voted for `candidate_id` in
/// `election_id`.
///
/// Within one store transaction this checks that the voter and election
/// exist, that the election is ongoing, that the candidate stands in it, and
/// that the voter has not voted there yet; then it marks the voter as having
/// voted, records the vote, and increments the candidate's tally.
pub async fn record_vote(
    store: &Store,
    election_id: &Id,
    candidate_id: &Id,
    voter_id: &Id,
) -> Result<Receipt> {
    let voter_path = Voter::path(voter_id);
    let election_path = Election::path(election_id);

    store
        .transaction(&[voter_path, election_path], &mut |values| {
            let voter: VoterCore = decode(values[0].clone())?
                .ok_or_else(|| Error::not_found(format!("Voter {voter_id}")))?;
            let election: ElectionCore = decode(values[1].clone())?
                .ok_or_else(|| Error::not_found(format!("Election {election_id}")))?;

            if election.status != ElectionStatus::Ongoing {
                return Err(Error::bad_request(format!(
                    "Election {election_id} is {}, not open for voting",
                    election.status
                )));
            }
            if !election.candidates.contains_key(candidate_id) {
                return Err(Error::not_found(format!(
                    "Candidate {candidate_id} in election {election_id}"
                )));
            }
            if voter.has_voted_in(election_id) || election.votes.contains_key(voter_id) {
                return Err(Error::AlreadyVoted(format!(
                    "Voter {voter_id} in election {election_id}"
                )));
            }

            let mut updates = Updates::new();
            updates
                .set(Voter::has_voted_path(voter_id, election_id), true)
                .set(
                    Election::vote_path(election_id, voter_id),
                    candidate_id.as_str(),
                )
                .set(
                    Election::result_path(election_id, candidate_id),
                    election.tally(candidate_id) + 1,
                );
            Ok(updates)
        })
        .await?;

    info!("Recorded vote by {voter_id} in election {election_id}");
    Ok(Receipt {
        election: election_id.clone(),
        candidate: candidate_id.clone(),
    })
}

/// Fail unless the voter's category lists the election.
pub async fn ensure_eligible(store: &Store, voter: &Voter, election_id: &Id) -> Result<()> {
    let allowed = match &voter.category {
        Some(category_id) => Category::load(store, category_id)
            .await?
            .map_or(false, |category| category.allows(election_id)),
        None => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::Status(
            Status::Forbidden,
            format!("Voter {} may not vote in election {election_id}", voter.id),
        ))
    }
}

#[cfg(test)]
mod tests {
    use rocket::tokio;

    use super::*;
    use crate::model::election::Candidate;
    use crate::store::testing::store_tests;

    store_tests!(
        vote_is_recorded,
        second_vote_rejected,
        missing_records_not_found,
        closed_election_rejected,
        concurrent_votes_are_all_counted,
        concurrent_double_votes_counted_once,
    );

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    /// An ongoing election with two candidates, and `voters` voters.
    async fn setup(store: &Store, voters: usize) {
        let mut election = ElectionCore::new("Student council".into());
        election.status = ElectionStatus::Ongoing;
        for (cid, order) in [("c1", 1), ("c2", 2)] {
            election.candidates.insert(
                id(cid),
                Candidate {
                    name: cid.to_uppercase(),
                    running_mate: None,
                    order,
                },
            );
        }
        store.put(&Election::path(&id("e1")), &election).await.unwrap();
        for n in 0..voters {
            let voter = VoterCore {
                name: format!("Voter {n}"),
                category: None,
                password_hash: String::new(),
                has_voted: Default::default(),
            };
            store
                .put(&Voter::path(&id(&format!("v{n}"))), &voter)
                .await
                .unwrap();
        }
    }

    async fn vote_is_recorded(store: Store) {
        setup(&store, 1).await;
        let receipt = record_vote(&store, &id("e1"), &id("c1"), &id("v0"))
            .await
            .unwrap();
        assert_eq!(receipt.candidate, id("c1"));

        let election = Election::require(&store, &id("e1")).await.unwrap();
        assert_eq!(election.tally(&id("c1")), 1);
        assert_eq!(election.tally(&id("c2")), 0);
        assert_eq!(election.votes.get(&id("v0")), Some(&id("c1")));

        let voter = Voter::require(&store, &id("v0")).await.unwrap();
        assert!(voter.has_voted_in(&id("e1")));
    }

    async fn second_vote_rejected(store: Store) {
        setup(&store, 1).await;
        record_vote(&store, &id("e1"), &id("c1"), &id("v0"))
            .await
            .unwrap();
        let err = record_vote(&store, &id("e1"), &id("c2"), &id("v0"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyVoted(_)));

        let election = Election::require(&store, &id("e1")).await.unwrap();
        assert_eq!(election.tally(&id("c1")), 1);
        assert_eq!(election.tally(&id("c2")), 0);
    }

    async fn missing_records_not_found(store: Store) {
        setup(&store, 1).await;
        for (e, c, v) in [("e9", "c1", "v0"), ("e1", "c9", "v0"), ("e1", "c1", "v9")] {
            let err = record_vote(&store, &id(e), &id(c), &id(v))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NotFound(_)), "{e} {c} {v}: {err}");
        }
    }

    async fn closed_election_rejected(store: Store) {
        setup(&store, 1).await;
        store
            .set(
                &Election::status_path(&id("e1")),
                rocket::serde::json::json!("completed"),
            )
            .await
            .unwrap();
        let err = record_vote(&store, &id("e1"), &id("c1"), &id("v0"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);
        let voter = Voter::require(&store, &id("v0")).await.unwrap();
        assert!(!voter.has_voted_in(&id("e1")));
    }

    /// Every ballot writes the same election record, so on MongoDB most of
    /// these conflict and have to be retried.
    async fn concurrent_votes_are_all_counted(store: Store) {
        const VOTERS: usize = 64;
        setup(&store, VOTERS).await;
        let handles: Vec<_> = (0..VOTERS)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    let candidate = if n % 3 == 0 { "c2" } else { "c1" };
                    record_vote(&store, &id("e1"), &id(candidate), &id(&format!("v{n}"))).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let election = Election::require(&store, &id("e1")).await.unwrap();
        let c2 = (0..VOTERS).filter(|n| n % 3 == 0).count() as u64;
        assert_eq!(election.tally(&id("c2")), c2);
        assert_eq!(election.tally(&id("c1")), VOTERS as u64 - c2);
        assert_eq!(election.votes.len(), VOTERS);
    }

    async fn concurrent_double_votes_counted_once(store: Store) {
        setup(&store, 1).await;
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    record_vote(&store, &id("e1"), &id("c1"), &id("v0")).await
                })
            })
            .collect();
        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(Error::AlreadyVoted(_)) => {}
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(successes, 1);
        let election = Election::require(&store, &id("e1")).await.unwrap();
        assert_eq!(election.tally(&id("c1")), 1);
    }
}
