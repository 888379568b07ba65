//! Deleting voters together with everything that refers to them.

use std::collections::{BTreeMap, HashSet};
use std::ops::AddAssign;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    election::{Election, ElectionCore},
    id::Id,
    voter::Voter,
};
use crate::store::{decode_children, Store, Updates};

/// What a cascade deletion removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub votes_removed: usize,
    pub candidates_removed: usize,
    pub voters_removed: usize,
}

impl AddAssign for CascadeReport {
    fn add_assign(&mut self, other: Self) {
        self.votes_removed += other.votes_removed;
        self.candidates_removed += other.candidates_removed;
        self.voters_removed += other.voters_removed;
    }
}

/// Remove the given voters, their votes and any candidacies they hold.
///
/// For each election, a deleted voter's vote is removed and the tally of the
/// candidate it went to is decremented, never below zero. A candidate created
/// from a deleted voter, or whose running mate is a deleted voter, is removed
/// along with its tally. Everything happens in one store transaction.
pub async fn delete_voters(store: &Store, voter_ids: &HashSet<Id>) -> Result<CascadeReport> {
    if voter_ids.is_empty() {
        return Ok(CascadeReport::default());
    }

    let mut voter_ids: Vec<&Id> = voter_ids.iter().collect();
    voter_ids.sort();
    let mut reads = vec![Election::collection_path()];
    reads.extend(voter_ids.iter().map(|id| Voter::path(id)));

    let mut report = CascadeReport::default();
    store
        .transaction(&reads, &mut |values| {
            let elections: Vec<(Id, ElectionCore)> = decode_children(values[0].clone())?;
            let mut updates = Updates::new();
            report = CascadeReport::default();

            for (election_id, election) in &elections {
                report += plan_election(election_id, election, &voter_ids, &mut updates);
            }
            for (voter_id, value) in voter_ids.iter().zip(&values[1..]) {
                if value.is_some() {
                    updates.remove(Voter::path(voter_id));
                    report.voters_removed += 1;
                }
            }
            Ok(updates)
        })
        .await?;

    info!(
        "Deleted {} voters, {} votes and {} candidates",
        report.voters_removed, report.votes_removed, report.candidates_removed
    );
    Ok(report)
}

/// Queue the writes that detach `voter_ids` from one election.
fn plan_election(
    election_id: &Id,
    election: &ElectionCore,
    voter_ids: &[&Id],
    updates: &mut Updates,
) -> CascadeReport {
    let mut report = CascadeReport::default();

    let removed_candidates: HashSet<&Id> = election
        .candidates
        .iter()
        .filter(|(id, candidate)| {
            voter_ids.contains(id)
                || candidate
                    .running_mate
                    .as_ref()
                    .map_or(false, |mate| voter_ids.contains(&mate))
        })
        .map(|(id, _)| id)
        .collect();

    let mut decrements: BTreeMap<&Id, u64> = BTreeMap::new();
    for voter_id in voter_ids {
        if let Some(candidate_id) = election.votes.get(*voter_id) {
            updates.remove(Election::vote_path(election_id, voter_id));
            report.votes_removed += 1;
            *decrements.entry(candidate_id).or_default() += 1;
        }
    }

    for candidate_id in &removed_candidates {
        updates
            .remove(Election::candidate_path(election_id, candidate_id))
            .remove(Election::result_path(election_id, candidate_id));
        report.candidates_removed += 1;
    }
    for (candidate_id, count) in decrements {
        if removed_candidates.contains(&candidate_id) {
            continue;
        }
        let tally = election.tally(candidate_id).saturating_sub(count);
        updates.set(Election::result_path(election_id, candidate_id), tally);
    }

    report
}

#[cfg(test)]
mod tests {
    use crate::model::election::{Candidate, ElectionStatus};
    use crate::model::vote::record_vote;
    use crate::model::voter::VoterCore;
    use crate::store::testing::store_tests;

    use super::*;

    store_tests!(
        deleting_a_voter_removes_their_vote,
        deleting_a_non_voter_leaves_tallies_alone,
        deleting_a_candidate_drops_their_tally,
        running_mate_removal_drops_the_ticket,
        tallies_floor_at_zero,
        several_voters_at_once,
        empty_set_is_a_no_op,
    );

    fn id(s: &str) -> Id {
        s.parse().unwrap()
    }

    fn ids(list: &[&str]) -> HashSet<Id> {
        list.iter().map(|s| id(s)).collect()
    }

    /// Voters v1..v4; election e1 is ongoing with candidates v1 (running mate
    /// v2) and v3. Election e2 is ongoing with candidate v3 only.
    async fn setup(store: &Store) {
        for n in 1..=4 {
            store
                .put(
                    &Voter::path(&id(&format!("v{n}"))),
                    &VoterCore {
                        name: format!("Voter {n}"),
                        category: None,
                        password_hash: String::new(),
                        has_voted: Default::default(),
                    },
                )
                .await
                .unwrap();
        }

        let candidate = |name: &str, running_mate: Option<&str>, order| Candidate {
            name: name.into(),
            running_mate: running_mate.map(id),
            order,
        };
        let mut e1 = ElectionCore::new("President".into());
        e1.status = ElectionStatus::Ongoing;
        e1.candidates
            .insert(id("v1"), candidate("Voter 1", Some("v2"), 1));
        e1.candidates.insert(id("v3"), candidate("Voter 3", None, 2));
        store.put(&Election::path(&id("e1")), &e1).await.unwrap();

        let mut e2 = ElectionCore::new("Treasurer".into());
        e2.status = ElectionStatus::Ongoing;
        e2.candidates.insert(id("v3"), candidate("Voter 3", None, 1));
        store.put(&Election::path(&id("e2")), &e2).await.unwrap();
    }

    async fn vote(store: &Store, election: &str, candidate: &str, voter: &str) {
        record_vote(store, &id(election), &id(candidate), &id(voter))
            .await
            .unwrap();
    }

    async fn deleting_a_voter_removes_their_vote(store: Store) {
        setup(&store).await;
        vote(&store, "e1", "v3", "v4").await;
        vote(&store, "e1", "v3", "v1").await;
        vote(&store, "e2", "v3", "v4").await;

        let report = delete_voters(&store, &ids(&["v4"])).await.unwrap();
        assert_eq!(
            report,
            CascadeReport {
                votes_removed: 2,
                candidates_removed: 0,
                voters_removed: 1,
            }
        );

        let e1 = Election::require(&store, &id("e1")).await.unwrap();
        assert_eq!(e1.tally(&id("v3")), 1);
        assert!(!e1.votes.contains_key(&id("v4")));
        let e2 = Election::require(&store, &id("e2")).await.unwrap();
        assert_eq!(e2.tally(&id("v3")), 0);
        assert!(Voter::load(&store, &id("v4")).await.unwrap().is_none());
    }

    async fn deleting_a_non_voter_leaves_tallies_alone(store: Store) {
        setup(&store).await;
        vote(&store, "e1", "v3", "v1").await;
        let before = Election::all(&store).await.unwrap();

        let report = delete_voters(&store, &ids(&["v4"])).await.unwrap();
        assert_eq!(report.votes_removed, 0);
        assert_eq!(report.voters_removed, 1);
        assert_eq!(Election::all(&store).await.unwrap(), before);
    }

    async fn deleting_a_candidate_drops_their_tally(store: Store) {
        setup(&store).await;
        vote(&store, "e1", "v3", "v4").await;

        let report = delete_voters(&store, &ids(&["v3"])).await.unwrap();
        // v3 never voted, but stood in both elections.
        assert_eq!(report.votes_removed, 0);
        assert_eq!(report.candidates_removed, 2);

        let after = Election::require(&store, &id("e1")).await.unwrap();
        assert!(after.candidates.contains_key(&id("v1")));
        assert!(!after.candidates.contains_key(&id("v3")));
        assert!(!after.results.contains_key(&id("v3")));
        // The vote for the removed candidate stays on record.
        assert_eq!(after.votes.get(&id("v4")), Some(&id("v3")));
    }

    async fn running_mate_removal_drops_the_ticket(store: Store) {
        setup(&store).await;
        vote(&store, "e1", "v1", "v3").await;

        let report = delete_voters(&store, &ids(&["v2"])).await.unwrap();
        assert_eq!(report.candidates_removed, 1);
        let e1 = Election::require(&store, &id("e1")).await.unwrap();
        assert!(!e1.candidates.contains_key(&id("v1")));
        assert!(e1.candidates.contains_key(&id("v3")));
        assert!(Voter::load(&store, &id("v1")).await.unwrap().is_some());
    }

    async fn tallies_floor_at_zero(store: Store) {
        setup(&store).await;
        vote(&store, "e1", "v3", "v4").await;
        // Corrupt the tally so the decrement would underflow.
        store
            .set(&Election::result_path(&id("e1"), &id("v3")), 0.into())
            .await
            .unwrap();

        delete_voters(&store, &ids(&["v4"])).await.unwrap();
        let e1 = Election::require(&store, &id("e1")).await.unwrap();
        assert_eq!(e1.tally(&id("v3")), 0);
    }

    async fn several_voters_at_once(store: Store) {
        setup(&store).await;
        vote(&store, "e1", "v3", "v1").await;
        vote(&store, "e1", "v3", "v2").await;
        vote(&store, "e1", "v1", "v4").await;

        let report = delete_voters(&store, &ids(&["v1", "v2", "nobody"]))
            .await
            .unwrap();
        assert_eq!(
            report,
            CascadeReport {
                votes_removed: 2,
                candidates_removed: 1,
                voters_removed: 2,
            }
        );
        let e1 = Election::require(&store, &id("e1")).await.unwrap();
        assert_eq!(e1.tally(&id("v3")), 0);
        assert_eq!(e1.votes.len(), 1);
        assert_eq!(Voter::all(&store).await.unwrap().len(), 2);
    }

    async fn empty_set_is_a_no_op(store: Store) {
        setup(&store).await;
        let report = delete_voters(&store, &HashSet::new()).await.unwrap();
        assert_eq!(report, CascadeReport::default());
        assert_eq!(Voter::all(&store).await.unwrap().len(), 4);
    }
}
