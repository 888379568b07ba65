use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    category::Category,
    election::{Election, ElectionStatus},
    id::Id,
    voter::Voter,
};
use crate::store::Store;

/// Tally for one candidate on the results dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    pub id: Id,
    pub name: String,
    pub running_mate: Option<Id>,
    pub votes: u64,
    /// Share of all counted votes, 0 to 100.
    pub percentage: f64,
}

/// Live results of an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recapitulation {
    pub id: Id,
    pub name: String,
    pub status: ElectionStatus,
    pub total_votes: u64,
    /// Voters whose category lists this election.
    pub eligible_voters: u64,
    /// Eligible voters who have voted, 0 to 100.
    pub turnout: f64,
    /// In ballot order.
    pub candidates: Vec<CandidateResult>,
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

impl Recapitulation {
    /// Summarise an election against the current voter roll.
    pub fn new(election: &Election, voters: &[Voter], categories: &[Category]) -> Self {
        let candidates: Vec<_> = election.ordered_candidates();
        let total_votes = candidates
            .iter()
            .map(|(id, _)| election.tally(id))
            .sum();

        let eligible_categories: Vec<&Id> = categories
            .iter()
            .filter(|category| category.allows(&election.id))
            .map(|category| &category.id)
            .collect();
        let eligible: Vec<&Voter> = voters
            .iter()
            .filter(|voter| {
                voter
                    .category
                    .as_ref()
                    .map_or(false, |c| eligible_categories.contains(&c))
            })
            .collect();
        let voted = eligible
            .iter()
            .filter(|voter| voter.has_voted_in(&election.id))
            .count() as u64;
        let eligible_voters = eligible.len() as u64;

        Self {
            id: election.id.clone(),
            name: election.name.clone(),
            status: election.status,
            total_votes,
            eligible_voters,
            turnout: percent(voted, eligible_voters),
            candidates: candidates
                .into_iter()
                .map(|(id, candidate)| {
                    let votes = election.tally(id);
                    CandidateResult {
                        id: id.clone(),
                        name: candidate.name.clone(),
                        running_mate: candidate.running_mate.clone(),
                        votes,
                        percentage: percent(votes, total_votes),
                    }
                })
                .collect(),
        }
    }

    /// Load everything needed and summarise the election with the given ID.
    pub async fn load(store: &Store, election_id: &Id) -> Result<Self> {
        let election = Election::require(store, election_id).await?;
        let voters = Voter::all(store).await?;
        let categories = Category::all(store).await?;
        Ok(Self::new(&election, &voters, &categories))
    }
}
