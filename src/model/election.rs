use std::collections::HashMap;
use std::fmt::Display;
use std::ops::Deref;

use log::info;
use rocket::serde::json::Value;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    category::{Category, CategoryCore},
    id::Id,
    require_name,
    voter::{Voter, VoterCore},
};
use crate::store::{decode, decode_children, DbPath, Store, Updates};

pub const ELECTIONS: &str = "elections";

/// States in the election lifecycle. Elections only ever move forward.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    /// Being set up; candidates may still change.
    Pending,
    /// Open for voting.
    Ongoing,
    /// Closed; results are final.
    Completed,
}

impl ElectionStatus {
    /// The state that follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Ongoing),
            Self::Ongoing => Some(Self::Completed),
            Self::Completed => None,
        }
    }
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
        })
    }
}

/// A candidate standing in an election. Keyed by the ID of the voter they
/// were created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_mate: Option<Id>,
    pub order: u32,
}

/// Core election data, as stored under `elections/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    pub name: String,
    pub status: ElectionStatus,
    #[serde(default)]
    pub candidates: HashMap<Id, Candidate>,
    /// Voter ID to the candidate they voted for.
    #[serde(default)]
    pub votes: HashMap<Id, Id>,
    /// Candidate ID to tally.
    #[serde(default)]
    pub results: HashMap<Id, u64>,
}

impl ElectionCore {
    pub fn new(name: String) -> Self {
        Self {
            name,
            status: ElectionStatus::Pending,
            candidates: HashMap::new(),
            votes: HashMap::new(),
            results: HashMap::new(),
        }
    }

    pub fn tally(&self, candidate_id: &Id) -> u64 {
        self.results.get(candidate_id).copied().unwrap_or(0)
    }

    /// Candidates in ballot order, ties broken by ID.
    pub fn ordered_candidates(&self) -> Vec<(&Id, &Candidate)> {
        let mut candidates: Vec<_> = self.candidates.iter().collect();
        candidates.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(b.0)));
        candidates
    }

    /// The order number a newly added candidate gets by default.
    pub fn next_order(&self) -> u32 {
        self.candidates
            .values()
            .map(|c| c.order)
            .max()
            .map_or(1, |max| max + 1)
    }
}

/// An election together with its ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Election {
    pub id: Id,
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl Election {
    pub fn collection_path() -> DbPath {
        DbPath::from(ELECTIONS)
    }

    pub fn path(id: &Id) -> DbPath {
        Self::collection_path().child(id)
    }

    pub fn status_path(id: &Id) -> DbPath {
        Self::path(id).child("status")
    }

    pub fn candidate_path(id: &Id, candidate_id: &Id) -> DbPath {
        Self::path(id).child("candidates").child(candidate_id)
    }

    pub fn vote_path(id: &Id, voter_id: &Id) -> DbPath {
        Self::path(id).child("votes").child(voter_id)
    }

    pub fn result_path(id: &Id, candidate_id: &Id) -> DbPath {
        Self::path(id).child("results").child(candidate_id)
    }

    /// Decode an election read inside a transaction.
    pub fn decode(id: &Id, value: Option<Value>) -> Result<Self> {
        decode(value)?
            .map(|election| Self {
                id: id.clone(),
                election,
            })
            .ok_or_else(|| Error::not_found(format!("Election {id}")))
    }

    pub async fn load(store: &Store, id: &Id) -> Result<Option<Self>> {
        Ok(store.fetch(&Self::path(id)).await?.map(|election| Self {
            id: id.clone(),
            election,
        }))
    }

    pub async fn require(store: &Store, id: &Id) -> Result<Self> {
        Self::load(store, id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election {id}")))
    }

    pub async fn all(store: &Store) -> Result<Vec<Self>> {
        Ok(store
            .fetch_children(&Self::collection_path())
            .await?
            .into_iter()
            .map(|(id, election)| Self { id, election })
            .collect())
    }

    /// Fail unless the election is still being set up.
    pub fn ensure_pending(&self) -> Result<()> {
        if self.status == ElectionStatus::Pending {
            Ok(())
        } else {
            Err(Error::bad_request(format!(
                "Election {} is {}; candidates can only change while pending",
                self.id, self.status
            )))
        }
    }
}

/// Create a pending election with no candidates.
pub async fn create_election(store: &Store, spec: &ElectionSpec) -> Result<Election> {
    let name = require_name(&spec.name, "Election")?;
    let election = Election {
        id: Id::new(),
        election: ElectionCore::new(name),
    };
    store
        .put(&Election::path(&election.id), &election.election)
        .await?;
    info!("Created election {} ({:?})", election.id, election.name);
    Ok(election)
}

pub async fn rename_election(store: &Store, id: &Id, spec: &ElectionSpec) -> Result<()> {
    let name = require_name(&spec.name, "Election")?;
    store
        .transaction(&[Election::path(id)], &mut |values| {
            Election::decode(id, values[0].clone())?;
            let mut updates = Updates::new();
            updates.set(Election::path(id).child("name"), name.as_str());
            Ok(updates)
        })
        .await
}

/// Move an election to `target`, which must directly follow its current
/// status.
pub async fn advance_status(store: &Store, id: &Id, target: ElectionStatus) -> Result<()> {
    store
        .transaction(&[Election::path(id)], &mut |values| {
            let election = Election::decode(id, values[0].clone())?;
            if election.status.next() != Some(target) {
                return Err(Error::bad_request(format!(
                    "Election {id} cannot move from {} to {target}",
                    election.status
                )));
            }
            let mut updates = Updates::new();
            updates.set(Election::status_path(id), target.to_string());
            Ok(updates)
        })
        .await?;
    info!("Election {id} is now {target}");
    Ok(())
}

/// Delete an election, along with voters' flags for it and any category
/// references to it.
pub async fn delete_election(store: &Store, id: &Id) -> Result<()> {
    let reads = [
        Election::path(id),
        Voter::collection_path(),
        Category::collection_path(),
    ];
    store
        .transaction(&reads, &mut |values| {
            Election::decode(id, values[0].clone())?;
            let voters: Vec<(Id, VoterCore)> = decode_children(values[1].clone())?;
            let categories: Vec<(Id, CategoryCore)> = decode_children(values[2].clone())?;

            let mut updates = Updates::new();
            updates.remove(Election::path(id));
            for (voter_id, voter) in &voters {
                if voter.has_voted.contains_key(id) {
                    updates.remove(Voter::has_voted_path(voter_id, id));
                }
            }
            for (category_id, category) in categories {
                if category.allows(id) {
                    let remaining: Vec<Id> = category
                        .elections
                        .into_iter()
                        .filter(|e| e != id)
                        .collect();
                    updates.set(
                        Category::elections_path(&category_id),
                        rocket::serde::json::serde_json::to_value(remaining)?,
                    );
                }
            }
            Ok(updates)
        })
        .await?;
    info!("Deleted election {id}");
    Ok(())
}

/// Name for a new or renamed election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub name: String,
}

/// Requested status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ElectionStatus,
}

/// Short listing of an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSummary {
    pub id: Id,
    pub name: String,
    pub status: ElectionStatus,
    pub candidate_count: usize,
}

impl From<&Election> for ElectionSummary {
    fn from(election: &Election) -> Self {
        Self {
            id: election.id.clone(),
            name: election.name.clone(),
            status: election.status,
            candidate_count: election.candidates.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDescription {
    pub id: Id,
    pub name: String,
    pub running_mate: Option<Id>,
    pub order: u32,
}

/// Full public description of an election, without the individual votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionDescription {
    pub id: Id,
    pub name: String,
    pub status: ElectionStatus,
    pub candidates: Vec<CandidateDescription>,
}

impl From<&Election> for ElectionDescription {
    fn from(election: &Election) -> Self {
        let candidates = election
            .ordered_candidates()
            .into_iter()
            .map(|(id, candidate)| CandidateDescription {
                id: id.clone(),
                name: candidate.name.clone(),
                running_mate: candidate.running_mate.clone(),
                order: candidate.order,
            })
            .collect();
        Self {
            id: election.id.clone(),
            name: election.name.clone(),
            status: election.status,
            candidates,
        }
    }
}
