//! Managing the candidates of a pending election.

use log::info;
use rocket::{http::Status, serde::json::{serde_json, Value}};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    election::{Candidate, Election},
    id::Id,
    voter::{Voter, VoterCore},
};
use crate::store::{decode, DbPath, Store, Updates};

/// A candidate to add, created from an existing voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSpec {
    pub voter: Id,
    #[serde(default)]
    pub running_mate: Option<Id>,
    #[serde(default)]
    pub order: Option<u32>,
}

/// New values for a candidate's editable fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateUpdate {
    #[serde(default)]
    pub running_mate: Option<Id>,
    pub order: u32,
}

/// The election's path followed by the given voters' paths.
fn reads(election_id: &Id, extra: &[&Id]) -> Vec<DbPath> {
    let mut reads = vec![Election::path(election_id)];
    reads.extend(extra.iter().map(|id| Voter::path(id)));
    reads
}

/// Check a proposed running mate exists and differs from the candidate.
fn check_running_mate(candidate_id: &Id, running_mate: &Id, record: Option<&Value>) -> Result<()> {
    if running_mate == candidate_id {
        return Err(Error::bad_request(format!(
            "Candidate {candidate_id} cannot be their own running mate"
        )));
    }
    if record.is_none() {
        return Err(Error::not_found(format!("Voter {running_mate}")));
    }
    Ok(())
}

/// Add the voter named in `spec` as a candidate. Returns the candidate ID,
/// which is the voter's ID.
pub async fn add_candidate(store: &Store, election_id: &Id, spec: &CandidateSpec) -> Result<Id> {
    let mut extra = vec![&spec.voter];
    extra.extend(spec.running_mate.as_ref());

    store
        .transaction(&reads(election_id, &extra), &mut |values| {
            let election = Election::decode(election_id, values[0].clone())?;
            election.ensure_pending()?;
            let voter: VoterCore = decode(values[1].clone())?
                .ok_or_else(|| Error::not_found(format!("Voter {}", spec.voter)))?;
            if election.candidates.contains_key(&spec.voter) {
                return Err(Error::Status(
                    Status::Conflict,
                    format!(
                        "Voter {} is already a candidate in election {election_id}",
                        spec.voter
                    ),
                ));
            }
            if let Some(mate) = &spec.running_mate {
                check_running_mate(&spec.voter, mate, values[2].as_ref())?;
            }

            let candidate = Candidate {
                name: voter.name,
                running_mate: spec.running_mate.clone(),
                order: spec.order.unwrap_or_else(|| election.next_order()),
            };
            let mut updates = Updates::new();
            updates
                .set(
                    Election::candidate_path(election_id, &spec.voter),
                    serde_json::to_value(&candidate)?,
                )
                .set(Election::result_path(election_id, &spec.voter), 0);
            Ok(updates)
        })
        .await?;

    info!("Added candidate {} to election {election_id}", spec.voter);
    Ok(spec.voter.clone())
}

/// Change a candidate's running mate and ballot position.
pub async fn update_candidate(
    store: &Store,
    election_id: &Id,
    candidate_id: &Id,
    update: &CandidateUpdate,
) -> Result<()> {
    let extra: Vec<&Id> = update.running_mate.iter().collect();
    store
        .transaction(&reads(election_id, &extra), &mut |values| {
            let election = Election::decode(election_id, values[0].clone())?;
            election.ensure_pending()?;
            let existing = election.candidates.get(candidate_id).ok_or_else(|| {
                Error::not_found(format!(
                    "Candidate {candidate_id} in election {election_id}"
                ))
            })?;
            if let Some(mate) = &update.running_mate {
                check_running_mate(candidate_id, mate, values[1].as_ref())?;
            }

            let candidate = Candidate {
                name: existing.name.clone(),
                running_mate: update.running_mate.clone(),
                order: update.order,
            };
            let mut updates = Updates::new();
            updates.set(
                Election::candidate_path(election_id, candidate_id),
                serde_json::to_value(&candidate)?,
            );
            Ok(updates)
        })
        .await
}

/// Withdraw a candidate, along with their tally.
pub async fn remove_candidate(store: &Store, election_id: &Id, candidate_id: &Id) -> Result<()> {
    store
        .transaction(&reads(election_id, &[]), &mut |values| {
            let election = Election::decode(election_id, values[0].clone())?;
            election.ensure_pending()?;
            if !election.candidates.contains_key(candidate_id) {
                return Err(Error::not_found(format!(
                    "Candidate {candidate_id} in election {election_id}"
                )));
            }
            let mut updates = Updates::new();
            updates
                .remove(Election::candidate_path(election_id, candidate_id))
                .remove(Election::result_path(election_id, candidate_id));
            Ok(updates)
        })
        .await?;
    info!("Removed candidate {candidate_id} from election {election_id}");
    Ok(())
}
