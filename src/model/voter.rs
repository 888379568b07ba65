use std::collections::HashMap;
use std::ops::Deref;

use log::info;
use rocket::{
    http::Status,
    serde::json::{serde_json, Value},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{category::Category, hash_password, id::Id, require_name, verify_password};
use crate::store::{DbPath, Store, Updates};

pub const VOTERS: &str = "voters";

/// Core voter data, as stored under `voters/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterCore {
    pub name: String,
    /// The category that decides which elections this voter may vote in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Id>,
    pub password_hash: String,
    /// Election ID to whether the voter has cast a ballot there.
    #[serde(default)]
    pub has_voted: HashMap<Id, bool>,
}

impl VoterCore {
    pub fn has_voted_in(&self, election_id: &Id) -> bool {
        self.has_voted.get(election_id).copied().unwrap_or(false)
    }

    pub fn verify_password(&self, password: &str) -> bool {
        verify_password(&self.password_hash, password)
    }
}

/// A voter together with its ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub id: Id,
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl Voter {
    pub fn collection_path() -> DbPath {
        DbPath::from(VOTERS)
    }

    pub fn path(id: &Id) -> DbPath {
        Self::collection_path().child(id)
    }

    pub fn category_path(id: &Id) -> DbPath {
        Self::path(id).child("category")
    }

    pub fn has_voted_path(id: &Id, election_id: &Id) -> DbPath {
        Self::path(id).child("hasVoted").child(election_id)
    }

    pub async fn load(store: &Store, id: &Id) -> Result<Option<Self>> {
        Ok(store.fetch(&Self::path(id)).await?.map(|voter| Self {
            id: id.clone(),
            voter,
        }))
    }

    pub async fn require(store: &Store, id: &Id) -> Result<Self> {
        Self::load(store, id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter {id}")))
    }

    pub async fn all(store: &Store) -> Result<Vec<Self>> {
        Ok(store
            .fetch_children(&Self::collection_path())
            .await?
            .into_iter()
            .map(|(id, voter)| Self { id, voter })
            .collect())
    }
}

/// A new voter, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterSpec {
    /// Optional externally meaningful ID, e.g. a student number.
    #[serde(default)]
    pub id: Option<Id>,
    pub name: String,
    #[serde(default)]
    pub category: Option<Id>,
    pub password: String,
}

/// A replacement for a voter's editable fields. The password is only
/// changed when given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterUpdate {
    pub name: String,
    #[serde(default)]
    pub category: Option<Id>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Voter login details.
#[derive(Clone, Deserialize, Serialize)]
pub struct VoterCredentials {
    pub id: Id,
    pub password: String,
}

/// Check the category a voter is being placed in exists.
fn check_category(category: &Option<Id>, record: Option<&Value>) -> Result<()> {
    match category {
        Some(category_id) if record.is_none() => {
            Err(Error::not_found(format!("Category {category_id}")))
        }
        _ => Ok(()),
    }
}

/// The voter's path, then the category's path if one is given.
fn reads(id: &Id, category: &Option<Id>) -> Vec<DbPath> {
    let mut reads = vec![Voter::path(id)];
    reads.extend(category.as_ref().map(Category::path));
    reads
}

/// Register a voter. The ID from `spec` is used if given and must be free;
/// otherwise a fresh one is generated.
pub async fn create_voter(store: &Store, spec: VoterSpec) -> Result<Voter> {
    let voter = VoterCore {
        name: require_name(&spec.name, "Voter")?,
        category: spec.category,
        password_hash: hash_password(&spec.password)?,
        has_voted: HashMap::new(),
    };
    let id = spec.id.unwrap_or_else(Id::new);
    let record = serde_json::to_value(&voter)?;

    store
        .transaction(&reads(&id, &voter.category), &mut |values| {
            if values[0].is_some() {
                return Err(Error::Status(
                    Status::Conflict,
                    format!("Voter ID already in use: {id}"),
                ));
            }
            check_category(&voter.category, values.get(1).and_then(Option::as_ref))?;
            let mut updates = Updates::new();
            updates.set(Voter::path(&id), record.clone());
            Ok(updates)
        })
        .await?;

    info!("Registered voter {id}");
    Ok(Voter { id, voter })
}

/// Apply an admin's edit to a voter. Voting history is untouched.
pub async fn update_voter(store: &Store, id: &Id, update: VoterUpdate) -> Result<()> {
    let name = require_name(&update.name, "Voter")?;
    let password_hash = update
        .password
        .as_deref()
        .map(hash_password)
        .transpose()?;

    store
        .transaction(&reads(id, &update.category), &mut |values| {
            if values[0].is_none() {
                return Err(Error::not_found(format!("Voter {id}")));
            }
            check_category(&update.category, values.get(1).and_then(Option::as_ref))?;

            let mut updates = Updates::new();
            updates.set(Voter::path(id).child("name"), name.as_str());
            match &update.category {
                Some(category) => updates.set(Voter::category_path(id), category.as_str()),
                None => updates.remove(Voter::category_path(id)),
            };
            if let Some(hash) = &password_hash {
                updates.set(Voter::path(id).child("passwordHash"), hash.as_str());
            }
            Ok(updates)
        })
        .await
}

/// The public view of a voter: never exposes the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterDescription {
    pub id: Id,
    pub name: String,
    pub category: Option<Id>,
    /// Elections this voter has voted in, sorted.
    pub voted_in: Vec<Id>,
}

impl From<Voter> for VoterDescription {
    fn from(voter: Voter) -> Self {
        let mut voted_in: Vec<Id> = voter
            .voter
            .has_voted
            .into_iter()
            .filter_map(|(election, voted)| voted.then_some(election))
            .collect();
        voted_in.sort();
        Self {
            id: voter.id,
            name: voter.voter.name,
            category: voter.voter.category,
            voted_in,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use super::*;

    pub const EXAMPLE_PASSWORD: &str = "ballot-box-42";
    pub const EXAMPLE_VOTER_ID: &str = "s1234567";

    impl VoterCredentials {
        pub fn example() -> Self {
            Self {
                id: EXAMPLE_VOTER_ID.parse().unwrap(),
                password: EXAMPLE_PASSWORD.to_string(),
            }
        }
    }

    impl VoterCore {
        pub fn example(name: &str, category: Option<Id>) -> Self {
            Self {
                name: name.to_string(),
                category,
                password_hash: crate::model::hash_password(EXAMPLE_PASSWORD).unwrap(),
                has_voted: HashMap::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::{json, serde_json};

    use super::*;

    #[test]
    fn stored_shape() {
        let voter: VoterCore = serde_json::from_value(json!({
            "name": "Ada",
            "passwordHash": "h",
            "hasVoted": {"e1": true, "e2": false},
        }))
        .unwrap();
        assert_eq!(voter.category, None);
        assert!(voter.has_voted_in(&"e1".parse().unwrap()));
        assert!(!voter.has_voted_in(&"e2".parse().unwrap()));
        assert!(!voter.has_voted_in(&"e3".parse().unwrap()));

        // `hasVoted` may be absent entirely.
        let voter: VoterCore =
            serde_json::from_value(json!({"name": "Bo", "passwordHash": "h"})).unwrap();
        assert!(voter.has_voted.is_empty());
    }

    #[test]
    fn description_hides_hash_and_lists_votes() {
        let mut core = VoterCore {
            name: "Ada".into(),
            category: Some("c1".parse().unwrap()),
            password_hash: "secret".into(),
            has_voted: HashMap::new(),
        };
        core.has_voted.insert("e2".parse().unwrap(), true);
        core.has_voted.insert("e1".parse().unwrap(), true);
        core.has_voted.insert("e3".parse().unwrap(), false);
        let desc = VoterDescription::from(Voter {
            id: "v1".parse().unwrap(),
            voter: core,
        });
        assert_eq!(
            desc.voted_in,
            vec!["e1".parse::<Id>().unwrap(), "e2".parse().unwrap()]
        );
        let json = serde_json::to_value(&desc).unwrap();
        assert!(json.get("passwordHash").is_none());
    }

    #[rocket::async_test]
    async fn register_and_edit() {
        let store = Store::memory();
        store
            .set(&Category::path(&"staff".parse().unwrap()), json!({"name": "Staff"}))
            .await
            .unwrap();

        let spec = VoterSpec {
            id: Some("s1".parse().unwrap()),
            name: " Ada ".into(),
            category: Some("staff".parse().unwrap()),
            password: "ballot-box-42".into(),
        };
        let voter = create_voter(&store, spec.clone()).await.unwrap();
        assert_eq!(voter.name, "Ada");
        assert!(voter.verify_password("ballot-box-42"));

        // Same ID again.
        let err = create_voter(&store, spec.clone()).await.unwrap_err();
        assert_eq!(err.status(), Status::Conflict);
        // Unknown category.
        let err = create_voter(
            &store,
            VoterSpec {
                id: None,
                category: Some("nope".parse().unwrap()),
                ..spec.clone()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), Status::NotFound);
        // Short password.
        let err = create_voter(
            &store,
            VoterSpec {
                id: None,
                password: "short".into(),
                ..spec
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), Status::BadRequest);

        let update = VoterUpdate {
            name: "Ada L.".into(),
            category: None,
            password: None,
        };
        update_voter(&store, &voter.id, update.clone()).await.unwrap();
        let stored = Voter::require(&store, &voter.id).await.unwrap();
        assert_eq!(stored.name, "Ada L.");
        assert_eq!(stored.category, None);
        assert!(stored.verify_password("ballot-box-42"));

        let err = update_voter(&store, &"ghost".parse().unwrap(), update)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Status::NotFound);
    }

    #[test]
    fn paths() {
        let id: Id = "v1".parse().unwrap();
        let election: Id = "e1".parse().unwrap();
        assert_eq!(
            Voter::has_voted_path(&id, &election).to_string(),
            "/voters/v1/hasVoted/e1"
        );
    }
}
