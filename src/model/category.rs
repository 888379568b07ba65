use std::collections::HashMap;
use std::ops::Deref;

use log::info;
use rocket::serde::json::{serde_json, Value};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    election::Election,
    id::Id,
    require_name,
    voter::{Voter, VoterCore},
};
use crate::store::{decode_children, DbPath, Store, Updates};

pub const CATEGORIES: &str = "categories";

/// A group of voters, and the elections its members may vote in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCore {
    pub name: String,
    #[serde(default)]
    pub elections: Vec<Id>,
}

impl CategoryCore {
    pub fn allows(&self, election_id: &Id) -> bool {
        self.elections.contains(election_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Id,
    #[serde(flatten)]
    pub category: CategoryCore,
}

impl Deref for Category {
    type Target = CategoryCore;

    fn deref(&self) -> &Self::Target {
        &self.category
    }
}

impl Category {
    pub fn collection_path() -> DbPath {
        DbPath::from(CATEGORIES)
    }

    pub fn path(id: &Id) -> DbPath {
        Self::collection_path().child(id)
    }

    pub fn elections_path(id: &Id) -> DbPath {
        Self::path(id).child("elections")
    }

    pub async fn load(store: &Store, id: &Id) -> Result<Option<Self>> {
        Ok(store.fetch(&Self::path(id)).await?.map(|category| Self {
            id: id.clone(),
            category,
        }))
    }

    pub async fn require(store: &Store, id: &Id) -> Result<Self> {
        Self::load(store, id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Category {id}")))
    }

    pub async fn all(store: &Store) -> Result<Vec<Self>> {
        Ok(store
            .fetch_children(&Self::collection_path())
            .await?
            .into_iter()
            .map(|(id, category)| Self { id, category })
            .collect())
    }
}

/// A category as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    #[serde(default)]
    pub elections: Vec<Id>,
}

/// Validate `spec` against the stored elections (the raw `elections`
/// collection) and build the record to store. Duplicate election IDs are
/// dropped.
fn validated(spec: &CategorySpec, name: &str, elections: Option<Value>) -> Result<CategoryCore> {
    let existing: HashMap<Id, Value> = decode_children(elections)?.into_iter().collect();
    let mut listed = Vec::with_capacity(spec.elections.len());
    for election_id in &spec.elections {
        if !existing.contains_key(election_id) {
            return Err(Error::not_found(format!("Election {election_id}")));
        }
        if !listed.contains(election_id) {
            listed.push(election_id.clone());
        }
    }
    Ok(CategoryCore {
        name: name.to_string(),
        elections: listed,
    })
}

pub async fn create_category(store: &Store, spec: &CategorySpec) -> Result<Category> {
    let name = require_name(&spec.name, "Category")?;
    let id = Id::new();
    let mut created = None;
    store
        .transaction(&[Election::collection_path()], &mut |values| {
            let category = validated(spec, &name, values[0].clone())?;
            let mut updates = Updates::new();
            updates.set(Category::path(&id), serde_json::to_value(&category)?);
            created = Some(category);
            Ok(updates)
        })
        .await?;
    let category = created.ok_or_else(|| Error::Store("Category was not written".into()))?;
    info!("Created category {id} ({:?})", category.name);
    Ok(Category { id, category })
}

/// Replace a category's name and election list.
pub async fn update_category(store: &Store, id: &Id, spec: &CategorySpec) -> Result<()> {
    let name = require_name(&spec.name, "Category")?;
    store
        .transaction(
            &[Category::path(id), Election::collection_path()],
            &mut |values| {
                if values[0].is_none() {
                    return Err(Error::not_found(format!("Category {id}")));
                }
                let category = validated(spec, &name, values[1].clone())?;
                let mut updates = Updates::new();
                updates.set(Category::path(id), serde_json::to_value(&category)?);
                Ok(updates)
            },
        )
        .await
}

/// Delete a category. Voters in it are left without a category.
pub async fn delete_category(store: &Store, id: &Id) -> Result<()> {
    store
        .transaction(
            &[Category::path(id), Voter::collection_path()],
            &mut |values| {
                if values[0].is_none() {
                    return Err(Error::not_found(format!("Category {id}")));
                }
                let voters: Vec<(Id, VoterCore)> = decode_children(values[1].clone())?;
                let mut updates = Updates::new();
                updates.remove(Category::path(id));
                for (voter_id, voter) in voters {
                    if voter.category.as_ref() == Some(id) {
                        updates.remove(Voter::path(&voter_id).child("category"));
                    }
                }
                Ok(updates)
            },
        )
        .await?;
    info!("Deleted category {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::{json, serde_json};

    use super::*;

    #[test]
    fn allows_listed_elections_only() {
        let category: CategoryCore =
            serde_json::from_value(json!({"name": "Class 12", "elections": ["e1"]})).unwrap();
        assert!(category.allows(&"e1".parse().unwrap()));
        assert!(!category.allows(&"e2".parse().unwrap()));

        let empty: CategoryCore = serde_json::from_value(json!({"name": "Staff"})).unwrap();
        assert!(empty.elections.is_empty());
    }

    #[test]
    fn described_with_flattened_id() {
        let category = Category {
            id: "c1".parse().unwrap(),
            category: CategoryCore {
                name: "Class 12".into(),
                elections: vec![],
            },
        };
        assert_eq!(
            serde_json::to_value(&category).unwrap(),
            json!({"id": "c1", "name": "Class 12", "elections": []})
        );
    }

    #[rocket::async_test]
    async fn create_update_delete() {
        let store = Store::memory();
        store
            .set(
                &Election::path(&"e1".parse().unwrap()),
                json!({"name": "Chair", "status": "pending"}),
            )
            .await
            .unwrap();
        let e1: Id = "e1".parse().unwrap();

        let spec = CategorySpec {
            name: "Class 12".into(),
            elections: vec![e1.clone(), e1.clone()],
        };
        let category = create_category(&store, &spec).await.unwrap();
        assert_eq!(category.elections, vec![e1.clone()]);

        let unknown = CategorySpec {
            name: "Class 12".into(),
            elections: vec!["e9".parse().unwrap()],
        };
        let err = update_category(&store, &category.id, &unknown)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let renamed = CategorySpec {
            name: "Class 13".into(),
            elections: vec![],
        };
        update_category(&store, &category.id, &renamed).await.unwrap();
        let stored = Category::require(&store, &category.id).await.unwrap();
        assert_eq!(stored.name, "Class 13");
        assert!(stored.elections.is_empty());

        let voter_path = Voter::path(&"v1".parse().unwrap());
        store
            .set(
                &voter_path,
                json!({"name": "Ada", "category": category.id.as_str(), "passwordHash": ""}),
            )
            .await
            .unwrap();
        delete_category(&store, &category.id).await.unwrap();
        assert!(Category::load(&store, &category.id).await.unwrap().is_none());
        let voter = Voter::require(&store, &"v1".parse().unwrap()).await.unwrap();
        assert_eq!(voter.category, None);

        assert!(delete_category(&store, &category.id).await.is_err());
    }
}
