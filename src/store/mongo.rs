use std::time::{Duration, Instant};

use log::{debug, warn};
use mongodb::{
    bson::{doc, to_bson, Bson, Document},
    error::{TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT},
    options::{FindOneOptions, ReplaceOptions, UpdateOptions},
    Client, ClientSession, Collection, Database,
};
use rand::Rng;
use rocket::{
    futures::TryStreamExt,
    serde::json::{serde_json::Map, Value},
    tokio::time::sleep,
};

use crate::error::{Error, Result};

use super::{DbPath, Tree, TxFn, Updates};

/// How long a transaction keeps retrying transient failures before the last
/// one is reported to the caller. Same budget as the driver's
/// `with_transaction`.
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Each retry waits a random time up to this step times the attempt number,
/// capped at [`MAX_BACKOFF_STEPS`] steps.
const BACKOFF_STEP: Duration = Duration::from_millis(5);
const MAX_BACKOFF_STEPS: u32 = 20;

/// Random pause before retry number `attempt`, so conflicting writers to one
/// document spread out instead of colliding again.
fn backoff(attempt: u32) -> Duration {
    let ceiling = BACKOFF_STEP * attempt.clamp(1, MAX_BACKOFF_STEPS);
    ceiling.mul_f64(rand::thread_rng().gen::<f64>())
}

/// Is this a conflict the server expects us to retry?
fn is_transient(err: &Error) -> bool {
    matches!(err, Error::Db(e) if e.contains_label(TRANSIENT_TRANSACTION_ERROR))
}

/// A tree mapped onto MongoDB: the first path segment names a collection,
/// the second a document `_id`, and the rest a dotted field path inside
/// that document.
///
/// Multi-path writes run in a multi-document transaction, so the server
/// must be a replica set.
pub struct MongoTree {
    client: Client,
    db: Database,
}

/// Where a path lands in MongoDB.
#[derive(Debug, PartialEq, Eq)]
enum Target<'p> {
    Collection(&'p str),
    Document { collection: &'p str, id: &'p str },
    Field { collection: &'p str, id: &'p str, field: String },
}

fn target(path: &DbPath) -> Result<Target<'_>> {
    path.validate()?;
    match path.segments() {
        [] => Err(Error::Store(
            "The root of a MongoDB tree is not addressable".to_string(),
        )),
        [collection] => Ok(Target::Collection(collection)),
        [collection, id] => Ok(Target::Document { collection, id }),
        [collection, id, rest @ ..] => Ok(Target::Field {
            collection,
            id,
            field: rest.join("."),
        }),
    }
}

/// Turn a JSON object into a document with the given `_id`.
fn record(id: &str, value: &Value) -> Result<Document> {
    match to_bson(value)? {
        Bson::Document(mut doc) => {
            doc.insert("_id", id);
            Ok(doc)
        }
        other => Err(Error::Store(format!(
            "Records must be objects, found {other}"
        ))),
    }
}

/// Strip `_id` from a stored document and convert it to JSON.
fn from_record(mut doc: Document) -> Value {
    doc.remove("_id");
    Bson::Document(doc).into_relaxed_extjson()
}

/// Walk down nested documents.
fn descend(doc: Document, fields: &[String]) -> Option<Bson> {
    fields
        .iter()
        .try_fold(Bson::Document(doc), |node, field| match node {
            Bson::Document(mut inner) => inner.remove(field),
            _ => None,
        })
}

fn key_of(id: &Bson) -> String {
    match id {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

impl MongoTree {
    pub fn new(client: Client, db_name: &str) -> Self {
        let db = client.database(db_name);
        Self { client, db }
    }

    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Ok(Self::new(client, db_name))
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection(name)
    }

    async fn read(&self, path: &DbPath, session: &mut ClientSession) -> Result<Option<Value>> {
        let value = match target(path)? {
            Target::Collection(name) => {
                let mut cursor = self
                    .collection(name)
                    .find_with_session(None, None, session)
                    .await?;
                let docs: Vec<Document> = cursor.stream(session).try_collect().await?;
                if docs.is_empty() {
                    None
                } else {
                    let map = docs
                        .into_iter()
                        .map(|doc| {
                            let key = doc.get("_id").map(key_of).unwrap_or_default();
                            (key, from_record(doc))
                        })
                        .collect::<Map<_, _>>();
                    Some(Value::Object(map))
                }
            }
            Target::Document { collection, id } => self
                .collection(collection)
                .find_one_with_session(doc! { "_id": id }, None, session)
                .await?
                .map(from_record),
            Target::Field {
                collection,
                id,
                field,
            } => {
                let options = FindOneOptions::builder()
                    .projection(doc! { &field: 1 })
                    .build();
                self.collection(collection)
                    .find_one_with_session(doc! { "_id": id }, options, session)
                    .await?
                    .and_then(|doc| descend(doc, &path.segments()[2..]))
                    .map(Bson::into_relaxed_extjson)
            }
        };
        Ok(value)
    }

    async fn write(
        &self,
        path: &DbPath,
        value: Option<Value>,
        session: &mut ClientSession,
    ) -> Result<()> {
        match target(path)? {
            Target::Collection(name) => {
                let collection = self.collection(name);
                collection
                    .delete_many_with_session(doc! {}, None, &mut *session)
                    .await?;
                match value {
                    None => {}
                    Some(Value::Object(children)) => {
                        let docs = children
                            .iter()
                            .map(|(id, child)| record(id, child))
                            .collect::<Result<Vec<_>>>()?;
                        if !docs.is_empty() {
                            collection
                                .insert_many_with_session(docs, None, session)
                                .await?;
                        }
                    }
                    Some(other) => {
                        return Err(Error::Store(format!(
                            "Collection {path} must be written as an object, found {other}"
                        )))
                    }
                }
            }
            Target::Document { collection, id } => {
                let collection = self.collection(collection);
                match value {
                    Some(value) => {
                        let options = ReplaceOptions::builder().upsert(true).build();
                        collection
                            .replace_one_with_session(
                                doc! { "_id": id },
                                record(id, &value)?,
                                options,
                                session,
                            )
                            .await?;
                    }
                    None => {
                        collection
                            .delete_one_with_session(doc! { "_id": id }, None, session)
                            .await?;
                    }
                }
            }
            Target::Field {
                collection,
                id,
                field,
            } => {
                let collection = self.collection(collection);
                match value {
                    Some(value) => {
                        let update = doc! { "$set": { &field: to_bson(&value)? } };
                        let options = UpdateOptions::builder().upsert(true).build();
                        collection
                            .update_one_with_session(doc! { "_id": id }, update, options, session)
                            .await?;
                    }
                    None => {
                        let update = doc! { "$unset": { &field: "" } };
                        collection
                            .update_one_with_session(doc! { "_id": id }, update, None, session)
                            .await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// One pass of a transaction: read, compute, write.
    async fn attempt(
        &self,
        reads: &[DbPath],
        apply: &mut TxFn<'_>,
        session: &mut ClientSession,
    ) -> Result<()> {
        let mut values = Vec::with_capacity(reads.len());
        for path in reads {
            values.push(self.read(path, session).await?);
        }
        let updates = apply(&values)?;
        updates.validate()?;
        for (path, value) in updates {
            self.write(&path, value, session).await?;
        }
        Ok(())
    }

    async fn commit(session: &mut ClientSession, started: Instant) -> Result<()> {
        loop {
            match session.commit_transaction().await {
                Err(e)
                    if e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                        && started.elapsed() < TRANSACTION_TIMEOUT =>
                {
                    warn!("Commit result unknown, retrying commit: {e}");
                }
                other => return other.map_err(Error::from),
            }
        }
    }
}

#[rocket::async_trait]
impl Tree for MongoTree {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn get(&self, path: &DbPath) -> Result<Option<Value>> {
        let mut session = self.client.start_session(None).await?;
        self.read(path, &mut session).await
    }

    async fn update(&self, updates: Updates) -> Result<()> {
        updates.validate()?;
        self.transaction(&[], &mut |_| Ok(updates.clone())).await
    }

    async fn transaction(&self, reads: &[DbPath], apply: &mut TxFn<'_>) -> Result<()> {
        for path in reads {
            path.validate()?;
        }
        let mut session = self.client.start_session(None).await?;
        let started = Instant::now();
        let mut attempt = 1;
        loop {
            session.start_transaction(None).await?;
            let result = match self.attempt(reads, apply, &mut session).await {
                Ok(()) => Self::commit(&mut session, started).await,
                Err(e) => {
                    // The server may already have aborted; nothing to do if so.
                    let _ = session.abort_transaction().await;
                    Err(e)
                }
            };
            let err = match result {
                Ok(()) => return Ok(()),
                Err(err) if is_transient(&err) => err,
                Err(err) => return Err(err),
            };
            if started.elapsed() >= TRANSACTION_TIMEOUT {
                warn!(
                    "Giving up on transaction after {attempt} attempts in {:?}: {err}",
                    started.elapsed()
                );
                return Err(err);
            }
            debug!("Transaction attempt {attempt} conflicted, retrying: {err}");
            attempt += 1;
            sleep(backoff(attempt)).await;
        }
    }
}
