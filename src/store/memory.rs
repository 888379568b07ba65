use rocket::{
    serde::json::{serde_json::Map, Value},
    tokio::sync::Mutex,
};

use crate::error::Result;

use super::{DbPath, Tree, TxFn, Updates};

/// An in-process tree. Every operation holds the tree lock for its whole
/// duration, so transactions are trivially serialisable.
pub struct MemoryTree {
    root: Mutex<Value>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
        }
    }
}

impl MemoryTree {
    /// Start from an existing JSON tree.
    #[cfg(test)]
    pub fn with_root(root: Value) -> Self {
        Self {
            root: Mutex::new(root),
        }
    }
}

fn lookup<'v>(root: &'v Value, path: &DbPath) -> Option<&'v Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

/// The node as an object, replacing any scalar found in the way.
fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was replaced with an object"),
    }
}

fn write(root: &mut Value, path: &DbPath, value: Option<Value>) {
    let Some((last, parents)) = path.segments().split_last() else {
        *root = value.unwrap_or_else(|| Value::Object(Map::new()));
        return;
    };

    match value {
        Some(value) => {
            let mut node = root;
            for segment in parents {
                node = object_mut(node)
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            object_mut(node).insert(last.clone(), value);
        }
        None => {
            let mut node = root;
            for segment in parents {
                match node.as_object_mut().and_then(|map| map.get_mut(segment)) {
                    Some(child) => node = child,
                    None => return,
                }
            }
            if let Some(map) = node.as_object_mut() {
                map.remove(last);
            }
        }
    }
}

fn apply(root: &mut Value, updates: Updates) {
    for (path, value) in updates {
        write(root, &path, value);
    }
}

#[rocket::async_trait]
impl Tree for MemoryTree {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, path: &DbPath) -> Result<Option<Value>> {
        path.validate()?;
        let root = self.root.lock().await;
        Ok(lookup(&root, path).cloned())
    }

    async fn update(&self, updates: Updates) -> Result<()> {
        updates.validate()?;
        let mut root = self.root.lock().await;
        apply(&mut root, updates);
        Ok(())
    }

    async fn transaction(&self, reads: &[DbPath], apply_fn: &mut TxFn<'_>) -> Result<()> {
        for path in reads {
            path.validate()?;
        }
        let mut root = self.root.lock().await;
        let values = reads
            .iter()
            .map(|path| lookup(&root, path).cloned())
            .collect::<Vec<_>>();
        let updates = apply_fn(&values)?;
        updates.validate()?;
        apply(&mut root, updates);
        Ok(())
    }
}
