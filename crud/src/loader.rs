use crate::errors::CrudError;
use crate::matcher;
use crate::metrics_defs::{BATCH_SIZE, INDIVIDUAL_READS, MERGED_READS};
use crate::model::{Operation, QueryResult, ReadRequest, ReadRequestKey, Reader};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use shared::model::RequestParams;
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

type LoadResult = Result<QueryResult, CrudError>;

#[derive(Clone, Copy, Debug)]
pub struct LoaderOptions {
    /// How long a loader keeps collecting reads after the first one arrives.
    pub batch_window: Duration,
    pub max_batch: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            batch_window: Duration::from_millis(5),
            max_batch: 100,
        }
    }
}

struct Pending {
    key: ReadRequestKey,
    reply: oneshot::Sender<LoadResult>,
}

/// Coalesces concurrent reads of a collection into one query.
///
/// One loader task exists per `db_alias:col`. Nothing is cached between
/// batches.
pub struct DataLoader {
    batcher: Batcher,
    options: LoaderOptions,
    loaders: RwLock<HashMap<String, mpsc::Sender<Pending>>>,
}

impl DataLoader {
    pub fn new(project: &str, reader: Arc<dyn Reader>, options: LoaderOptions) -> Self {
        DataLoader {
            batcher: Batcher {
                project: project.to_string(),
                reader,
            },
            options,
            loaders: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load(&self, key: ReadRequestKey) -> LoadResult {
        let group = format!("{}:{}", key.db_alias, key.col);
        let tx = self.loader(&group);

        let (reply, rx) = oneshot::channel();
        tx.send(Pending { key, reply })
            .await
            .map_err(|_| CrudError::LoaderClosed(group.clone()))?;
        rx.await.map_err(|_| CrudError::LoaderClosed(group))?
    }

    fn loader(&self, group: &str) -> mpsc::Sender<Pending> {
        if let Some(tx) = self.loaders.read().get(group) {
            return tx.clone();
        }

        let mut loaders = self.loaders.write();
        loaders
            .entry(group.to_string())
            .or_insert_with(|| {
                tracing::debug!(group, "creating data loader");
                let (tx, rx) = mpsc::channel(self.options.max_batch.max(1));
                tokio::spawn(run_loader(self.batcher.clone(), rx, self.options));
                tx
            })
            .clone()
    }
}

/// Gathers reads until the window closes or the batch is full, then
/// dispatches the batch without waiting for it. Exits once the owning
/// `DataLoader` is dropped.
async fn run_loader(batcher: Batcher, mut rx: mpsc::Receiver<Pending>, options: LoaderOptions) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        let window = tokio::time::sleep(options.batch_window);
        tokio::pin!(window);

        while batch.len() < options.max_batch {
            tokio::select! {
                _ = &mut window => break,
                next = rx.recv() => match next {
                    Some(pending) => batch.push(pending),
                    None => break,
                },
            }
        }

        let batcher = batcher.clone();
        tokio::spawn(async move {
            let (keys, replies): (Vec<_>, Vec<_>) =
                batch.into_iter().map(|p| (p.key, p.reply)).unzip();
            let results = batcher.batch(keys).await;
            for (reply, result) in replies.into_iter().zip(results) {
                // The caller may have given up waiting.
                let _ = reply.send(result);
            }
        });
    }
}

/// Merges `find` with every `match_where` entry. An `$or` in entry `i`
/// becomes `$or:i` so that entries do not overwrite each other.
pub(crate) fn merge_where(mut find: Map<String, Value>, match_where: &[Map<String, Value>]) -> Map<String, Value> {
    for (i, clause) in match_where.iter().enumerate() {
        for (k, v) in clause {
            let key = if k == "$or" { format!("$or:{i}") } else { k.clone() };
            find.insert(key, v.clone());
        }
    }
    find
}

struct Clause {
    index: usize,
    operation: Operation,
    db_type: String,
    find: Map<String, Value>,
}

#[derive(Clone)]
struct Batcher {
    project: String,
    reader: Arc<dyn Reader>,
}

impl Batcher {
    /// Resolves a batch of reads; the result at index `i` belongs to `keys[i]`.
    async fn batch(&self, keys: Vec<ReadRequestKey>) -> Vec<LoadResult> {
        let Some(first) = keys.first() else {
            return Vec::new();
        };
        let db_alias = first.db_alias.clone();
        let col = first.col.clone();
        histogram!(BATCH_SIZE).record(keys.len() as f64);

        let mut results: Vec<Option<LoadResult>> = (0..keys.len()).map(|_| None).collect();
        let mut individual = JoinSet::new();
        let mut clauses = Vec::new();

        for (index, key) in keys.into_iter().enumerate() {
            if key.has_options {
                let reader = self.reader.clone();
                let mut req = key.req;
                req.is_batch = false;
                // Nested selections need every field of the row.
                req.options.select = None;
                counter!(INDIVIDUAL_READS).increment(1);
                individual.spawn(async move {
                    let res = reader.read(&key.db_alias, &key.col, &req, &key.params).await;
                    (index, res)
                });
                continue;
            }

            clauses.push(Clause {
                index,
                operation: key.req.operation,
                db_type: key.db_type,
                find: merge_where(key.req.find, &key.req.match_where),
            });
        }

        let mut failure = None;
        while let Some(joined) = individual.join_next().await {
            match joined {
                Ok((index, Ok(res))) => results[index] = Some(Ok(res)),
                Ok((index, Err(err))) => {
                    tracing::warn!(db_alias, col, error = %err, "individual read failed, cancelling batch");
                    results[index] = Some(Err(err.clone()));
                    failure.get_or_insert(err);
                    individual.abort_all();
                }
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    tracing::error!(db_alias, col, error = %err, "individual read panicked");
                    failure.get_or_insert(CrudError::Cancelled);
                    individual.abort_all();
                }
            }
        }

        if let Some(err) = failure {
            fill_unfilled(&mut results, &err);
        } else if !clauses.is_empty() {
            match self.merged_read(&db_alias, &col, &clauses).await {
                Ok(res) => {
                    counter!(MERGED_READS, "status" => "ok").increment(1);
                    fill_results(&mut results, &clauses, res);
                }
                Err(err) => {
                    counter!(MERGED_READS, "status" => "error").increment(1);
                    tracing::warn!(db_alias, col, error = %err, "merged read failed");
                    fill_unfilled(&mut results, &err);
                }
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or(Err(CrudError::Cancelled)))
            .collect()
    }

    async fn merged_read(&self, db_alias: &str, col: &str, clauses: &[Clause]) -> LoadResult {
        let mut or: Vec<Value> = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let find = Value::Object(clause.find.clone());
            if !or.contains(&find) {
                or.push(find);
            }
        }

        let req = ReadRequest {
            find: Map::from_iter([("$or".to_string(), Value::Array(or))]),
            operation: Operation::All,
            ..Default::default()
        };
        let params = RequestParams {
            resource: "db-read".to_string(),
            op: "access".to_string(),
            attributes: HashMap::from([
                ("project".to_string(), self.project.clone()),
                ("db".to_string(), db_alias.to_string()),
                ("col".to_string(), col.to_string()),
            ]),
            ..Default::default()
        };

        self.reader.read(db_alias, col, &req, &params).await
    }
}

fn fill_unfilled(results: &mut [Option<LoadResult>], err: &CrudError) {
    for slot in results.iter_mut().filter(|s| s.is_none()) {
        *slot = Some(Err(err.clone()));
    }
}

fn fill_results(results: &mut [Option<LoadResult>], clauses: &[Clause], res: QueryResult) {
    let docs = match res.docs {
        Value::Array(docs) => docs,
        other => {
            let found = match other {
                Value::Object(_) => "an object",
                Value::Null => "null",
                _ => "a scalar",
            };
            fill_unfilled(results, &CrudError::UnexpectedResult(found));
            return;
        }
    };

    for clause in clauses {
        let mut matching = docs
            .iter()
            .filter(|doc| matcher::matches(&clause.db_type, &clause.find, doc));

        let docs = match clause.operation {
            Operation::One => matching.next().cloned().unwrap_or(Value::Null),
            _ => Value::Array(matching.cloned().collect()),
        };
        results[clause.index] = Some(Ok(QueryResult {
            docs,
            meta: res.meta.clone(),
        }));
    }
}
