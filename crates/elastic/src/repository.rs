//! The record repository over one engine index.

use std::collections::VecDeque;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

use elasticsearch::http::StatusCode;
use elasticsearch::http::request::JsonBody;
use elasticsearch::{BulkParts, DeleteParts, Elasticsearch, IndexParts, SearchParts};
use serde_json::Value;
use tracing::debug;

use bingo_model::{IndigoRecord, RecordKind};

use crate::builder::{RepositoryBuilder, RepositoryConfig};
use crate::codec;
use crate::error::{RepositoryError, RepositoryResult, transport_error};
use crate::query::{CompiledQuery, SearchCriteria};
use crate::schema;
use crate::version::{EngineVersion, VersionProfile};

const UNCONNECTED: u8 = 0;
const READY: u8 = 1;
const CLOSED: u8 = 2;

/// Hits fetched per round trip while a cursor drains.
const CURSOR_PAGE_SIZE: u32 = 100;

/// A repository of one record kind in one engine index.
///
/// Construction is offline; the index is created lazily on first use
/// (or eagerly through [`ensure_index`](Self::ensure_index)). A
/// repository starts unconnected, becomes ready once its index is
/// known to exist, and is closed exactly once; operations on a closed
/// repository fail without touching the network. Instances are safe to
/// share across tasks, the handle and profile are read-only after
/// construction.
///
/// Writes become visible to queries only after the index's refresh
/// interval elapses, or after an explicit [`refresh`](Self::refresh).
pub struct ElasticRepository<R: IndigoRecord> {
    client: Elasticsearch,
    config: RepositoryConfig,
    profile: VersionProfile,
    kind: RecordKind,
    state: AtomicU8,
    _record: PhantomData<R>,
}

impl<R: IndigoRecord> ElasticRepository<R> {
    pub(crate) fn new(
        client: Elasticsearch,
        config: RepositoryConfig,
        profile: VersionProfile,
        kind: RecordKind,
    ) -> Self {
        ElasticRepository {
            client,
            config,
            profile,
            kind,
            state: AtomicU8::new(UNCONNECTED),
            _record: PhantomData,
        }
    }

    /// A builder for a new repository.
    pub fn builder() -> RepositoryBuilder {
        RepositoryBuilder::new()
    }

    /// The index this repository reads and writes.
    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    /// The record kind this repository is bound to.
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// The engine version the repository talks to.
    pub fn version(&self) -> EngineVersion {
        self.profile.version()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLOSED
    }

    /// Indexes one record and returns its identifier, engine-assigned
    /// when the record carries none.
    pub async fn insert(&self, record: &R) -> RepositoryResult<String> {
        self.check_open("insert")?;
        let document = codec::encode(record)?;
        let id = self
            .with_deadline("insert", async {
                self.ensure_ready().await?;
                let index = self.config.index_name.as_str();
                let request = match record.id() {
                    Some(id) => self.client.index(IndexParts::IndexId(index, id)),
                    None => self.client.index(IndexParts::Index(index)),
                };
                let response = request
                    .body(document)
                    .send()
                    .await
                    .map_err(|e| transport_error("insert", self.config.request_timeout, e))?;

                let status = response.status_code();
                if !status.is_success() {
                    return Err(engine_rejection("insert", response).await);
                }
                let body = response
                    .json::<Value>()
                    .await
                    .map_err(|e| transport_error("insert", self.config.request_timeout, e))?;
                body.get("_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| RepositoryError::Engine {
                        operation: "insert".to_string(),
                        status: None,
                        message: "index response carried no _id".to_string(),
                    })
            })
            .await?;
        debug!("indexed {} record '{id}' into '{}'", self.kind, self.config.index_name);
        Ok(id)
    }

    /// Indexes many records in one bulk round trip.
    ///
    /// The result has one outcome per input record, in input order. A
    /// record that fails to encode takes its error slot without
    /// entering the request, and an engine rejection of one document
    /// never disturbs its siblings.
    pub async fn bulk_insert(&self, records: &[R]) -> RepositoryResult<Vec<RepositoryResult<String>>> {
        self.check_open("bulk_insert")?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let mut encoded: Vec<RepositoryResult<()>> = Vec::with_capacity(records.len());
        let mut body: Vec<JsonBody<Value>> = Vec::new();
        for record in records {
            match codec::encode(record) {
                Ok(document) => {
                    body.push(self.profile.bulk_action(record.id()).into());
                    body.push(document.into());
                    encoded.push(Ok(()));
                }
                Err(error) => encoded.push(Err(error)),
            }
        }
        if body.is_empty() {
            return Ok(assemble_outcomes(encoded, Vec::new()));
        }

        let submitted = body.len() / 2;
        let items = self
            .with_deadline("bulk_insert", async {
                self.ensure_ready().await?;
                let response = self
                    .client
                    .bulk(BulkParts::Index(self.config.index_name.as_str()))
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| transport_error("bulk_insert", self.config.request_timeout, e))?;

                let status = response.status_code();
                if !status.is_success() {
                    return Err(engine_rejection("bulk_insert", response).await);
                }
                let body = response
                    .json::<Value>()
                    .await
                    .map_err(|e| transport_error("bulk_insert", self.config.request_timeout, e))?;
                let items = body
                    .get("items")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().map(bulk_item_outcome).collect())
                    .unwrap_or_default();
                Ok(items)
            })
            .await?;
        debug!(
            "bulk indexed {submitted} of {} {} records into '{}'",
            records.len(),
            self.kind,
            self.config.index_name
        );
        Ok(assemble_outcomes(encoded, items))
    }

    /// Starts a search and returns a lazy cursor over the matches.
    ///
    /// No network I/O happens here; the cursor fetches its first page
    /// on the first [`RecordCursor::try_next`] call.
    pub fn query(&self, criteria: SearchCriteria) -> RepositoryResult<RecordCursor<'_, R>> {
        self.check_open("query")?;
        let query = CompiledQuery::compile(criteria, self.kind)?;
        Ok(RecordCursor {
            repository: self,
            query,
            buffer: VecDeque::new(),
            from: 0,
            total: None,
            yielded: 0,
            exhausted: false,
        })
    }

    /// Deletes the document with the given identifier. An unknown
    /// identifier is an error, not a silent no-op.
    pub async fn delete_by_id(&self, id: &str) -> RepositoryResult<()> {
        self.check_open("delete_by_id")?;
        self.with_deadline("delete_by_id", async {
            let index = self.config.index_name.as_str();
            let response = self
                .client
                .delete(DeleteParts::IndexId(index, id))
                .send()
                .await
                .map_err(|e| transport_error("delete_by_id", self.config.request_timeout, e))?;

            let status = response.status_code();
            if status == StatusCode::NOT_FOUND {
                return Err(RepositoryError::NotFound {
                    index: index.to_string(),
                    id: id.to_string(),
                });
            }
            if !status.is_success() {
                return Err(engine_rejection("delete_by_id", response).await);
            }
            debug!("deleted record '{id}' from '{index}'");
            Ok(())
        })
        .await
    }

    /// Creates the index now if it does not exist yet. Idempotent and
    /// safe to race with other callers.
    pub async fn ensure_index(&self) -> RepositoryResult<()> {
        self.check_open("ensure_index")?;
        self.with_deadline("ensure_index", self.ensure_ready()).await
    }

    /// Drops the index with everything in it. The repository falls
    /// back to unconnected and will recreate the index on next use.
    pub async fn delete_index(&self) -> RepositoryResult<()> {
        self.check_open("delete_index")?;
        self.with_deadline("delete_index", schema::delete_index(&self.client, &self.config))
            .await?;
        let _ = self
            .state
            .compare_exchange(READY, UNCONNECTED, Ordering::AcqRel, Ordering::Acquire);
        Ok(())
    }

    /// Forces a refresh so everything indexed so far becomes visible
    /// to queries immediately.
    pub async fn refresh(&self) -> RepositoryResult<()> {
        self.check_open("refresh")?;
        self.with_deadline("refresh", async {
            self.ensure_ready().await?;
            schema::refresh_index(&self.client, &self.config).await
        })
        .await
    }

    /// Closes the repository. Infallible and idempotent; every
    /// operation after this fails with a closed error before any I/O.
    pub fn close(&self) {
        let previous = self.state.swap(CLOSED, Ordering::AcqRel);
        if previous != CLOSED {
            debug!(
                "closed {} repository for index '{}'",
                self.kind, self.config.index_name
            );
        }
    }

    fn check_open(&self, operation: &str) -> RepositoryResult<()> {
        if self.state.load(Ordering::Acquire) == CLOSED {
            return Err(RepositoryError::Closed {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Index existence is checked at most once per ready period; the
    /// engine's create-if-absent is the only race guard, no lock is
    /// held across the call.
    async fn ensure_ready(&self) -> RepositoryResult<()> {
        if self.state.load(Ordering::Acquire) == READY {
            return Ok(());
        }
        schema::ensure_index(&self.client, &self.config, self.kind, self.profile).await?;
        // a concurrent close() keeps its CLOSED state
        let _ = self
            .state
            .compare_exchange(UNCONNECTED, READY, Ordering::AcqRel, Ordering::Acquire);
        Ok(())
    }

    async fn with_deadline<T, F>(&self, operation: &str, call: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>>,
    {
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RepositoryError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.config.request_timeout.as_millis() as u64,
            }),
        }
    }
}

impl<R: IndigoRecord> Drop for ElasticRepository<R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<R: IndigoRecord> std::fmt::Debug for ElasticRepository<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticRepository")
            .field("kind", &self.kind)
            .field("index", &self.config.index_name)
            .field("version", &self.profile.version())
            .finish_non_exhaustive()
    }
}

/// A finite, one-pass stream of query matches.
///
/// Pages are fetched on demand, `CURSOR_PAGE_SIZE` hits at a time, up
/// to the index's `max_result_window`. The cursor is not restartable;
/// run the query again for a fresh pass.
pub struct RecordCursor<'a, R: IndigoRecord> {
    repository: &'a ElasticRepository<R>,
    query: CompiledQuery,
    buffer: VecDeque<R>,
    from: u32,
    total: Option<u64>,
    yielded: usize,
    exhausted: bool,
}

impl<R: IndigoRecord> RecordCursor<'_, R> {
    /// The next matching record, or `None` once the results are
    /// drained or the criteria's limit is reached.
    pub async fn try_next(&mut self) -> RepositoryResult<Option<R>> {
        loop {
            if let Some(limit) = self.query.limit() {
                if self.yielded >= limit {
                    return Ok(None);
                }
            }
            if let Some(record) = self.buffer.pop_front() {
                self.yielded += 1;
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    /// Drains the cursor into a vector.
    pub async fn collect(mut self) -> RepositoryResult<Vec<R>> {
        let mut records = Vec::new();
        while let Some(record) = self.try_next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// The engine's match count, known once the first page has been
    /// fetched. An approximation: refreshes and concurrent writes can
    /// move it while the cursor drains, and exact-match verification
    /// may drop screened hits the engine counted.
    pub fn approximate_total(&self) -> Option<u64> {
        self.total
    }

    async fn fetch_page(&mut self) -> RepositoryResult<()> {
        let repository = self.repository;
        repository.check_open("query")?;

        let window = repository.config.max_result_window;
        if self.from >= window {
            self.exhausted = true;
            return Ok(());
        }
        let size = CURSOR_PAGE_SIZE.min(window - self.from);
        let body = self.query.page_body(repository.profile, self.from, size);

        let response_body = repository
            .with_deadline("query", async {
                repository.ensure_ready().await?;
                let response = repository
                    .client
                    .search(SearchParts::Index(&[repository.config.index_name.as_str()]))
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| transport_error("query", repository.config.request_timeout, e))?;

                let status = response.status_code();
                if !status.is_success() {
                    return Err(engine_rejection("query", response).await);
                }
                response
                    .json::<Value>()
                    .await
                    .map_err(|e| transport_error("query", repository.config.request_timeout, e))
            })
            .await?;

        let hits = &response_body["hits"];
        if self.total.is_none() {
            self.total = repository.profile.parse_total(hits);
        }
        let page = hits.get("hits").and_then(Value::as_array).cloned().unwrap_or_default();
        if (page.len() as u32) < size {
            self.exhausted = true;
        }
        self.from += page.len() as u32;

        for hit in &page {
            let id = hit.get("_id").and_then(Value::as_str).map(str::to_string);
            let source = hit.get("_source").cloned().unwrap_or(Value::Null);
            let record: R = codec::decode(id, &source)?;
            // the fingerprint screen admits false positives
            if let Some(structure) = self.query.exact_structure() {
                if record.structure() != structure {
                    continue;
                }
            }
            self.buffer.push_back(record);
        }
        Ok(())
    }
}

/// Zips engine outcomes back into the encode slots, preserving input
/// order. `items` holds one outcome per document that entered the
/// request.
fn assemble_outcomes(
    encoded: Vec<RepositoryResult<()>>,
    items: Vec<RepositoryResult<String>>,
) -> Vec<RepositoryResult<String>> {
    let mut items = items.into_iter();
    encoded
        .into_iter()
        .map(|slot| match slot {
            Err(error) => Err(error),
            Ok(_) => items.next().unwrap_or_else(|| {
                Err(RepositoryError::Engine {
                    operation: "bulk_insert".to_string(),
                    status: None,
                    message: "bulk response carried fewer items than submitted".to_string(),
                })
            }),
        })
        .collect()
}

/// One entry of a bulk response's `items` array.
fn bulk_item_outcome(item: &Value) -> RepositoryResult<String> {
    let action = item.get("index").or_else(|| item.get("create")).unwrap_or(item);
    if let Some(error) = action.get("error") {
        let status = action
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok());
        return Err(RepositoryError::Engine {
            operation: "bulk_insert".to_string(),
            status,
            message: error.to_string(),
        });
    }
    action
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RepositoryError::Engine {
            operation: "bulk_insert".to_string(),
            status: None,
            message: "bulk item carried no _id".to_string(),
        })
}

async fn engine_rejection(operation: &str, response: elasticsearch::http::response::Response) -> RepositoryError {
    let status = response.status_code().as_u16();
    let message = response.text().await.unwrap_or_default();
    RepositoryError::Engine {
        operation: operation.to_string(),
        status: Some(status),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bingo_model::IndigoRecordMolecule;
    use serde_json::json;
    use std::time::Duration;

    fn offline_repository() -> ElasticRepository<IndigoRecordMolecule> {
        RepositoryBuilder::new()
            .with_index_name("bingo-molecules")
            .with_host_name("localhost")
            .with_port(9200)
            .with_scheme("http")
            .with_version("8")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn closed_repositories_reject_without_io() {
        let repository = offline_repository();
        repository.close();
        assert!(repository.is_closed());

        let record = IndigoRecordMolecule::new("CCO");
        let err = repository.insert(&record).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Closed { ref operation } if operation == "insert"));

        let err = repository.bulk_insert(&[record]).await.unwrap_err();
        assert!(
            matches!(err, RepositoryError::Closed { ref operation } if operation == "bulk_insert")
        );

        let err = repository.query(SearchCriteria::all()).map(drop).unwrap_err();
        assert!(matches!(err, RepositoryError::Closed { ref operation } if operation == "query"));

        let err = repository.delete_by_id("x").await.unwrap_err();
        assert!(
            matches!(err, RepositoryError::Closed { ref operation } if operation == "delete_by_id")
        );

        let err = repository.ensure_index().await.unwrap_err();
        assert!(
            matches!(err, RepositoryError::Closed { ref operation } if operation == "ensure_index")
        );

        let err = repository.delete_index().await.unwrap_err();
        assert!(
            matches!(err, RepositoryError::Closed { ref operation } if operation == "delete_index")
        );

        let err = repository.refresh().await.unwrap_err();
        assert!(matches!(err, RepositoryError::Closed { ref operation } if operation == "refresh"));
    }

    #[tokio::test]
    async fn deadline_elapses_as_a_timeout() {
        // A listener that is never accepted from: the connection lands in
        // the backlog and the request hangs until a timer fires.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let repository: ElasticRepository<IndigoRecordMolecule> = RepositoryBuilder::new()
            .with_index_name("bingo-molecules")
            .with_host_name("127.0.0.1")
            .with_port(port)
            .with_scheme("http")
            .with_version("8")
            .with_request_timeout(Duration::from_millis(200))
            .build()
            .unwrap();

        let record = IndigoRecordMolecule::new("CCO");
        let err = repository.insert(&record).await.unwrap_err();
        match err {
            RepositoryError::Timeout { timeout_ms, .. } => assert_eq!(timeout_ms, 200),
            other => panic!("expected a timeout, got {other}"),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let repository = offline_repository();
        repository.close();
        repository.close();
        assert!(repository.is_closed());
    }

    #[tokio::test]
    async fn cursors_check_the_state_on_every_page() {
        let repository = offline_repository();
        let mut cursor = repository.query(SearchCriteria::all()).unwrap();
        repository.close();
        let err = cursor.try_next().await.unwrap_err();
        assert!(matches!(err, RepositoryError::Closed { .. }));
    }

    #[tokio::test]
    async fn encode_failures_surface_without_network() {
        let repository = offline_repository();
        let malformed = IndigoRecordMolecule::new("C1(CC");

        let err = repository.insert(&malformed).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Encoding { .. }));

        let outcomes = repository.bulk_insert(&[malformed.clone(), malformed]).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, Err(RepositoryError::Encoding { .. }))));
    }

    #[tokio::test]
    async fn empty_bulk_inserts_are_a_local_no_op() {
        let repository = offline_repository();
        let outcomes = repository.bulk_insert(&[]).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn malformed_criteria_fail_at_query_time() {
        let repository = offline_repository();
        let err = repository.query(SearchCriteria::substructure("C1(CC")).map(drop).unwrap_err();
        assert!(matches!(err, RepositoryError::Encoding { .. }));
    }

    #[test]
    fn outcomes_keep_input_order_around_encode_failures() {
        let encode_failure = RepositoryError::Encoding {
            kind: "molecule".to_string(),
            id: None,
            message: "unbalanced brackets".to_string(),
        };
        let encoded = vec![Ok(()), Err(encode_failure), Ok(())];
        let items = vec![Ok("id-1".to_string()), Ok("id-3".to_string())];

        let outcomes = assemble_outcomes(encoded, items);
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0].as_deref(), Ok("id-1")));
        assert!(matches!(outcomes[1], Err(RepositoryError::Encoding { .. })));
        assert!(matches!(outcomes[2].as_deref(), Ok("id-3")));
    }

    #[test]
    fn short_bulk_responses_become_engine_errors() {
        let encoded = vec![Ok(()), Ok(())];
        let items = vec![Ok("id-1".to_string())];
        let outcomes = assemble_outcomes(encoded, items);
        assert!(outcomes[0].is_ok());
        assert!(matches!(outcomes[1], Err(RepositoryError::Engine { .. })));
    }

    #[test]
    fn bulk_items_parse_successes_and_rejections() {
        let ok = json!({ "index": { "_id": "abc", "status": 201 } });
        assert_eq!(bulk_item_outcome(&ok).unwrap(), "abc");

        let rejected = json!({
            "index": {
                "status": 400,
                "error": { "type": "mapper_parsing_exception", "reason": "failed to parse" }
            }
        });
        let err = bulk_item_outcome(&rejected).unwrap_err();
        match err {
            RepositoryError::Engine { status, message, .. } => {
                assert_eq!(status, Some(400));
                assert!(message.contains("mapper_parsing_exception"));
            }
            other => panic!("expected Engine error, got {other}"),
        }
    }
}
