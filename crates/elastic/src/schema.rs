//! Index settings and mappings, plus the index lifecycle calls.

use elasticsearch::Elasticsearch;
use elasticsearch::indices::{
    IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesRefreshParts,
};
use serde_json::{Value, json};
use tracing::{debug, info};

use bingo_model::RecordKind;

use crate::builder::RepositoryConfig;
use crate::error::{RepositoryError, RepositoryResult, transport_error};
use crate::version::VersionProfile;

/// Builds the full index body: settings plus the record mapping.
///
/// The mapping pins the fields the codec owns. `structure` is stored
/// verbatim and never analyzed, `fingerprint` is a keyword field with
/// boolean similarity so every matched bit contributes exactly 1.0 to
/// the score, and `fingerprint_len` backs the similarity scripts.
/// Metadata fields go through a dynamic template that maps strings to
/// keywords with a `.text` subfield for full-text filtering.
pub(crate) fn index_body(
    config: &RepositoryConfig,
    kind: RecordKind,
    profile: VersionProfile,
) -> Value {
    let mut settings = json!({
        "number_of_shards": config.shards,
        "number_of_replicas": config.replicas,
        "max_result_window": config.max_result_window,
        "similarity": {
            "fingerprint_match": { "type": "boolean" }
        }
    });
    if let Some(ref interval) = config.refresh_interval {
        settings["refresh_interval"] = json!(interval);
    }

    let mappings = json!({
        "_meta": { "record_kind": kind.as_str() },
        "dynamic_templates": [
            {
                "metadata_strings": {
                    "match_mapping_type": "string",
                    "mapping": {
                        "type": "keyword",
                        "fields": {
                            "text": { "type": "text" }
                        }
                    }
                }
            }
        ],
        "properties": {
            "structure": { "type": "keyword", "index": false },
            "fingerprint": { "type": "keyword", "similarity": "fingerprint_match" },
            "fingerprint_len": { "type": "integer" },
            "indexed_at": { "type": "date" }
        }
    });

    profile.mapping_body(settings, mappings)
}

/// Creates the index if it does not exist yet.
///
/// Safe to race: a concurrent creator winning is reported by the engine
/// as `resource_already_exists_exception` and treated as success.
pub(crate) async fn ensure_index(
    client: &Elasticsearch,
    config: &RepositoryConfig,
    kind: RecordKind,
    profile: VersionProfile,
) -> RepositoryResult<()> {
    let index = config.index_name.as_str();

    let exists = client
        .indices()
        .exists(IndicesExistsParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| transport_error("ensure_index", config.request_timeout, e))?;
    if exists.status_code().is_success() {
        debug!("index '{index}' already exists");
        return Ok(());
    }

    let response = client
        .indices()
        .create(IndicesCreateParts::Index(index))
        .body(index_body(config, kind, profile))
        .send()
        .await
        .map_err(|e| transport_error("ensure_index", config.request_timeout, e))?;

    let status = response.status_code();
    if status.is_success() {
        info!("created index '{index}' for {kind} records");
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    if body.contains("resource_already_exists_exception") {
        debug!("index '{index}' created concurrently");
        return Ok(());
    }
    Err(RepositoryError::IndexCreation {
        index: index.to_string(),
        message: body,
    })
}

/// Deletes the index and everything in it. Deleting an index that does
/// not exist is a no-op.
pub(crate) async fn delete_index(
    client: &Elasticsearch,
    config: &RepositoryConfig,
) -> RepositoryResult<()> {
    let index = config.index_name.as_str();
    let response = client
        .indices()
        .delete(IndicesDeleteParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| transport_error("delete_index", config.request_timeout, e))?;

    let status = response.status_code();
    if status.is_success() {
        info!("deleted index '{index}'");
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    if body.contains("index_not_found_exception") {
        debug!("index '{index}' already absent");
        return Ok(());
    }
    Err(RepositoryError::Engine {
        operation: "delete_index".to_string(),
        status: Some(status.as_u16()),
        message: body,
    })
}

/// Forces a refresh so documents indexed so far become searchable now
/// instead of on the next periodic refresh.
pub(crate) async fn refresh_index(
    client: &Elasticsearch,
    config: &RepositoryConfig,
) -> RepositoryResult<()> {
    let index = config.index_name.as_str();
    let response = client
        .indices()
        .refresh(IndicesRefreshParts::Index(&[index]))
        .send()
        .await
        .map_err(|e| transport_error("refresh", config.request_timeout, e))?;

    let status = response.status_code();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RepositoryError::Engine {
            operation: "refresh".to_string(),
            status: Some(status.as_u16()),
            message: body,
        });
    }
    debug!("refreshed index '{index}'");
    Ok(())
}
