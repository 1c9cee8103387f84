//! Engine-version wire profiles.
//!
//! The supported engine releases disagree on mapping envelopes, bulk
//! action lines, total-hits envelopes, and how a query script replaces
//! the relevance score. All of those differences live here as a pure
//! lookup selected once at build time; the operations themselves never
//! branch on the version.

use std::fmt;

use serde_json::{Value, json};

use crate::error::RepositoryError;

/// A supported major release line of the search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineVersion {
    /// The 6.x line, with typed mappings and flat total counts.
    V6,
    /// The 7.x line.
    V7,
    /// The 8.x line.
    V8,
}

impl EngineVersion {
    /// Parses a version tag such as `"8"` or `"7.10.2"` by its major
    /// release.
    pub fn parse(tag: &str) -> Result<Self, RepositoryError> {
        let major = tag.split('.').next().unwrap_or(tag);
        match major.trim() {
            "6" => Ok(EngineVersion::V6),
            "7" => Ok(EngineVersion::V7),
            "8" => Ok(EngineVersion::V8),
            _ => Err(RepositoryError::Config {
                option: "version".to_string(),
                message: format!("unsupported engine version tag '{tag}', expected major 6, 7 or 8"),
            }),
        }
    }

    /// The major release tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineVersion::V6 => "6",
            EngineVersion::V7 => "7",
            EngineVersion::V8 => "8",
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-version wire translation rules.
///
/// Constructed once at repository build time, immutable, and shared
/// read-only by every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProfile {
    version: EngineVersion,
}

impl VersionProfile {
    /// Profile for an engine version.
    pub fn new(version: EngineVersion) -> Self {
        VersionProfile { version }
    }

    /// The engine version this profile translates for.
    pub fn version(&self) -> EngineVersion {
        self.version
    }

    fn typed_mappings(&self) -> bool {
        matches!(self.version, EngineVersion::V6)
    }

    /// Assembles an index-creation body, wrapping the property mappings
    /// in the legacy `_doc` type envelope where the version requires it.
    pub fn mapping_body(&self, settings: Value, mappings: Value) -> Value {
        let mappings = if self.typed_mappings() {
            json!({ "_doc": mappings })
        } else {
            mappings
        };
        json!({ "settings": settings, "mappings": mappings })
    }

    /// The action line preceding one document in a bulk request body.
    pub fn bulk_action(&self, id: Option<&str>) -> Value {
        let mut action = json!({});
        if self.typed_mappings() {
            action["_type"] = json!("_doc");
        }
        if let Some(id) = id {
            action["_id"] = json!(id);
        }
        json!({ "index": action })
    }

    /// Whether search requests may ask for exact total counts.
    pub fn supports_track_total_hits(&self) -> bool {
        !matches!(self.version, EngineVersion::V6)
    }

    /// Reads the total-hits count out of a response's `hits` object,
    /// which is a flat number on 6.x and an object envelope later.
    pub fn parse_total(&self, hits: &Value) -> Option<u64> {
        match self.version {
            EngineVersion::V6 => hits.get("total").and_then(Value::as_u64),
            _ => hits
                .get("total")
                .and_then(|total| total.get("value"))
                .and_then(Value::as_u64),
        }
    }

    /// Wraps a query in the version's score-replacing script construct.
    pub fn script_score_query(&self, query: Value, script: &str, params: Value) -> Value {
        match self.version {
            EngineVersion::V6 => json!({
                "function_score": {
                    "query": query,
                    "script_score": {
                        "script": { "source": script, "params": params }
                    },
                    "boost_mode": "replace"
                }
            }),
            _ => json!({
                "script_score": {
                    "query": query,
                    "script": { "source": script, "params": params }
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_resolve_by_major_release() {
        assert_eq!(EngineVersion::parse("6").unwrap(), EngineVersion::V6);
        assert_eq!(EngineVersion::parse("7.10.2").unwrap(), EngineVersion::V7);
        assert_eq!(EngineVersion::parse("8.11.0").unwrap(), EngineVersion::V8);
    }

    #[test]
    fn unknown_tags_are_a_configuration_error() {
        let err = EngineVersion::parse("5.6").unwrap_err();
        assert!(matches!(err, RepositoryError::Config { ref option, .. } if option == "version"));
    }

    #[test]
    fn v6_wraps_mappings_in_the_doc_type() {
        let profile = VersionProfile::new(EngineVersion::V6);
        let body = profile.mapping_body(json!({}), json!({"properties": {}}));
        assert!(body["mappings"]["_doc"]["properties"].is_object());

        let profile = VersionProfile::new(EngineVersion::V8);
        let body = profile.mapping_body(json!({}), json!({"properties": {}}));
        assert!(body["mappings"]["properties"].is_object());
        assert!(body["mappings"].get("_doc").is_none());
    }

    #[test]
    fn bulk_action_carries_type_only_on_v6() {
        let v6 = VersionProfile::new(EngineVersion::V6).bulk_action(Some("mol-1"));
        assert_eq!(v6["index"]["_type"], "_doc");
        assert_eq!(v6["index"]["_id"], "mol-1");

        let v8 = VersionProfile::new(EngineVersion::V8).bulk_action(None);
        assert!(v8["index"].get("_type").is_none());
        assert!(v8["index"].get("_id").is_none());
    }

    #[test]
    fn totals_parse_from_both_envelopes() {
        let flat = json!({"total": 42});
        let object = json!({"total": {"value": 42, "relation": "eq"}});
        assert_eq!(VersionProfile::new(EngineVersion::V6).parse_total(&flat), Some(42));
        assert_eq!(VersionProfile::new(EngineVersion::V7).parse_total(&object), Some(42));
        assert_eq!(VersionProfile::new(EngineVersion::V6).parse_total(&object), None);
    }

    #[test]
    fn exact_totals_are_post_v6() {
        assert!(!VersionProfile::new(EngineVersion::V6).supports_track_total_hits());
        assert!(VersionProfile::new(EngineVersion::V7).supports_track_total_hits());
        assert!(VersionProfile::new(EngineVersion::V8).supports_track_total_hits());
    }

    #[test]
    fn scoring_uses_function_score_on_v6_and_script_score_later() {
        let inner = json!({"match_all": {}});
        let params = json!({"qlen": 5});

        let v6 = VersionProfile::new(EngineVersion::V6)
            .script_score_query(inner.clone(), "_score", params.clone());
        assert!(v6["function_score"]["script_score"]["script"]["source"].is_string());
        assert_eq!(v6["function_score"]["boost_mode"], "replace");

        let v8 = VersionProfile::new(EngineVersion::V8).script_score_query(inner, "_score", params);
        assert!(v8["script_score"]["script"]["source"].is_string());
        assert_eq!(v8["script_score"]["script"]["params"]["qlen"], 5);
    }
}
