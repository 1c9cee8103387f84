//! Search criteria and their translation into engine query bodies.
//!
//! Structure matching rides on the fingerprint screen: a substructure
//! candidate must carry every query bit, so the screen is one `term`
//! filter per bit. Similarity turns the same bits into `should`
//! clauses over the boolean-similarity field, making `_score` the
//! number of shared bits, which a small script then normalizes into
//! the requested metric.

use serde_json::{Value, json};

use bingo_model::{Fingerprint, MetaValue, RecordKind, default_toolkit};

use crate::codec::meta_to_json;
use crate::error::{RepositoryError, RepositoryResult};
use crate::version::VersionProfile;

const TANIMOTO_SCRIPT: &str =
    "_score / (params.qlen + doc['fingerprint_len'].value - _score)";
const TVERSKY_SCRIPT: &str = "_score / ((params.qlen - _score) * params.alpha \
     + (doc['fingerprint_len'].value - _score) * params.beta + _score)";
const EUCLID_SCRIPT: &str = "_score / params.qlen";

/// How similarity between two fingerprints is scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimilarityMetric {
    /// Shared bits over the union of bits.
    Tanimoto,
    /// Asymmetric overlap; `alpha` weights query-only bits, `beta`
    /// weights target-only bits.
    Tversky {
        /// Weight of bits only the query has.
        alpha: f64,
        /// Weight of bits only the target has.
        beta: f64,
    },
    /// Shared bits over the query's bits.
    Euclid,
}

impl SimilarityMetric {
    fn script(&self) -> &'static str {
        match self {
            SimilarityMetric::Tanimoto => TANIMOTO_SCRIPT,
            SimilarityMetric::Tversky { .. } => TVERSKY_SCRIPT,
            SimilarityMetric::Euclid => EUCLID_SCRIPT,
        }
    }

    fn params(&self, query_len: usize) -> Value {
        match self {
            SimilarityMetric::Tversky { alpha, beta } => {
                json!({ "qlen": query_len, "alpha": alpha, "beta": beta })
            }
            _ => json!({ "qlen": query_len }),
        }
    }
}

/// A filter over one flattened metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaFilter {
    /// Exact match against the keyword value.
    Term {
        /// Metadata field name.
        field: String,
        /// Value the field must equal.
        value: MetaValue,
    },
    /// Full-text match against the field's `.text` subfield.
    Text {
        /// Metadata field name.
        field: String,
        /// Analyzed query string.
        query: String,
    },
}

/// The structure clause of a search.
#[derive(Debug, Clone, PartialEq)]
pub enum StructureQuery {
    /// Records whose payload is exactly this structure.
    Exact(String),
    /// Records containing this structure as a fragment.
    Substructure(String),
    /// Records similar to this structure, scored by `metric` and cut
    /// at `min_score`.
    Similarity {
        /// Query structure payload.
        structure: String,
        /// Scoring metric.
        metric: SimilarityMetric,
        /// Lowest score, in `[0, 1]`, still returned.
        min_score: f64,
    },
}

/// What to search for: an optional structure clause, metadata filters,
/// and a result cap.
///
/// ```
/// use bingo_elastic::{SearchCriteria, SimilarityMetric};
///
/// let substructure = SearchCriteria::substructure("c1ccccc1")
///     .with_term("source", "chembl")
///     .with_limit(50);
/// let similar = SearchCriteria::similarity("CCO", SimilarityMetric::Tanimoto, 0.7);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCriteria {
    structure: Option<StructureQuery>,
    filters: Vec<MetaFilter>,
    limit: Option<usize>,
}

impl SearchCriteria {
    /// Matches every record in the index.
    pub fn all() -> Self {
        SearchCriteria::default()
    }

    /// Matches records whose structure payload equals `structure`.
    pub fn exact(structure: impl Into<String>) -> Self {
        SearchCriteria {
            structure: Some(StructureQuery::Exact(structure.into())),
            ..SearchCriteria::default()
        }
    }

    /// Matches records containing `structure` as a substructure.
    pub fn substructure(structure: impl Into<String>) -> Self {
        SearchCriteria {
            structure: Some(StructureQuery::Substructure(structure.into())),
            ..SearchCriteria::default()
        }
    }

    /// Matches records at least `min_score` similar to `structure`
    /// under the given metric, most similar first.
    pub fn similarity(
        structure: impl Into<String>,
        metric: SimilarityMetric,
        min_score: f64,
    ) -> Self {
        SearchCriteria {
            structure: Some(StructureQuery::Similarity {
                structure: structure.into(),
                metric,
                min_score,
            }),
            ..SearchCriteria::default()
        }
    }

    /// Adds an exact-value filter on a metadata field.
    pub fn with_term(mut self, field: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.filters.push(MetaFilter::Term {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a full-text filter on a metadata field.
    pub fn with_text(mut self, field: impl Into<String>, query: impl Into<String>) -> Self {
        self.filters.push(MetaFilter::Text {
            field: field.into(),
            query: query.into(),
        });
        self
    }

    /// Caps the number of records the cursor yields.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug)]
enum CompiledStructure {
    Exact {
        structure: String,
        fingerprint: Fingerprint,
    },
    Substructure {
        fingerprint: Fingerprint,
    },
    Similarity {
        fingerprint: Fingerprint,
        metric: SimilarityMetric,
        min_score: f64,
    },
}

/// A criteria validated against a record kind, with the query
/// fingerprint computed once up front so paging does not recompute it.
#[derive(Debug)]
pub(crate) struct CompiledQuery {
    structure: Option<CompiledStructure>,
    filters: Vec<MetaFilter>,
    limit: Option<usize>,
}

impl CompiledQuery {
    pub(crate) fn compile(criteria: SearchCriteria, kind: RecordKind) -> RepositoryResult<Self> {
        let toolkit = default_toolkit();
        let structure = match criteria.structure {
            None => None,
            Some(StructureQuery::Exact(structure)) => {
                toolkit.validate(&structure, kind)?;
                let fingerprint = toolkit.compute_fingerprint(&structure, kind);
                Some(CompiledStructure::Exact {
                    structure,
                    fingerprint,
                })
            }
            Some(StructureQuery::Substructure(structure)) => {
                toolkit.validate(&structure, kind)?;
                let fingerprint = toolkit.compute_fingerprint(&structure, kind);
                Some(CompiledStructure::Substructure { fingerprint })
            }
            Some(StructureQuery::Similarity {
                structure,
                metric,
                min_score,
            }) => {
                toolkit.validate(&structure, kind)?;
                if !min_score.is_finite() || !(0.0..=1.0).contains(&min_score) {
                    return Err(criteria_error(
                        "minScore",
                        format!("must be within [0, 1], got {min_score}"),
                    ));
                }
                if let SimilarityMetric::Tversky { alpha, beta } = metric {
                    if !alpha.is_finite() || alpha < 0.0 {
                        return Err(criteria_error("alpha", "must be a non-negative number"));
                    }
                    if !beta.is_finite() || beta < 0.0 {
                        return Err(criteria_error("beta", "must be a non-negative number"));
                    }
                }
                let fingerprint = toolkit.compute_fingerprint(&structure, kind);
                if fingerprint.is_empty() {
                    return Err(criteria_error(
                        "structure",
                        "query structure has an empty fingerprint, nothing to score",
                    ));
                }
                Some(CompiledStructure::Similarity {
                    fingerprint,
                    metric,
                    min_score,
                })
            }
        };
        Ok(CompiledQuery {
            structure,
            filters: criteria.filters,
            limit: criteria.limit,
        })
    }

    pub(crate) fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Exact matches re-check the payload while streaming, since two
    /// distinct payloads can share a fingerprint.
    pub(crate) fn exact_structure(&self) -> Option<&str> {
        match &self.structure {
            Some(CompiledStructure::Exact { structure, .. }) => Some(structure),
            _ => None,
        }
    }

    fn is_scored(&self) -> bool {
        matches!(&self.structure, Some(CompiledStructure::Similarity { .. }))
    }

    /// One page of the search, as the engine body for `from`/`size`.
    pub(crate) fn page_body(&self, profile: VersionProfile, from: u32, size: u32) -> Value {
        let mut filter = Vec::new();
        for meta in &self.filters {
            filter.push(match meta {
                MetaFilter::Term { field, value } => {
                    json!({ "term": { field.as_str(): meta_to_json(value) } })
                }
                MetaFilter::Text { field, query } => {
                    json!({ "match": { format!("{field}.text"): query.as_str() } })
                }
            });
        }

        let (query, min_score) = match &self.structure {
            Some(CompiledStructure::Similarity {
                fingerprint,
                metric,
                min_score,
            }) => {
                let should: Vec<Value> = fingerprint
                    .bits()
                    .iter()
                    .map(|bit| json!({ "term": { "fingerprint": bit.to_string() } }))
                    .collect();
                let mut inner = json!({
                    "bool": {
                        "should": should,
                        "minimum_should_match": 1
                    }
                });
                if !filter.is_empty() {
                    inner["bool"]["filter"] = json!(filter);
                }
                let scored = profile.script_score_query(
                    inner,
                    metric.script(),
                    metric.params(fingerprint.len()),
                );
                (scored, Some(*min_score))
            }
            other => {
                match other {
                    Some(CompiledStructure::Exact {
                        fingerprint,
                        ..
                    }) => {
                        screen_bits(fingerprint, &mut filter);
                        filter.push(json!({ "term": { "fingerprint_len": fingerprint.len() } }));
                    }
                    Some(CompiledStructure::Substructure { fingerprint }) => {
                        screen_bits(fingerprint, &mut filter);
                    }
                    _ => {}
                }
                let query = if filter.is_empty() {
                    json!({ "match_all": {} })
                } else {
                    json!({ "bool": { "filter": filter } })
                };
                (query, None)
            }
        };

        let mut body = json!({
            "query": query,
            "from": from,
            "size": size,
        });
        body["sort"] = if self.is_scored() {
            json!([
                { "_score": { "order": "desc" } },
                { "_doc": { "order": "asc" } }
            ])
        } else {
            json!([{ "_doc": { "order": "asc" } }])
        };
        if let Some(min_score) = min_score {
            body["min_score"] = json!(min_score);
        }
        if profile.supports_track_total_hits() {
            body["track_total_hits"] = json!(true);
        }
        body
    }
}

fn screen_bits(fingerprint: &Fingerprint, filter: &mut Vec<Value>) {
    for bit in fingerprint.bits() {
        filter.push(json!({ "term": { "fingerprint": bit.to_string() } }));
    }
}

fn criteria_error(option: &str, message: impl Into<String>) -> RepositoryError {
    RepositoryError::Config {
        option: option.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::EngineVersion;

    fn compiled(criteria: SearchCriteria) -> CompiledQuery {
        CompiledQuery::compile(criteria, RecordKind::Molecule).unwrap()
    }

    fn v8() -> VersionProfile {
        VersionProfile::new(EngineVersion::V8)
    }

    #[test]
    fn substructure_screens_term_per_bit() {
        let fingerprint = default_toolkit().compute_fingerprint("CCO", RecordKind::Molecule);
        let body = compiled(SearchCriteria::substructure("CCO")).page_body(v8(), 0, 10);

        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter.len(), fingerprint.len());
        assert!(filter.iter().all(|c| c["term"]["fingerprint"].is_string()));
        assert_eq!(body["sort"][0]["_doc"]["order"], "asc");
        assert_eq!(body["track_total_hits"], true);
        assert!(body.get("min_score").is_none());
    }

    #[test]
    fn exact_adds_the_length_pin() {
        let fingerprint = default_toolkit().compute_fingerprint("CCO", RecordKind::Molecule);
        let query = compiled(SearchCriteria::exact("CCO"));
        let body = query.page_body(v8(), 0, 10);

        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter.len(), fingerprint.len() + 1);
        assert!(
            filter
                .iter()
                .any(|c| c["term"]["fingerprint_len"] == fingerprint.len())
        );
        assert_eq!(query.exact_structure(), Some("CCO"));
    }

    #[test]
    fn similarity_scores_shared_bits() {
        let fingerprint = default_toolkit().compute_fingerprint("CCO", RecordKind::Molecule);
        let body = compiled(SearchCriteria::similarity(
            "CCO",
            SimilarityMetric::Tanimoto,
            0.7,
        ))
        .page_body(v8(), 0, 10);

        let script_score = &body["query"]["script_score"];
        let should = script_score["query"]["bool"]["should"].as_array().unwrap();
        assert_eq!(should.len(), fingerprint.len());
        assert_eq!(script_score["query"]["bool"]["minimum_should_match"], 1);
        assert_eq!(script_score["script"]["source"], TANIMOTO_SCRIPT);
        assert_eq!(script_score["script"]["params"]["qlen"], fingerprint.len());
        assert_eq!(body["min_score"], 0.7);
        assert_eq!(body["sort"][0]["_score"]["order"], "desc");
    }

    #[test]
    fn similarity_on_v6_goes_through_function_score() {
        let body = compiled(SearchCriteria::similarity(
            "CCO",
            SimilarityMetric::Euclid,
            0.5,
        ))
        .page_body(VersionProfile::new(EngineVersion::V6), 0, 10);

        assert!(body["query"]["function_score"]["script_score"].is_object());
        assert_eq!(body["query"]["function_score"]["boost_mode"], "replace");
        assert!(body.get("track_total_hits").is_none());
    }

    #[test]
    fn tversky_params_carry_both_weights() {
        let metric = SimilarityMetric::Tversky {
            alpha: 0.9,
            beta: 0.1,
        };
        let body =
            compiled(SearchCriteria::similarity("CCO", metric, 0.4)).page_body(v8(), 0, 10);
        let params = &body["query"]["script_score"]["script"]["params"];
        assert_eq!(params["alpha"], 0.9);
        assert_eq!(params["beta"], 0.1);
    }

    #[test]
    fn metadata_filters_translate_to_term_and_match() {
        let body = compiled(
            SearchCriteria::all()
                .with_term("source", "chembl")
                .with_term("rings", 2)
                .with_text("name", "ethyl alcohol"),
        )
        .page_body(v8(), 0, 10);

        let filter = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filter[0]["term"]["source"], "chembl");
        assert_eq!(filter[1]["term"]["rings"], 2);
        assert_eq!(filter[2]["match"]["name.text"], "ethyl alcohol");
    }

    #[test]
    fn similarity_keeps_filters_outside_the_score() {
        let body = compiled(
            SearchCriteria::similarity("CCO", SimilarityMetric::Tanimoto, 0.3)
                .with_term("source", "chembl"),
        )
        .page_body(v8(), 0, 10);

        let bool_query = &body["query"]["script_score"]["query"]["bool"];
        assert_eq!(bool_query["filter"][0]["term"]["source"], "chembl");
        assert!(bool_query["should"].as_array().is_some());
    }

    #[test]
    fn empty_criteria_match_all() {
        let body = compiled(SearchCriteria::all()).page_body(v8(), 20, 10);
        assert!(body["query"]["match_all"].is_object());
        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
    }

    #[test]
    fn malformed_query_structures_are_rejected() {
        let err = CompiledQuery::compile(
            SearchCriteria::substructure("C1(CC"),
            RecordKind::Molecule,
        )
        .unwrap_err();
        assert!(matches!(err, RepositoryError::Encoding { .. }));
    }

    #[test]
    fn out_of_range_similarity_cutoffs_are_rejected() {
        for bad in [-0.1, 1.5, f64::NAN] {
            let err = CompiledQuery::compile(
                SearchCriteria::similarity("CCO", SimilarityMetric::Tanimoto, bad),
                RecordKind::Molecule,
            )
            .unwrap_err();
            assert!(
                matches!(err, RepositoryError::Config { ref option, .. } if option == "minScore")
            );
        }

        let err = CompiledQuery::compile(
            SearchCriteria::similarity(
                "CCO",
                SimilarityMetric::Tversky {
                    alpha: -1.0,
                    beta: 0.5,
                },
                0.5,
            ),
            RecordKind::Molecule,
        )
        .unwrap_err();
        assert!(matches!(err, RepositoryError::Config { ref option, .. } if option == "alpha"));
    }

    #[test]
    fn reaction_criteria_validate_against_reaction_rules() {
        assert!(CompiledQuery::compile(
            SearchCriteria::substructure("CCO>>CC"),
            RecordKind::Reaction
        )
        .is_ok());
        assert!(CompiledQuery::compile(
            SearchCriteria::substructure("CCO"),
            RecordKind::Reaction
        )
        .is_err());
    }
}
