//! Query descriptors and the descriptor builder.
//!
//! `map_queries` is a pure function from `{own props, state, dispatch}` to a
//! mapping of key → draft entry. It runs on every qualifying input change
//! and owes no referential stability: the binding manager compares the
//! validated descriptors structurally, never by reference.
//!
//! Equivalence rules: documents compare by identity, variables by deep value
//! equality, poll intervals by value. Full equivalence means no
//! reconciliation action at all; matching `same_query` with a different poll
//! interval means a polling retune on the live binding.

use indexmap::IndexMap;

use crate::client::{QueryDocument, Variables};
use crate::error::QueryError;

/// Draft entry produced by `map_queries`.
///
/// The document is optional so malformed entries are expressible; validation
/// turns a missing document into a descriptor error scoped to that key.
#[derive(Clone, Debug, Default)]
pub struct QuerySpec {
    pub document: Option<QueryDocument>,
    pub variables: Variables,
    pub poll_interval_ms: Option<u64>,
}

impl QuerySpec {
    pub fn query(document: QueryDocument) -> Self {
        Self {
            document: Some(document),
            ..Self::default()
        }
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = Some(poll_interval_ms);
        self
    }
}

/// Mapping returned by `map_queries`, in declaration order.
pub type SpecMap = IndexMap<String, QuerySpec>;

/// Validated descriptor for one query key.
#[derive(Clone, Debug)]
pub struct QueryDescriptor {
    pub document: QueryDocument,
    pub variables: Variables,
    pub poll_interval_ms: Option<u64>,
}

impl QueryDescriptor {
    /// Request identity: document identity plus deep-equal variables.
    pub fn same_query(&self, other: &QueryDescriptor) -> bool {
        self.document.same_document(&other.document) && self.variables == other.variables
    }

    /// Full equivalence: request identity plus equal polling.
    pub fn equivalent(&self, other: &QueryDescriptor) -> bool {
        self.same_query(other) && self.poll_interval_ms == other.poll_interval_ms
    }
}

/// Per-key validation outcome handed to the binding manager.
pub type DescriptorMap = IndexMap<String, Result<QueryDescriptor, QueryError>>;

/// Validate one draft entry.
pub fn validate(key: &str, spec: &QuerySpec) -> Result<QueryDescriptor, QueryError> {
    match &spec.document {
        Some(document) => Ok(QueryDescriptor {
            document: document.clone(),
            variables: spec.variables.clone(),
            poll_interval_ms: spec.poll_interval_ms,
        }),
        None => Err(QueryError::Descriptor {
            key: key.to_string(),
            reason: "missing query document".into(),
        }),
    }
}

/// Validate every entry of a spec map, preserving key order.
pub fn validate_specs(specs: &SpecMap) -> DescriptorMap {
    specs
        .iter()
        .map(|(key, spec)| (key.clone(), validate(key, spec)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::variables;
    use serde_json::json;

    fn doc() -> QueryDocument {
        QueryDocument::new("query people { allPeople { name } }")
    }

    #[test]
    fn equivalence_requires_document_identity() {
        let shared = doc();
        let a = validate("people", &QuerySpec::query(shared.clone())).unwrap();
        let b = validate("people", &QuerySpec::query(shared)).unwrap();
        assert!(a.equivalent(&b));

        // Same source text, different identity.
        let c = validate("people", &QuerySpec::query(doc())).unwrap();
        assert!(!a.equivalent(&c));
    }

    #[test]
    fn equivalence_compares_variables_deeply() {
        let shared = doc();
        let a = validate(
            "people",
            &QuerySpec::query(shared.clone()).with_variables(variables(json!({ "count": 1 }))),
        )
        .unwrap();
        let b = validate(
            "people",
            &QuerySpec::query(shared.clone()).with_variables(variables(json!({ "count": 1 }))),
        )
        .unwrap();
        let c = validate(
            "people",
            &QuerySpec::query(shared).with_variables(variables(json!({ "count": 2 }))),
        )
        .unwrap();

        assert!(a.equivalent(&b));
        assert!(!a.equivalent(&c));
        assert!(!a.same_query(&c));
    }

    #[test]
    fn poll_interval_breaks_equivalence_but_not_query_identity() {
        let shared = doc();
        let plain = validate("people", &QuerySpec::query(shared.clone())).unwrap();
        let polled =
            validate("people", &QuerySpec::query(shared).with_poll_interval(75)).unwrap();

        assert!(plain.same_query(&polled));
        assert!(!plain.equivalent(&polled));
    }

    #[test]
    fn missing_document_is_a_descriptor_error() {
        let result = validate("bad", &QuerySpec::default());
        assert_eq!(
            result.unwrap_err(),
            QueryError::Descriptor {
                key: "bad".into(),
                reason: "missing query document".into(),
            }
        );
    }

    #[test]
    fn validate_specs_preserves_order_and_scopes_errors() {
        let mut specs = SpecMap::new();
        specs.insert("bad".into(), QuerySpec::default());
        specs.insert("good".into(), QuerySpec::query(doc()));

        let descriptors = validate_specs(&specs);
        let keys: Vec<_> = descriptors.keys().cloned().collect();
        assert_eq!(keys, vec!["bad", "good"]);
        assert!(descriptors["bad"].is_err());
        assert!(descriptors["good"].is_ok());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn variable_value() -> impl Strategy<Value = serde_json::Value> {
            prop_oneof![
                any::<i64>().prop_map(|n| json!(n)),
                any::<bool>().prop_map(|b| json!(b)),
                "[a-z]{0,8}".prop_map(|s| json!(s)),
            ]
        }

        fn variable_map() -> impl Strategy<Value = Variables> {
            proptest::collection::btree_map("[a-z]{1,6}", variable_value(), 0..4).prop_map(|map| {
                map.into_iter().collect::<Variables>()
            })
        }

        proptest! {
            #[test]
            fn equivalence_is_reflexive(vars in variable_map(), poll in proptest::option::of(1u64..1000)) {
                let spec = QuerySpec {
                    document: Some(QueryDocument::new("query q { f }")),
                    variables: vars,
                    poll_interval_ms: poll,
                };
                let descriptor = validate("k", &spec).unwrap();
                prop_assert!(descriptor.equivalent(&descriptor.clone()));
            }

            #[test]
            fn clones_of_one_validation_stay_equivalent(vars in variable_map()) {
                let spec = QuerySpec {
                    document: Some(QueryDocument::new("query q { f }")),
                    variables: vars,
                    poll_interval_ms: None,
                };
                let a = validate("k", &spec).unwrap();
                let b = validate("k", &spec).unwrap();
                // Same draft entry, same document handle: structurally equivalent.
                prop_assert!(a.equivalent(&b));
            }
        }
    }
}
