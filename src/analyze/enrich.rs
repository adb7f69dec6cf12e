//! Concept → instrument enrichment.

use std::collections::BTreeMap;

use crate::model::{Instrument, Judgment};

/// Instruments added per affected concept.
pub const PER_CONCEPT_LIMIT: usize = 5;
/// Upper bound on `related_instruments` after enrichment.
pub const MAX_RELATED: usize = 20;

/// Read-only concept index over the instrument catalog. Codes under each
/// concept are sorted so enrichment is deterministic.
#[derive(Debug, Clone, Default)]
pub struct InstrumentCatalog {
    by_concept: BTreeMap<String, Vec<String>>,
}

impl InstrumentCatalog {
    pub fn new(instruments: &[Instrument]) -> Self {
        let mut by_concept: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for i in instruments {
            for c in &i.concepts {
                by_concept.entry(c.clone()).or_default().push(i.code.clone());
            }
        }
        for codes in by_concept.values_mut() {
            codes.sort();
            codes.dedup();
        }
        Self { by_concept }
    }

    pub fn codes_for(&self, concept: &str) -> &[String] {
        self.by_concept
            .get(concept)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_concept.is_empty()
    }
}

/// Union the declared instruments with up to `PER_CONCEPT_LIMIT` catalog
/// instruments per affected concept. Declared codes come first; the result
/// holds at most `MAX_RELATED` codes.
pub fn enrich(mut judgment: Judgment, catalog: &InstrumentCatalog) -> Judgment {
    let mut related: Vec<String> = Vec::with_capacity(MAX_RELATED);
    let discovered = judgment
        .affected_concepts
        .iter()
        .flat_map(|c| catalog.codes_for(c).iter().take(PER_CONCEPT_LIMIT));

    for code in judgment.related_instruments.iter().chain(discovered) {
        if related.len() == MAX_RELATED {
            break;
        }
        if !related.contains(code) {
            related.push(code.clone());
        }
    }
    judgment.related_instruments = related;
    judgment
}
