// src/ingest/providers/mod.rs
pub mod listing;
pub mod rss;
pub mod sina;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::FixedOffset;

use crate::ingest::http::HttpFetcher;
use crate::ingest::types::SourceAdapter;
use crate::model::SourceKind;

pub use listing::{ListingAdapter, ListingPreset};
pub use rss::RssAdapter;
pub use sina::SinaRollAdapter;

/// Maps a source kind to its adapter. Kinds without a dedicated adapter use
/// the generic feed adapter.
#[derive(Clone)]
pub struct AdapterRegistry {
    by_kind: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
    fallback: Arc<dyn SourceAdapter>,
}

impl AdapterRegistry {
    /// Production wiring: Sina roll API, the five listing presets, RSS.
    pub fn standard(fetcher: HttpFetcher, offset: FixedOffset) -> Self {
        let mut by_kind: HashMap<SourceKind, Arc<dyn SourceAdapter>> = HashMap::new();
        by_kind.insert(
            SourceKind::SinaFinance,
            Arc::new(SinaRollAdapter::new(fetcher.clone())),
        );
        for kind in [
            SourceKind::Cnstock,
            SourceKind::Csrc,
            SourceKind::Sse,
            SourceKind::Szse,
            SourceKind::Stats,
        ] {
            if let Some(preset) = ListingPreset::for_kind(kind) {
                by_kind.insert(
                    kind,
                    Arc::new(ListingAdapter::new(fetcher.clone(), preset, offset)),
                );
            }
        }
        Self {
            by_kind,
            fallback: Arc::new(RssAdapter::new(fetcher, offset)),
        }
    }

    /// Every kind served by one adapter. Test wiring.
    pub fn single(adapter: Arc<dyn SourceAdapter>) -> Self {
        Self {
            by_kind: HashMap::new(),
            fallback: adapter,
        }
    }

    pub fn with(mut self, kind: SourceKind, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.by_kind.insert(kind, adapter);
        self
    }

    pub fn for_kind(&self, kind: SourceKind) -> Arc<dyn SourceAdapter> {
        self.by_kind
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}
