//! Idempotent entity store shared by concurrent collection passes.
//!
//! Entities are keyed by natural business keys, so collecting the same
//! (or an overlapping) region twice replaces records instead of
//! duplicating them.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use site_forecast_site_models::{
    CollectedSnapshot, DemographicKey, DemographicRecord, ExpansionEvent, ExpansionEventKey,
    Location, LocationKey, Parcel,
};

use crate::{Collector, CollectorError};

/// What an upsert did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Entities seen for the first time.
    pub inserted: usize,
    /// Entities that replaced a stored one.
    pub updated: usize,
}

impl UpsertSummary {
    fn record<K: Ord, V>(&mut self, map: &mut BTreeMap<K, V>, key: K, value: V) {
        if map.insert(key, value).is_some() {
            self.updated += 1;
        } else {
            self.inserted += 1;
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    stores: BTreeMap<LocationKey, Location>,
    competitors: BTreeMap<LocationKey, Location>,
    anchors: BTreeMap<LocationKey, Location>,
    parcels: BTreeMap<LocationKey, Parcel>,
    demographics: BTreeMap<DemographicKey, DemographicRecord>,
    expansion_events: BTreeMap<ExpansionEventKey, ExpansionEvent>,
}

/// In-memory store of collected entities.
#[derive(Debug, Default)]
pub struct EntityStore {
    tables: RwLock<Tables>,
}

impl EntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces every entity of `snapshot`. Later values win.
    pub fn upsert(&self, snapshot: &CollectedSnapshot) -> UpsertSummary {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let mut summary = UpsertSummary::default();

        for store in &snapshot.stores {
            summary.record(&mut tables.stores, store.natural_key(), store.clone());
        }
        for competitor in &snapshot.competitors {
            summary.record(
                &mut tables.competitors,
                competitor.natural_key(),
                competitor.clone(),
            );
        }
        for anchor in &snapshot.anchors {
            summary.record(&mut tables.anchors, anchor.natural_key(), anchor.clone());
        }
        for parcel in &snapshot.parcels {
            summary.record(
                &mut tables.parcels,
                parcel.location.natural_key(),
                parcel.clone(),
            );
        }
        for record in &snapshot.demographics {
            summary.record(&mut tables.demographics, record.natural_key(), record.clone());
        }
        for event in &snapshot.expansion_events {
            summary.record(
                &mut tables.expansion_events,
                event.natural_key(),
                event.clone(),
            );
        }

        summary
    }

    /// Everything stored, in key order.
    #[must_use]
    pub fn snapshot(&self) -> CollectedSnapshot {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        CollectedSnapshot {
            stores: tables.stores.values().cloned().collect(),
            competitors: tables.competitors.values().cloned().collect(),
            demographics: tables.demographics.values().cloned().collect(),
            parcels: tables.parcels.values().cloned().collect(),
            expansion_events: tables.expansion_events.values().cloned().collect(),
            anchors: tables.anchors.values().cloned().collect(),
        }
    }

    /// Total number of stored entities.
    #[must_use]
    pub fn len(&self) -> usize {
        let t = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        t.stores.len()
            + t.competitors.len()
            + t.anchors.len()
            + t.parcels.len()
            + t.demographics.len()
            + t.expansion_events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Wraps a collector and upserts every successful pass into a shared
/// [`EntityStore`].
pub struct StoringCollector<C> {
    inner: C,
    store: Arc<EntityStore>,
}

impl<C: Collector> StoringCollector<C> {
    pub const fn new(inner: C, store: Arc<EntityStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait::async_trait]
impl<C: Collector> Collector for StoringCollector<C> {
    async fn collect(&self, region: &str) -> Result<CollectedSnapshot, CollectorError> {
        let snapshot = self.inner.collect(region).await?;
        let summary = self.store.upsert(&snapshot);
        log::debug!(
            "Stored {region}: {} inserted, {} updated",
            summary.inserted,
            summary.updated
        );
        Ok(snapshot)
    }
}
