//! Outstanding resident dues, as seen by the matcher.
//!
//! The ledger that computes what is outstanding lives elsewhere; this crate
//! only reads from it through [`CandidateReceivableSource`].

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::models::{CandidateReceivable, Id};

#[async_trait::async_trait]
pub trait CandidateReceivableSource: Send + Sync {
    /// Dues with a pending amount for the property, in no particular order.
    async fn list_outstanding_dues(&self, property_id: &Id) -> Result<Vec<CandidateReceivable>>;
}

/// One entry of a `dues.json` export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueRecord {
    pub property_id: Id,
    #[serde(flatten)]
    pub receivable: CandidateReceivable,
}

/// Receivables held in memory, optionally loaded from a `dues.json` export.
#[derive(Default)]
pub struct StaticReceivables {
    by_property: RwLock<HashMap<Id, Vec<CandidateReceivable>>>,
}

impl StaticReceivables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dues(
        mut self,
        property_id: &Id,
        dues: impl IntoIterator<Item = CandidateReceivable>,
    ) -> Self {
        self.by_property
            .get_mut()
            .entry(property_id.clone())
            .or_default()
            .extend(dues);
        self
    }

    /// Load `[{ "property_id": ..., "due_id": ..., ... }, ...]`. A missing
    /// file means no outstanding dues.
    pub async fn load(path: &Path) -> Result<Self> {
        let records: Vec<DueRecord> = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse dues file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read dues file {}", path.display()))
            }
        };

        let mut by_property: HashMap<Id, Vec<CandidateReceivable>> = HashMap::new();
        for record in records {
            by_property
                .entry(record.property_id)
                .or_default()
                .push(record.receivable);
        }
        Ok(Self {
            by_property: RwLock::new(by_property),
        })
    }

    /// Replace the outstanding dues for a property.
    pub async fn set_dues(&self, property_id: &Id, dues: Vec<CandidateReceivable>) {
        self.by_property
            .write()
            .await
            .insert(property_id.clone(), dues);
    }
}

#[async_trait::async_trait]
impl CandidateReceivableSource for StaticReceivables {
    async fn list_outstanding_dues(&self, property_id: &Id) -> Result<Vec<CandidateReceivable>> {
        Ok(self
            .by_property
            .read()
            .await
            .get(property_id)
            .cloned()
            .unwrap_or_default())
    }
}
