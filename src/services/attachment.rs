//! Attachment metadata resolution.
//!
//! Messages reference attachments by id only. The resolver fetches the
//! metadata for a batch of ids concurrently, one request per unique id, and
//! returns whatever resolved. A failed id is logged and left out; it never
//! fails the batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;
use uuid::Uuid;

use crate::api::ChatApi;
use crate::model::AttachmentMeta;

#[derive(Clone)]
pub struct AttachmentResolver {
    api: Arc<dyn ChatApi>,
}

impl AttachmentResolver {
    #[must_use]
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self { api }
    }

    /// Resolve every id in `ids`. Duplicates are fetched once.
    pub async fn resolve(&self, ids: &[Uuid]) -> HashMap<Uuid, AttachmentMeta> {
        let mut seen = HashSet::new();
        let unique: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if unique.is_empty() {
            return HashMap::new();
        }

        let results = join_all(unique.iter().map(|id| self.api.get_attachment(*id))).await;

        let mut resolved = HashMap::with_capacity(unique.len());
        for (id, result) in unique.into_iter().zip(results) {
            match result {
                Ok(meta) => {
                    resolved.insert(id, meta);
                }
                Err(e) => debug!(attachment_id = %id, error = %e, "attachment lookup failed"),
            }
        }
        resolved
    }
}

/// Project resolved metadata onto one message's attachment ids, keeping the
/// message's order and dropping ids that did not resolve.
#[must_use]
pub fn project(ids: &[Uuid], resolved: &HashMap<Uuid, AttachmentMeta>) -> Vec<AttachmentMeta> {
    ids.iter().filter_map(|id| resolved.get(id).cloned()).collect()
}

#[cfg(test)]
#[path = "attachment_test.rs"]
mod tests;
