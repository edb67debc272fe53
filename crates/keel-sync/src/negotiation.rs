use std::collections::HashSet;

use tracing::debug;

use keel_types::ObjectId;

use crate::error::SyncResult;
use crate::transport::RemoteTransport;
use crate::types::Negotiation;

/// Transfer negotiation: decide which candidate objects actually need to
/// cross the wire. Content addressing makes this exact — an id the remote
/// holds is byte-identical to ours.
pub struct NegotiationEngine;

impl NegotiationEngine {
    /// Split candidates against the remote's known holdings.
    pub fn split(candidates: &[ObjectId], remote_has: &[ObjectId]) -> Negotiation {
        let held: HashSet<ObjectId> = remote_has.iter().copied().collect();
        let mut wants = Vec::new();
        let mut common = Vec::new();
        let mut seen: HashSet<ObjectId> = HashSet::new();
        for id in candidates {
            if !seen.insert(*id) {
                continue;
            }
            if held.contains(id) {
                common.push(*id);
            } else {
                wants.push(*id);
            }
        }
        Negotiation { wants, common }
    }

    /// Ask the remote which candidates it holds, then split.
    pub async fn negotiate(
        remote: &dyn RemoteTransport,
        candidates: &[ObjectId],
    ) -> SyncResult<Negotiation> {
        let held = remote.has_objects(candidates).await?;
        let negotiation = Self::split(candidates, &held);
        debug!(
            remote = remote.scope_name(),
            wants = negotiation.wants.len(),
            common = negotiation.common.len(),
            "negotiated transfer"
        );
        Ok(negotiation)
    }
}
