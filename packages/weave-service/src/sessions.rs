use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
	time::Duration,
};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{MergeProposal, NewArtifact, NewRelationship};

/// Pending state between a note-ingest response that carried proposals and
/// the client's confirmation call. Intentionally not persistent: a crashed
/// process forfeits pending sessions and the client re-ingests the note.
#[derive(Clone, Debug)]
pub struct PendingDedupSession {
	pub note_id: Uuid,
	pub campaign_uuid: Uuid,
	pub pending_artifacts: Vec<NewArtifact>,
	pub pending_relationships: Vec<NewRelationship>,
	pub proposals: Vec<MergeProposal>,
	pub created_at: OffsetDateTime,
	pub expires_at: OffsetDateTime,
}

#[derive(Clone, Default)]
pub struct SessionStore {
	inner: Arc<RwLock<HashMap<Uuid, PendingDedupSession>>>,
}
impl SessionStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn put(&self, session: PendingDedupSession) {
		let mut sessions = self.inner.write().unwrap_or_else(|err| err.into_inner());

		sessions.insert(session.note_id, session);
	}

	/// An expired session is already gone from the caller's point of view,
	/// whether or not the sweeper has run.
	pub fn get(&self, note_id: Uuid, now: OffsetDateTime) -> Option<PendingDedupSession> {
		let sessions = self.inner.read().unwrap_or_else(|err| err.into_inner());

		sessions.get(&note_id).filter(|session| session.expires_at > now).cloned()
	}

	pub fn remove(&self, note_id: Uuid) -> Option<PendingDedupSession> {
		let mut sessions = self.inner.write().unwrap_or_else(|err| err.into_inner());

		sessions.remove(&note_id)
	}

	pub fn evict_expired(&self, now: OffsetDateTime) -> usize {
		let mut sessions = self.inner.write().unwrap_or_else(|err| err.into_inner());
		let before = sessions.len();

		sessions.retain(|_, session| session.expires_at > now);

		before - sessions.len()
	}

	pub fn len(&self) -> usize {
		self.inner.read().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

pub async fn run_sweeper(store: SessionStore, interval: Duration) {
	loop {
		tokio::time::sleep(interval).await;

		let evicted = store.evict_expired(OffsetDateTime::now_utc());

		if evicted > 0 {
			tracing::info!(count = evicted, "Evicted expired deduplication sessions.");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn session(note_id: Uuid, expires_at: OffsetDateTime) -> PendingDedupSession {
		PendingDedupSession {
			note_id,
			campaign_uuid: Uuid::new_v4(),
			pending_artifacts: vec![],
			pending_relationships: vec![],
			proposals: vec![],
			created_at: expires_at - time::Duration::minutes(15),
			expires_at,
		}
	}

	#[test]
	fn put_get_remove_round_trip() {
		let store = SessionStore::new();
		let note_id = Uuid::new_v4();
		let now = OffsetDateTime::now_utc();

		store.put(session(note_id, now + time::Duration::minutes(15)));

		assert!(store.get(note_id, now).is_some());
		assert!(store.remove(note_id).is_some());
		assert!(store.get(note_id, now).is_none());
	}

	#[test]
	fn expired_sessions_are_invisible_before_eviction() {
		let store = SessionStore::new();
		let note_id = Uuid::new_v4();
		let now = OffsetDateTime::now_utc();

		store.put(session(note_id, now - time::Duration::seconds(1)));

		assert!(store.get(note_id, now).is_none());
		assert_eq!(store.len(), 1);
		assert_eq!(store.evict_expired(now), 1);
		assert!(store.is_empty());
	}

	#[test]
	fn eviction_keeps_live_sessions() {
		let store = SessionStore::new();
		let now = OffsetDateTime::now_utc();
		let live = Uuid::new_v4();
		let dead = Uuid::new_v4();

		store.put(session(live, now + time::Duration::minutes(10)));
		store.put(session(dead, now - time::Duration::minutes(10)));

		assert_eq!(store.evict_expired(now), 1);
		assert!(store.get(live, now).is_some());
	}
}
