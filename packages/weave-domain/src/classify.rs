use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupClass {
	New,
	AutoMerge,
	NeedsConfirmation,
}

pub fn clamp_confidence(raw: i64) -> u8 {
	raw.clamp(0, 100) as u8
}

/// Classifies an adjudication outcome. An item takes exactly one path: same
/// with confidence at or above the threshold auto-merges, same below it needs
/// confirmation, anything else is new.
pub fn classify(is_same: bool, confidence: u8, auto_merge_threshold: u8) -> DedupClass {
	if !is_same {
		return DedupClass::New;
	}
	if confidence >= auto_merge_threshold {
		return DedupClass::AutoMerge;
	}

	DedupClass::NeedsConfirmation
}

/// Set union preserving the existing order, with new ids appended in their
/// own order and duplicates skipped.
pub fn union_note_ids(existing: &[Uuid], new: &[Uuid]) -> Vec<Uuid> {
	let mut merged = existing.to_vec();

	for note_id in new {
		if !merged.contains(note_id) {
			merged.push(*note_id);
		}
	}

	merged
}

/// Merged description: the non-empty side wins outright, otherwise the two
/// are joined with `" | "`. Identical descriptions are not doubled.
pub fn merge_descriptions(existing: &str, new: &str) -> String {
	let existing = existing.trim();
	let new = new.trim();

	if existing.is_empty() {
		return new.to_string();
	}
	if new.is_empty() || existing == new {
		return existing.to_string();
	}

	format!("{existing} | {new}")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clamps_confidence_to_percent_range() {
		assert_eq!(clamp_confidence(-5), 0);
		assert_eq!(clamp_confidence(0), 0);
		assert_eq!(clamp_confidence(72), 72);
		assert_eq!(clamp_confidence(100), 100);
		assert_eq!(clamp_confidence(250), 100);
	}

	#[test]
	fn classifies_at_threshold_boundaries() {
		assert_eq!(classify(true, 90, 90), DedupClass::AutoMerge);
		assert_eq!(classify(true, 89, 90), DedupClass::NeedsConfirmation);
		assert_eq!(classify(true, 100, 90), DedupClass::AutoMerge);
		assert_eq!(classify(false, 100, 90), DedupClass::New);
		assert_eq!(classify(false, 0, 90), DedupClass::New);
	}

	#[test]
	fn union_keeps_existing_order_and_appends_new() {
		let a = Uuid::new_v4();
		let b = Uuid::new_v4();
		let c = Uuid::new_v4();
		let merged = union_note_ids(&[a, b], &[b, c, a]);

		assert_eq!(merged, vec![a, b, c]);
	}

	#[test]
	fn union_with_empty_sides() {
		let a = Uuid::new_v4();

		assert_eq!(union_note_ids(&[], &[a]), vec![a]);
		assert_eq!(union_note_ids(&[a], &[]), vec![a]);
	}

	#[test]
	fn merges_descriptions_with_separator() {
		assert_eq!(merge_descriptions("old", "new"), "old | new");
		assert_eq!(merge_descriptions("", "new"), "new");
		assert_eq!(merge_descriptions("old", ""), "old");
		assert_eq!(merge_descriptions("same", "same"), "same");
	}
}
