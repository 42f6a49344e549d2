use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

/// Fixed namespace for deterministic note ids. Changing it would re-key every
/// previously ingested note.
pub const NOTE_NAMESPACE: Uuid = Uuid::from_u128(0x9f2c_41d6_7a83_4b1e_9c05_d2f8_6e1a_3b7c);

pub const MAX_NOTE_WORDS: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteReject {
	EmptyTitle,
	EmptyContent,
	TooManyWords { words: usize },
}
impl NoteReject {
	pub fn message(&self) -> String {
		match self {
			Self::EmptyTitle => "Note title must be non-empty.".to_string(),
			Self::EmptyContent => "Note content must be non-empty.".to_string(),
			Self::TooManyWords { words } => format!(
				"Note content has {words} words; the limit is {MAX_NOTE_WORDS}."
			),
		}
	}
}

/// Deterministic v5 id over the exact text the note was ingested with, so an
/// identical re-ingest lands on the same note.
pub fn note_id(title: &str, content: &str) -> Uuid {
	Uuid::new_v5(&NOTE_NAMESPACE, format!("{title}\n\n{content}").as_bytes())
}

pub fn word_count(content: &str) -> usize {
	content.unicode_words().count()
}

pub fn validate_note(title: &str, content: &str) -> Result<(), NoteReject> {
	if title.trim().is_empty() {
		return Err(NoteReject::EmptyTitle);
	}
	if content.trim().is_empty() {
		return Err(NoteReject::EmptyContent);
	}

	let words = word_count(content);

	if words > MAX_NOTE_WORDS {
		return Err(NoteReject::TooManyWords { words });
	}

	Ok(())
}
