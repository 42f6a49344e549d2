/// Maps arbitrary text to a graph-safe identifier: characters outside
/// `[A-Za-z0-9_]` become `_`, runs of `_` collapse, and a leading digit gets
/// an underscore prefix. Never returns an empty string.
fn identifier(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	let mut last_was_underscore = false;

	for ch in input.chars() {
		let mapped = if ch.is_ascii_alphanumeric() { ch } else { '_' };

		if mapped == '_' {
			if last_was_underscore {
				continue;
			}

			last_was_underscore = true;
		} else {
			last_was_underscore = false;
		}

		out.push(mapped);
	}

	if out.is_empty() {
		return "_".to_string();
	}
	if out.starts_with(|ch: char| ch.is_ascii_digit()) {
		return format!("_{out}");
	}

	out
}

pub fn label_prefix(input: &str) -> String {
	identifier(input)
}

/// Graph edge type for a relationship label: uppercased identifier.
pub fn edge_type(label: &str) -> String {
	identifier(&label.to_uppercase())
}

/// Artifact types are stored lowercased; anything blank falls back to
/// `unknown`.
pub fn artifact_type(input: &str) -> String {
	let normalised = input.trim().to_lowercase();

	if normalised.is_empty() { "unknown".to_string() } else { normalised }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn label_prefix_replaces_and_collapses() {
		assert_eq!(label_prefix("Curse of Strahd"), "Curse_of_Strahd");
		assert_eq!(label_prefix("a--b  c"), "a_b_c");
		assert_eq!(label_prefix("rats & ruins!"), "rats_ruins_");
	}

	#[test]
	fn label_prefix_never_starts_with_a_digit() {
		assert_eq!(label_prefix("7th Sea"), "_7th_Sea");
	}

	#[test]
	fn label_prefix_never_returns_empty() {
		assert_eq!(label_prefix(""), "_");
		assert_eq!(label_prefix("!!!"), "_");
	}

	#[test]
	fn edge_type_uppercases_verb_phrases() {
		assert_eq!(edge_type("attacked"), "ATTACKED");
		assert_eq!(edge_type("is allied with"), "IS_ALLIED_WITH");
		assert_eq!(edge_type("owes a debt to..."), "OWES_A_DEBT_TO_");
	}

	#[test]
	fn artifact_type_lowercases_and_defaults() {
		assert_eq!(artifact_type("Characters"), "characters");
		assert_eq!(artifact_type("  "), "unknown");
	}
}
