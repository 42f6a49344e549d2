pub fn render_schema() -> &'static str {
	include_str!("../../../sql/init.sql")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_contains_both_graph_tables() {
		let sql = render_schema();

		assert!(sql.contains("graph_artifacts"));
		assert!(sql.contains("graph_relationships"));
		assert!(sql.contains("graph_relationships_merge_key"));
	}
}
