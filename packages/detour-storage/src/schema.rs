use crate::Result;
use detour_domain::validate_sql_identifier;

/// Schema DDL with every table qualified by `schema`.
pub fn render_schema(schema: &str) -> Result<String> {
	validate_sql_identifier("storage.postgres.schema", schema)?;

	let init = include_str!("../../../sql/init.sql");

	Ok(expand_includes(init).replace("<SCHEMA>", schema))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_trace_events.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_trace_events.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
