use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::storage::SchemaMetadata;

static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:from|join)\s+("(?:[^"]|"")+"|[a-z_][a-z0-9_]*)"#).expect("table reference regex should be valid")
});

/// Tables named after `FROM`/`JOIN` in `sql`, unquoted.
///
/// With a non-empty schema, names are reduced to known tables in their
/// canonical spelling, which drops CTE names and table-valued functions.
pub fn referenced_tables(sql: &str, schema: &SchemaMetadata) -> BTreeSet<String> {
    TABLE_REF
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1))
        .map(|m| unquote(m.as_str()))
        .filter_map(|name| {
            if schema.tables.is_empty() {
                Some(name)
            } else {
                schema.table(&name).map(|t| t.name.clone())
            }
        })
        .collect()
}

/// Sorted, de-duplicated union of referenced tables and document chunk ids.
pub fn citations<'a>(
    sql: Option<&str>,
    doc_ids: impl IntoIterator<Item = &'a str>,
    schema: &SchemaMetadata,
) -> Vec<String> {
    let mut all: BTreeSet<String> = sql.map(|sql| referenced_tables(sql, schema)).unwrap_or_default();
    all.extend(doc_ids.into_iter().map(str::to_string));
    all.into_iter().collect()
}

fn unquote(name: &str) -> String {
    name.strip_prefix('"')
        .and_then(|n| n.strip_suffix('"'))
        .map_or_else(|| name.to_string(), |n| n.replace("\"\"", "\""))
}
