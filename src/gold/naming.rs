//! Column names for generated indicator columns.

use std::collections::HashSet;

/// Lowercases `value`, replaces every non-alphanumeric run with a single `_` and
/// trims underscores from both ends. An empty result becomes `"unknown"`.
pub fn sanitize_category(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut last_was_underscore = false;

    for c in value.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            result.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    let trimmed = result.trim_matches('_');
    if trimmed.is_empty() {
        "unknown".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// `{prefix}_{sanitized}` for every category, suffixed `_2`, `_3`, ... when two
/// categories sanitize to the same name or clash with a `taken` column name.
/// Names are compared ignoring case, as SQLite does for column names.
pub fn indicator_names<S: AsRef<str>>(
    prefix: &str,
    categories: &[String],
    taken: impl IntoIterator<Item = S>,
) -> Vec<String> {
    let mut seen: HashSet<String> = taken
        .into_iter()
        .map(|name| name.as_ref().to_lowercase())
        .collect();
    categories
        .iter()
        .map(|category| {
            let base = format!("{prefix}_{}", sanitize_category(category));
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.to_lowercase()) {
                n += 1;
                name = format!("{base}_{n}");
            }
            name
        })
        .collect()
}
