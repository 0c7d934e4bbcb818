use std::collections::HashMap;

/// Returns true when `tags` satisfies `filter`.
///
/// An empty filter matches everything. Otherwise a single key present in both
/// maps with an equal value is enough: keys are OR-ed, not AND-ed.
pub fn tags_match(filter: &HashMap<String, String>, tags: &HashMap<String, String>) -> bool {
    if filter.is_empty() {
        return true;
    }

    tags.iter()
        .any(|(key, value)| filter.get(key).is_some_and(|wanted| wanted == value))
}
