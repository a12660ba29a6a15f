//! Blog tag helpers.

/// Human-readable label for a tag name, e.g. `web-development` → `Web Development`.
pub fn tag_label(tag: &str) -> String {
    tag.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
