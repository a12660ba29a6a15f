//! Site URL templates.

use crate::domain::types::Locale;

pub fn page_path(lang: Locale, slug: &str) -> String {
    format!("/{lang}/{slug}")
}

pub fn blog_post_path(lang: Locale, slug: &str) -> String {
    format!("/{lang}/blog/{slug}")
}

pub fn blog_tag_path(lang: Locale, tag: &str) -> String {
    format!("/{lang}/blog/tag/{tag}")
}

pub fn business_idea_path(lang: Locale, slug: &str) -> String {
    format!("/{lang}/business-ideas/{slug}")
}
