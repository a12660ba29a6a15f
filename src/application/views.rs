//! Derived views composed from cached collections.
//!
//! All builders are pure: identical inputs give identical output.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::application::links;
use crate::domain::entities::{BlogPost, BusinessIdea, Page};
use crate::domain::tags::tag_label;
use crate::domain::types::Locale;

/// A page together with its canonical URL and per-locale alternates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalizedPage {
    #[serde(flatten)]
    pub page: Page,
    pub canonical: String,
    pub languages: BTreeMap<Locale, String>,
}

/// Any domain object paired with its canonical URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Canonical<T> {
    #[serde(flatten)]
    pub item: T,
    pub canonical: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct BlogTag {
    pub name: String,
    pub label: String,
    pub canonical: String,
}

pub fn localize_page(page: &Page) -> LocalizedPage {
    let languages = Locale::ALL
        .iter()
        .map(|locale| (*locale, links::page_path(*locale, &page.slug)))
        .collect();
    LocalizedPage {
        canonical: links::page_path(page.lang, &page.slug),
        languages,
        page: page.clone(),
    }
}

pub fn localize_pages(pages: &[Page]) -> Vec<LocalizedPage> {
    pages.iter().map(localize_page).collect()
}

/// Posts are only published under the default locale's blog.
pub fn canonical_post(post: &BlogPost, default_locale: Locale) -> Canonical<BlogPost> {
    Canonical {
        canonical: links::blog_post_path(default_locale, &post.slug),
        item: post.clone(),
    }
}

pub fn canonical_posts(posts: &[BlogPost], default_locale: Locale) -> Vec<Canonical<BlogPost>> {
    posts
        .iter()
        .map(|post| canonical_post(post, default_locale))
        .collect()
}

/// Ideas are only published under the default locale's listicle.
pub fn canonical_idea(idea: &BusinessIdea, default_locale: Locale) -> Canonical<BusinessIdea> {
    Canonical {
        canonical: links::business_idea_path(default_locale, &idea.slug),
        item: idea.clone(),
    }
}

pub fn canonical_ideas(
    ideas: &[BusinessIdea],
    default_locale: Locale,
) -> Vec<Canonical<BusinessIdea>> {
    ideas
        .iter()
        .map(|idea| canonical_idea(idea, default_locale))
        .collect()
}

/// Union of all post tags, labelled and sorted by name.
pub fn distinct_tags(posts: &[BlogPost], default_locale: Locale) -> Vec<BlogTag> {
    let names: BTreeSet<&str> = posts
        .iter()
        .flat_map(|post| post.tags.iter().map(String::as_str))
        .collect();

    names
        .into_iter()
        .map(|name| BlogTag {
            name: name.to_string(),
            label: tag_label(name),
            canonical: links::blog_tag_path(default_locale, name),
        })
        .collect()
}

/// Posts carrying `tag`, in their original order.
pub fn posts_tagged(posts: &[BlogPost], tag: &str) -> Vec<BlogPost> {
    posts
        .iter()
        .filter(|post| post.tags.contains(tag))
        .cloned()
        .collect()
}
