//! Record schemas and the record transformer for each domain object.

use tracing::warn;

use crate::application::decode::{
    DecodedRecord, FieldSpec, Invalid, PropertyKind, TITLE_PROPERTY, decode,
};
use crate::application::store::RawRecord;
use crate::domain::entities::{BlogPost, BusinessIdea, Page};

/// A domain object that can be projected from a CMS record.
pub trait Transform: Sized {
    /// Label used in diagnostics.
    const KIND: &'static str;
    const SCHEMA: &'static [FieldSpec];

    /// Build the object from fields that passed [`Self::SCHEMA`].
    fn assemble(fields: DecodedRecord) -> Option<Self>;
}

/// Project `record` into `T`, or log why it was skipped.
pub fn transform<T: Transform>(record: &RawRecord) -> Option<T> {
    let fields = match decode(record, T::SCHEMA) {
        Ok(fields) => fields,
        Err(invalid) => {
            report_invalid(T::KIND, &invalid);
            return None;
        }
    };

    let assembled = T::assemble(fields);
    if assembled.is_none() {
        warn!(
            kind = T::KIND,
            record_id = %record.id,
            "record passed validation but could not be assembled"
        );
    }
    assembled
}

fn report_invalid(kind: &'static str, invalid: &Invalid) {
    warn!(
        kind,
        record_id = %invalid.record_id,
        title = invalid.title.as_deref().unwrap_or_default(),
        error = %invalid,
        "skipping CMS record with invalid properties"
    );
}

impl Transform for Page {
    const KIND: &'static str = "page";
    const SCHEMA: &'static [FieldSpec] = &[
        FieldSpec::required(TITLE_PROPERTY, PropertyKind::Text),
        FieldSpec::required("lang", PropertyKind::Locale),
        FieldSpec::required("slug", PropertyKind::Text),
        FieldSpec::required("description", PropertyKind::Text),
        FieldSpec::required("sitemap-priority", PropertyKind::NonZeroNumber),
        FieldSpec::optional("subtitle", PropertyKind::Text),
    ];

    fn assemble(mut fields: DecodedRecord) -> Option<Self> {
        Some(Page {
            title: fields.take_text(TITLE_PROPERTY)?,
            subtitle: fields.take_text("subtitle"),
            lang: fields.locale("lang")?,
            slug: fields.take_text("slug")?,
            description: fields.take_text("description")?,
            sitemap_priority: fields.number("sitemap-priority")?,
            last_edited: fields.last_edited,
            block_id: fields.id,
        })
    }
}

impl Transform for BlogPost {
    const KIND: &'static str = "blog_post";
    const SCHEMA: &'static [FieldSpec] = &[
        FieldSpec::required(TITLE_PROPERTY, PropertyKind::Text),
        FieldSpec::required("slug", PropertyKind::Text),
        FieldSpec::required("lang", PropertyKind::Locale),
        FieldSpec::required("meta-description", PropertyKind::Text),
        FieldSpec::required("publish-date", PropertyKind::Date),
        FieldSpec::optional("tags", PropertyKind::MultiSelect),
        FieldSpec::optional("og-image", PropertyKind::Url),
    ];

    fn assemble(mut fields: DecodedRecord) -> Option<Self> {
        Some(BlogPost {
            title: fields.take_text(TITLE_PROPERTY)?,
            slug: fields.take_text("slug")?,
            lang: fields.locale("lang")?,
            meta_description: fields.take_text("meta-description")?,
            publish_date: fields.date("publish-date")?,
            tags: fields.take_set("tags"),
            og_image: fields.take_text("og-image"),
            last_edited: fields.last_edited,
            block_id: fields.id,
        })
    }
}

impl Transform for BusinessIdea {
    const KIND: &'static str = "business_idea";
    const SCHEMA: &'static [FieldSpec] = &[
        FieldSpec::required(TITLE_PROPERTY, PropertyKind::Text),
        FieldSpec::required("slug", PropertyKind::Text),
        FieldSpec::required("lang", PropertyKind::Locale),
        FieldSpec::required("description", PropertyKind::Text),
        FieldSpec::optional("subtitle", PropertyKind::Text),
        FieldSpec::optional("position", PropertyKind::Number),
        FieldSpec::optional("og-image", PropertyKind::Url),
    ];

    fn assemble(mut fields: DecodedRecord) -> Option<Self> {
        Some(BusinessIdea {
            title: fields.take_text(TITLE_PROPERTY)?,
            slug: fields.take_text("slug")?,
            lang: fields.locale("lang")?,
            description: fields.take_text("description")?,
            subtitle: fields.take_text("subtitle"),
            position: fields.number("position"),
            og_image: fields.take_text("og-image"),
            last_edited: fields.last_edited,
            block_id: fields.id,
        })
    }
}
