//! Topic pages.
//!
//! Sources list their topics in a `topics` field, e.g. `topics: Go, Rust`.
//! The extension normalizes that field into a set, gives every distinct
//! topic its own page under `/topics/{slug}/`, and adds a `/topics/`
//! listing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::Result;
use crate::extension::{ContentExtension, LoadContext, Registrar};
use crate::generator::{ClassGenerator, PageSet, merge_pages};
use crate::meta::{Meta, MetaProcessor, MetaValue};
use crate::page::{PageArgs, PageClass};

pub const TOPIC: PageClass = PageClass {
    name: "TopicPage",
    content_type: "topic",
    template: "topic.html",
    rules: &["/topics/{slug}/"],
    listing_slug: None,
};

pub const TOPIC_LISTING: PageClass = PageClass {
    name: "TopicListingPage",
    content_type: "topic",
    template: "topics.html",
    rules: &["/topics/"],
    listing_slug: Some("topics"),
};

pub const TOPICS_FIELD: &str = "topics";

/// Slug for a topic name: lowercased, spaces as dashes.
pub fn topic_slug(topic: &str) -> String {
    topic.to_lowercase().replace(' ', "-")
}

/// Splits comma separated topics into a set of trimmed names.
pub struct TopicMetaProcessor {
    extension: Option<String>,
    diagnostics: Diagnostics,
}

impl TopicMetaProcessor {
    pub fn new(extension: Option<String>, diagnostics: Diagnostics) -> Self {
        Self {
            extension,
            diagnostics,
        }
    }

    /// Pairs of topics that differ only by case.
    pub fn case_duplicates(topics: &BTreeSet<String>) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (i, topic) in topics.iter().enumerate() {
            for other in topics.iter().skip(i + 1) {
                if topic.to_lowercase() == other.to_lowercase() {
                    pairs.push((topic.clone(), other.clone()));
                }
            }
        }
        pairs
    }
}

impl MetaProcessor for TopicMetaProcessor {
    fn name(&self) -> &str {
        "TopicMetaProcessor"
    }

    fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    fn process(&self, data: &[String]) -> Result<MetaValue> {
        let joined = data.join(",");
        let topics: BTreeSet<String> = joined
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        for (topic, other) in Self::case_duplicates(&topics) {
            self.diagnostics
                .warn(Warning::CaseDuplicateTopic { topic, other });
        }
        self.diagnostics
            .in_scope(|| tracing::debug!(?data, ?topics, "processed topics"));

        Ok(MetaValue::Set(topics))
    }
}

/// A topic discovered while observing pages.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Topic {
    #[serde(rename = "type")]
    pub content_type: String,
    pub slug: String,
    pub title: String,
    pub publish: String,
    pub set: String,
}

pub struct TopicExtension {
    name: String,
    topics: BTreeMap<String, Topic>,
    publish: String,
    diagnostics: Diagnostics,
}

impl Default for TopicExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicExtension {
    pub const NAME: &'static str = "topic_extension";

    pub fn new() -> Self {
        Self::named(Self::NAME)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topics: BTreeMap::new(),
            publish: String::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn topics(&self) -> &BTreeMap<String, Topic> {
        &self.topics
    }
}

impl ContentExtension for TopicExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, diagnostics: &Diagnostics) {
        self.topics.clear();
        self.publish = chrono::Utc::now().to_rfc2822();
        self.diagnostics = diagnostics.clone();
    }

    fn register(&mut self, registrar: &mut Registrar<'_>) -> Result<()> {
        let name = registrar.extension().to_string();
        self.diagnostics = registrar.diagnostics().clone();

        let processor = TopicMetaProcessor::new(
            Some(name.clone()),
            registrar.diagnostics().child("meta_processor", TOPICS_FIELD),
        );
        registrar.add_meta_processor(TOPICS_FIELD, Box::new(processor))?;
        registrar.add_local_generator("topic", Box::new(ClassGenerator::for_extension(TOPIC, &name)))?;
        registrar.add_local_set_generator(
            "topics",
            Box::new(ClassGenerator::for_extension(TOPIC_LISTING, &name)),
        )
    }

    fn process_page(&mut self, meta: &Meta, _html: &str, _file_name: &Path) {
        let Some(topics) = meta.get(TOPICS_FIELD) else {
            return;
        };

        for topic in topics.values() {
            let slug = topic_slug(topic);
            if self.topics.contains_key(&slug) {
                continue;
            }
            self.diagnostics
                .in_scope(|| tracing::debug!(topic, slug = %slug, "added topic"));
            self.topics.insert(
                slug.clone(),
                Topic {
                    content_type: TOPIC.content_type.to_string(),
                    slug,
                    title: topic.to_string(),
                    publish: self.publish.clone(),
                    set: TOPIC_LISTING.listing_slug.unwrap_or_default().to_string(),
                },
            );
        }
    }

    fn load_pages(&mut self, cx: &LoadContext<'_>) -> Result<PageSet> {
        let generator = cx.generator("topic")?;
        let mut pages = PageSet::new();

        for (slug, topic) in &self.topics {
            let mut meta = Meta::new();
            meta.insert("type".into(), MetaValue::from(topic.content_type.as_str()));
            meta.insert("slug".into(), MetaValue::from(slug.as_str()));
            meta.insert("title".into(), MetaValue::from(topic.title.as_str()));
            meta.insert("publish".into(), MetaValue::from(topic.publish.as_str()));
            meta.insert("set".into(), MetaValue::from(topic.set.as_str()));

            let mut page = generator.generate(PageArgs::new(slug).meta(meta), cx.diagnostics)?;
            let refs: Vec<String> = cx
                .primary
                .values()
                .filter(|p| {
                    p.meta
                        .get(TOPICS_FIELD)
                        .is_some_and(|t| t.values().any(|name| topic_slug(name) == *slug))
                })
                .map(|p| p.slug.clone())
                .collect();
            if let Some(topic_page) = page.get_mut(slug) {
                topic_page.refs = refs;
            }
            merge_pages(&mut pages, page, &self.name)?;
        }

        Ok(pages)
    }

    fn generate_context(&self) -> Map<String, Value> {
        let mut context = Map::new();
        context.insert(
            TOPICS_FIELD.to_string(),
            serde_json::to_value(&self.topics).unwrap_or(Value::Null),
        );
        context
    }
}
