use std::collections::BTreeMap;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::page::{Page, PageArgs, PageClass};

/// Pages keyed by slug.
pub type PageSet = BTreeMap<String, Page>;

/// Named options handed to a generator at construction.
pub type Options = BTreeMap<String, String>;

/// Merge `pages` into `into`. Nothing is inserted when any slug collides.
pub fn merge_pages(into: &mut PageSet, pages: PageSet, origin: &str) -> Result<()> {
    if let Some(slug) = pages.keys().find(|slug| into.contains_key(*slug)) {
        return Err(Error::DuplicateSlug {
            slug: slug.clone(),
            origin: origin.to_string(),
        });
    }
    into.extend(pages);
    Ok(())
}

/// Builds pages of one class.
///
/// Generators are registered by content type (or by set name for set
/// generators). `generate` returns a single-entry set so results from any
/// generator merge the same way.
pub trait PageGenerator {
    fn class(&self) -> PageClass;

    /// Name of the extension that contributed this generator, if any.
    fn extension(&self) -> Option<&str> {
        None
    }

    /// Hook for options passed at construction.
    fn process_options(&mut self, options: &Options) -> Result<()> {
        let _ = options;
        Ok(())
    }

    fn generate(&self, args: PageArgs, diagnostics: &Diagnostics) -> Result<PageSet> {
        diagnostics.in_scope(|| {
            tracing::debug!(class = self.class().name, slug = %args.slug, "generating page")
        });
        let page = Page::new(self.class(), args, diagnostics)?;
        Ok(PageSet::from([(page.slug.clone(), page)]))
    }

    /// Build the aggregate page for a listing class under its default slug.
    fn generate_set(&self, diagnostics: &Diagnostics) -> Result<PageSet> {
        let class = self.class();
        let slug = class.listing_slug.ok_or(Error::EmptySlug { class: class.name })?;
        self.generate(PageArgs::new(slug), diagnostics)
    }
}

/// Generator for a [`PageClass`] with no custom behaviour.
#[derive(Debug, Clone)]
pub struct ClassGenerator {
    class: PageClass,
    extension: Option<String>,
    options: Options,
}

impl ClassGenerator {
    pub fn new(class: PageClass) -> Self {
        Self {
            class,
            extension: None,
            options: Options::new(),
        }
    }

    pub fn for_extension(class: PageClass, extension: impl Into<String>) -> Self {
        Self {
            extension: Some(extension.into()),
            ..Self::new(class)
        }
    }

    pub fn with_options(mut self, options: Options) -> Result<Self> {
        self.process_options(&options)?;
        self.options = options;
        Ok(self)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl PageGenerator for ClassGenerator {
    fn class(&self) -> PageClass {
        self.class
    }

    fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Drafts {
        prefix: String,
    }

    impl PageGenerator for Drafts {
        fn class(&self) -> PageClass {
            PageClass::ARTICLE
        }

        fn process_options(&mut self, options: &Options) -> Result<()> {
            if let Some(prefix) = options.get("prefix") {
                self.prefix = prefix.clone();
            }
            Ok(())
        }

        fn generate(&self, mut args: PageArgs, diagnostics: &Diagnostics) -> Result<PageSet> {
            args.slug = format!("{}{}", self.prefix, args.slug);
            let page = Page::new(self.class(), args, diagnostics)?;
            Ok(PageSet::from([(page.slug.clone(), page)]))
        }
    }

    #[test]
    fn test_generate_returns_single_entry() {
        let generator = ClassGenerator::new(PageClass::AUTHOR);
        let pages = generator
            .generate(PageArgs::new("alice"), &Diagnostics::default())
            .unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages["alice"].content_type, "author");
        assert_eq!(pages["alice"].rules, vec!["/authors/{slug}/".to_string()]);
    }

    #[test]
    fn test_generate_without_slug_fails() {
        let generator = ClassGenerator::new(PageClass::PAGE);
        let result = generator.generate(PageArgs::default(), &Diagnostics::default());
        assert!(matches!(result, Err(Error::EmptySlug { .. })));
    }

    #[test]
    fn test_options_reach_hook() {
        let mut generator = Drafts { prefix: String::new() };
        generator
            .process_options(&Options::from([("prefix".to_string(), "draft-".to_string())]))
            .unwrap();

        let pages = generator
            .generate(PageArgs::new("intro"), &Diagnostics::default())
            .unwrap();
        assert!(pages.contains_key("draft-intro"));
    }

    #[test]
    fn test_options_are_kept() {
        let options = Options::from([("per_page".to_string(), "10".to_string())]);
        let generator = ClassGenerator::new(PageClass::PAGE)
            .with_options(options.clone())
            .unwrap();
        assert_eq!(generator.options(), &options);
    }

    #[test]
    fn test_merge_collision_inserts_nothing() {
        let diagnostics = Diagnostics::default();
        let generator = ClassGenerator::new(PageClass::PAGE);
        let mut pages = generator.generate(PageArgs::new("a"), &diagnostics).unwrap();

        let mut incoming = generator.generate(PageArgs::new("b"), &diagnostics).unwrap();
        incoming.extend(generator.generate(PageArgs::new("a"), &diagnostics).unwrap());

        let err = merge_pages(&mut pages, incoming, "test").unwrap_err();
        assert!(matches!(err, Error::DuplicateSlug { ref slug, .. } if slug == "a"));
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_set_generator_uses_listing_slug() {
        let generator = ClassGenerator::for_extension(PageClass::ARTICLE_LISTING, "blog");
        let pages = generator.generate_set(&Diagnostics::default()).unwrap();

        assert!(pages.contains_key("articles"));
        assert_eq!(generator.extension(), Some("blog"));
    }
}
