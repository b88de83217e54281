use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tera::Context;

use crate::app::WebApp;
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::meta::{Meta, MetaValue};

/// Defaults shared by every page of one kind.
///
/// This is the capability table entry for a content type: the generator
/// registered for a type builds pages of its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageClass {
    pub name: &'static str,
    pub content_type: &'static str,
    pub template: &'static str,
    pub rules: &'static [&'static str],
    /// Listing pages show every primary page of `content_type` and have a
    /// fixed default slug.
    pub listing_slug: Option<&'static str>,
}

impl PageClass {
    pub const PAGE: PageClass = PageClass {
        name: "ContentPage",
        content_type: "page",
        template: "base.html",
        rules: &["/{slug}/"],
        listing_slug: None,
    };

    pub const INDEX: PageClass = PageClass {
        name: "IndexPage",
        content_type: "index",
        template: "article.html",
        rules: &["/"],
        listing_slug: None,
    };

    pub const AUTHOR: PageClass = PageClass {
        name: "AuthorPage",
        content_type: "author",
        template: "author.html",
        rules: &["/authors/{slug}/"],
        listing_slug: None,
    };

    pub const AUTHOR_LISTING: PageClass = PageClass {
        name: "AuthorListingPage",
        content_type: "author",
        template: "authors.html",
        rules: &["/authors/"],
        listing_slug: Some("authors"),
    };

    pub const ARTICLE: PageClass = PageClass {
        name: "ArticlePage",
        content_type: "article",
        template: "article.html",
        rules: &["/articles/{slug}/"],
        listing_slug: None,
    };

    pub const ARTICLE_LISTING: PageClass = PageClass {
        name: "ArticleListingPage",
        content_type: "article",
        template: "articles.html",
        rules: &["/articles/"],
        listing_slug: Some("articles"),
    };

    pub fn is_listing(&self) -> bool {
        self.listing_slug.is_some()
    }
}

/// Route rules given to a page: one bare rule or a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rules {
    One(String),
    Many(Vec<String>),
}

/// Page construction arguments. Unset fields take the class defaults.
#[derive(Debug, Clone, Default)]
pub struct PageArgs {
    pub slug: String,
    pub meta: Meta,
    pub rules: Option<Rules>,
    pub content_type: Option<String>,
    pub template: Option<String>,
    pub html: Option<String>,
    pub file_name: Option<PathBuf>,
}

impl PageArgs {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            ..Default::default()
        }
    }

    pub fn meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn file_name(mut self, file_name: impl Into<PathBuf>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn rules(mut self, rules: Rules) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub slug: String,
    pub meta: Meta,
    pub rules: Vec<String>,
    pub content_type: String,
    pub template: String,
    pub html: Option<String>,
    pub file_name: Option<PathBuf>,
    /// Slugs of pages referring to this one, e.g. an author's articles.
    pub refs: Vec<String>,
    #[serde(skip)]
    class: PageClass,
    #[serde(skip)]
    routes_registered: bool,
    #[serde(skip)]
    view_registered: bool,
}

impl Page {
    pub fn new(class: PageClass, args: PageArgs, diagnostics: &Diagnostics) -> Result<Self> {
        if args.slug.is_empty() {
            return Err(Error::EmptySlug { class: class.name });
        }

        let rules = match args.rules {
            None => class.rules.iter().map(|r| r.to_string()).collect(),
            Some(Rules::One(rule)) => {
                diagnostics.warn(Warning::SingleRule {
                    slug: args.slug.clone(),
                });
                vec![rule]
            }
            Some(Rules::Many(rules)) => rules,
        };

        Ok(Self {
            slug: args.slug,
            meta: args.meta,
            rules,
            content_type: args
                .content_type
                .unwrap_or_else(|| class.content_type.to_string()),
            template: args.template.unwrap_or_else(|| class.template.to_string()),
            html: args.html,
            file_name: args.file_name,
            refs: Vec::new(),
            class,
            routes_registered: false,
            view_registered: false,
        })
    }

    pub fn class(&self) -> &PageClass {
        &self.class
    }

    pub fn routes_registered(&self) -> bool {
        self.routes_registered
    }

    pub fn view_registered(&self) -> bool {
        self.view_registered
    }

    pub fn meta_str(&self, field: &str) -> Option<&str> {
        self.meta.get(field).and_then(MetaValue::as_str)
    }

    /// Format every rule with the slug plus `params` and route it to this
    /// page's endpoint.
    pub fn register_rules(
        &mut self,
        app: &mut dyn WebApp,
        params: &BTreeMap<String, String>,
    ) -> Result<&mut Self> {
        for rule in &self.rules {
            let url = format_rule(rule, &self.slug, params)?;
            app.add_url_rule(&url, &self.slug)?;
        }
        self.routes_registered = true;
        Ok(self)
    }

    /// Render the page template once and bind the result as the endpoint's
    /// view. Rules must be registered first.
    pub fn register_view(&mut self, app: &mut dyn WebApp, context: &Context) -> Result<&mut Self> {
        if !self.routes_registered {
            return Err(Error::ViewBeforeRules {
                slug: self.slug.clone(),
            });
        }

        let content: Arc<str> = app.render_template(&self.template, context)?.into();
        app.set_view(&self.slug, Arc::new(move || content.to_string()));
        self.view_registered = true;
        Ok(self)
    }
}

impl PartialEq for Page {
    fn eq(&self, other: &Self) -> bool {
        self.slug == other.slug
    }
}

impl Eq for Page {}

impl Hash for Page {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slug.hash(state);
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} slug={}>", self.class.name, self.slug)
    }
}

/// Substitute `{slug}` and named `{param}` placeholders in a rule.
pub fn format_rule(rule: &str, slug: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(rule.len() + slug.len());
    let mut rest = rule;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let name = &after[..end];
        let value = match name {
            "slug" => slug,
            _ => params
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| Error::MissingRuleParam {
                    rule: rule.to_string(),
                    param: name.to_string(),
                })?,
        };
        out.push_str(value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;

    fn page(class: PageClass, slug: &str) -> Result<Page> {
        Page::new(class, PageArgs::new(slug), &Diagnostics::default())
    }

    fn app() -> App {
        let mut tera = tera::Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", "{{ page_content }}"),
            ("article.html", "<article>{{ page_content }}</article>"),
            ("author.html", "author"),
        ])
        .unwrap();
        App::from_tera(tera)
    }

    #[test]
    fn test_non_empty_slug_builds_with_class_defaults() {
        for slug in ["a", "intro", "x-y_z"] {
            let page = page(PageClass::ARTICLE, slug).unwrap();
            assert_eq!(page.rules, vec!["/articles/{slug}/".to_string()]);
            assert_eq!(page.template, "article.html");
            assert_eq!(page.content_type, "article");
        }
    }

    #[test]
    fn test_empty_slug_fails() {
        for class in [PageClass::PAGE, PageClass::AUTHOR, PageClass::ARTICLE_LISTING] {
            assert!(matches!(page(class, ""), Err(Error::EmptySlug { .. })));
        }
    }

    #[test]
    fn test_bare_rule_is_wrapped_with_warning() {
        let diagnostics = Diagnostics::default();
        let page = Page::new(
            PageClass::PAGE,
            PageArgs::new("about").rules(Rules::One("/about-us/".into())),
            &diagnostics,
        )
        .unwrap();

        assert_eq!(page.rules, vec!["/about-us/".to_string()]);
        assert_eq!(diagnostics.warnings().len(), 1);
    }

    #[test]
    fn test_view_before_rules_fails_for_every_class() {
        let mut app = app();
        for class in [PageClass::PAGE, PageClass::INDEX, PageClass::AUTHOR, PageClass::ARTICLE] {
            let mut page = page(class, "p").unwrap();
            let err = page.register_view(&mut app, &Context::new()).unwrap_err();
            assert!(matches!(err, Error::ViewBeforeRules { .. }));
            assert!(!page.view_registered());
        }
    }

    #[test]
    fn test_register_rules_then_view() {
        let mut app = app();
        let mut page = page(PageClass::ARTICLE, "intro").unwrap();

        page.register_rules(&mut app, &BTreeMap::new()).unwrap();
        assert!(page.routes_registered());

        let mut context = Context::new();
        context.insert("page_content", "hi");
        page.register_view(&mut app, &context).unwrap();

        assert!(page.view_registered());
        assert_eq!(app.url_for("intro"), Some("/articles/intro/"));
        assert_eq!(app.respond("/articles/intro/").as_deref(), Some("<article>hi</article>"));
    }

    #[test]
    fn test_format_rule_params() {
        let params = BTreeMap::from([("year".to_string(), "2024".to_string())]);
        assert_eq!(
            format_rule("/{year}/{slug}/", "intro", &params).unwrap(),
            "/2024/intro/"
        );
        assert!(matches!(
            format_rule("/{month}/{slug}/", "intro", &params),
            Err(Error::MissingRuleParam { .. })
        ));
    }

    #[test]
    fn test_equality_is_by_slug() {
        let a = page(PageClass::ARTICLE, "same").unwrap();
        let b = page(PageClass::AUTHOR, "same").unwrap();
        assert_eq!(a, b);
    }
}
