//! The content generator: scans sources and drives page registration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tera::Context;
use tracing::{debug, info};

use crate::app::WebApp;
use crate::config::{Config, FileExt};
use crate::diagnostics::{Diagnostics, Warning};
use crate::error::{Error, Result};
use crate::extension::{ExtensionHost, Generators, MetaProcessors};
use crate::generator::{ClassGenerator, PageGenerator, PageSet, merge_pages};
use crate::markdown::{MarkdownLoader, SourceLoader};
use crate::meta::{Meta, MetaProcessor, MetaValue, normalize};
use crate::page::{Page, PageArgs, PageClass};
use crate::registry::Registry;
use crate::scanner::SourceScanner;

pub const DEFAULT_SEARCH_DIR: &str = "pages";

pub struct ContentGeneratorBuilder {
    search_path: Option<PathBuf>,
    file_ext: Option<FileExt>,
    app_config: Option<Config>,
    diagnostics: Diagnostics,
    loader: Option<Box<dyn SourceLoader>>,
    meta_processors: MetaProcessors,
    generators: Generators,
    set_generators: Generators,
    extensions: Registry<ExtensionHost>,
}

impl Default for ContentGeneratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentGeneratorBuilder {
    pub fn new() -> Self {
        Self {
            search_path: None,
            file_ext: None,
            app_config: None,
            diagnostics: Diagnostics::default(),
            loader: None,
            meta_processors: Registry::new("Meta label processor"),
            generators: Registry::new("Page generator"),
            set_generators: Registry::new("Set generator"),
            extensions: Registry::new("Extension"),
        }
    }

    /// Directory searched for sources. Defaults to `pages/` under the
    /// working directory.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn file_ext(mut self, file_ext: FileExt) -> Self {
        self.file_ext = Some(file_ext);
        self
    }

    /// Take settings from the host application. Values it sets win over
    /// the builder's own.
    pub fn init_app(mut self, app: &dyn WebApp) -> Self {
        self.app_config = Some(app.config().clone());
        self
    }

    pub fn diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn meta_processor(mut self, label: &str, processor: impl MetaProcessor + 'static) -> Result<Self> {
        self.meta_processors.insert(label, Box::new(processor))?;
        Ok(self)
    }

    pub fn page_generator(mut self, name: &str, generator: impl PageGenerator + 'static) -> Result<Self> {
        self.generators.insert(name, Box::new(generator))?;
        Ok(self)
    }

    pub fn set_generator(mut self, name: &str, generator: impl PageGenerator + 'static) -> Result<Self> {
        self.set_generators.insert(name, Box::new(generator))?;
        Ok(self)
    }

    /// Add an extension. It is registered into this builder's registries
    /// when the generator is built, so it must be set up by then.
    pub fn extension(mut self, extension: ExtensionHost) -> Result<Self> {
        let name = extension.name().to_string();
        self.extensions.insert(name, extension)?;
        Ok(self)
    }

    /// Generators for articles, authors, plain pages and the index, plus
    /// the article and author listings.
    pub fn basic_generators(self) -> Result<Self> {
        self.page_generator("article", ClassGenerator::new(PageClass::ARTICLE))?
            .page_generator("author", ClassGenerator::new(PageClass::AUTHOR))?
            .page_generator("page", ClassGenerator::new(PageClass::PAGE))?
            .page_generator("index", ClassGenerator::new(PageClass::INDEX))?
            .set_generator("articles", ClassGenerator::new(PageClass::ARTICLE_LISTING))?
            .set_generator("authors", ClassGenerator::new(PageClass::AUTHOR_LISTING))
    }

    pub fn build(self) -> Result<ContentGenerator> {
        let Self {
            search_path,
            file_ext,
            app_config,
            diagnostics,
            loader,
            mut meta_processors,
            mut generators,
            mut set_generators,
            mut extensions,
        } = self;

        let loader = loader.ok_or(Error::MissingLoader)?;
        let app_config = app_config.unwrap_or_default();
        let search_path = match app_config.search_path.or(search_path) {
            Some(path) => path,
            None => std::env::current_dir()?.join(DEFAULT_SEARCH_DIR),
        };
        let file_ext = app_config.file_ext.or(file_ext).unwrap_or_default();

        for host in extensions.values_mut() {
            host.register(
                &mut meta_processors,
                &mut generators,
                &mut set_generators,
                &diagnostics,
            )?;
        }

        let page_files = SourceScanner::new(&search_path, file_ext.clone()).scan()?;
        info!(
            path = %search_path.display(),
            files = page_files.len(),
            extensions = extensions.len(),
            "content generator ready"
        );

        Ok(ContentGenerator {
            search_path,
            file_ext,
            page_files,
            loader,
            meta_processors,
            generators,
            set_generators,
            extensions,
            pages: PageSet::new(),
            site_pages: PageSet::new(),
            diagnostics,
        })
    }
}

/// Loads every source into a page and registers the whole site with a
/// [`WebApp`].
pub struct ContentGenerator {
    search_path: PathBuf,
    file_ext: FileExt,
    page_files: Vec<PathBuf>,
    loader: Box<dyn SourceLoader>,
    meta_processors: MetaProcessors,
    generators: Generators,
    set_generators: Generators,
    extensions: Registry<ExtensionHost>,
    /// Pages loaded from sources.
    pages: PageSet,
    /// Every page of the last run, derived ones included.
    site_pages: PageSet,
    diagnostics: Diagnostics,
}

impl ContentGenerator {
    pub fn builder() -> ContentGeneratorBuilder {
        ContentGeneratorBuilder::new()
    }

    /// Builder preloaded with the basic generators and the Markdown loader.
    pub fn markdown() -> Result<ContentGeneratorBuilder> {
        Ok(Self::builder().basic_generators()?.loader(MarkdownLoader::new()))
    }

    /// Load, cross-reference and register every page with `app`.
    ///
    /// Rules for every page are registered before any view renders, so
    /// templates can link to any page. A slug collision aborts before any
    /// rule is registered.
    pub fn generate(&mut self, app: &mut dyn WebApp) -> Result<()> {
        self.load_pages()?;
        self.resolve_authors();

        let mut pages = self.pages.clone();
        for (name, host) in self.extensions.iter_mut() {
            let produced = host.produce(&self.pages)?;
            merge_pages(&mut pages, produced, &format!("extension '{name}'"))?;
        }
        for (name, generator) in self.set_generators.iter() {
            let produced = generator.generate_set(&self.diagnostics)?;
            merge_pages(&mut pages, produced, &format!("set generator '{name}'"))?;
        }
        debug!(pages = pages.len(), "collected pages");

        let context = self.shared_context();

        for page in pages.values_mut() {
            page.register_rules(app, &BTreeMap::new())?;
        }

        let slugs: Vec<String> = pages.keys().cloned().collect();
        for slug in slugs {
            let Some(page) = pages.get(&slug) else {
                continue;
            };
            let view_context = self.view_context(page, &pages, &context);
            if let Some(page) = pages.get_mut(&slug) {
                page.register_view(app, &view_context)?;
            }
        }

        info!(pages = pages.len(), "registered pages");
        self.site_pages = pages;
        Ok(())
    }

    fn load_pages(&mut self) -> Result<()> {
        let mut pages = PageSet::new();

        for file in &self.page_files {
            debug!(file = %file.display(), "loading page");
            let source = self.loader.load(file)?;
            let meta = normalize(&source.meta, &self.meta_processors, &self.diagnostics)?;

            let content_type = required(&meta, "type", file)?;
            let slug = required(&meta, "slug", file)?;
            let generator = self
                .generators
                .get(&content_type)
                .ok_or_else(|| Error::UnknownContentType {
                    content_type: content_type.clone(),
                    path: file.clone(),
                })?;
            if pages.contains_key(&slug) {
                return Err(Error::DuplicateSlug {
                    slug,
                    origin: file.display().to_string(),
                });
            }

            for host in self.extensions.values_mut() {
                host.process_page(&meta, &source.html, file);
            }

            let args = PageArgs::new(slug)
                .meta(meta)
                .html(source.html)
                .file_name(file);
            let page = generator.generate(args, &self.diagnostics)?;
            merge_pages(&mut pages, page, &file.display().to_string())?;
        }

        info!(pages = pages.len(), "loaded pages");
        self.pages = pages;
        Ok(())
    }

    /// Append each page's slug to the refs of every author it names.
    fn resolve_authors(&mut self) {
        let mut links = Vec::new();
        for (slug, page) in &self.pages {
            if let Some(authors) = page.meta.get("author") {
                for author in authors.values() {
                    links.push((author.to_string(), slug.clone()));
                }
            }
        }

        for (author, article) in links {
            match self.pages.get_mut(&author) {
                Some(page) => {
                    debug!(author = %author, article = %article, "linked author");
                    page.refs.push(article);
                }
                None => self
                    .diagnostics
                    .warn(Warning::MissingAuthor { author, article }),
            }
        }
    }

    fn shared_context(&self) -> Context {
        let mut context = Context::new();
        let authors: BTreeMap<&str, &Page> =
            self.pages_iter("author").map(|p| (p.slug.as_str(), p)).collect();
        let articles: BTreeMap<&str, &Page> =
            self.pages_iter("article").map(|p| (p.slug.as_str(), p)).collect();
        context.insert("authors", &authors);
        context.insert("articles", &articles);

        for host in self.extensions.values() {
            for (key, value) in host.generate_context() {
                context.insert(key, &value);
            }
        }
        context
    }

    fn view_context(&self, page: &Page, pages: &PageSet, shared: &Context) -> Context {
        let mut context = shared.clone();
        let refs: Vec<&Page> = page.refs.iter().filter_map(|slug| pages.get(slug)).collect();

        context.insert("page_content", page.html.as_deref().unwrap_or_default());
        context.insert("meta", &page.meta);
        context.insert("refs", &refs);
        context.insert("slug", &page.slug);
        if page.class().is_listing() {
            let listed: Vec<&Page> = self.pages_iter(page.class().content_type).collect();
            context.insert("pages", &listed);
        }
        context
    }

    /// Primary pages whose `type` is `content_type`, in slug order.
    pub fn pages_iter<'a>(&'a self, content_type: &'a str) -> impl Iterator<Item = &'a Page> + 'a {
        self.pages
            .values()
            .filter(move |p| p.meta_str("type") == Some(content_type))
    }

    pub fn get_page(&self, slug: &str) -> Option<&Page> {
        self.pages.get(slug)
    }

    /// Pages loaded from sources.
    pub fn pages(&self) -> &PageSet {
        &self.pages
    }

    /// Every page registered by the last [`generate`](Self::generate).
    pub fn site_pages(&self) -> &PageSet {
        &self.site_pages
    }

    pub fn page_files(&self) -> &[PathBuf] {
        &self.page_files
    }

    pub fn search_path(&self) -> &Path {
        &self.search_path
    }

    pub fn file_ext(&self) -> &FileExt {
        &self.file_ext
    }

    pub fn extension(&self, name: &str) -> Option<&ExtensionHost> {
        self.extensions.get(name)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

fn required(meta: &Meta, field: &'static str, path: &Path) -> Result<String> {
    meta.get(field)
        .and_then(MetaValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::MissingMeta {
            field,
            path: path.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::markdown::Source;
    use crate::meta::RawMeta;

    /// Loader that reads `key=value;key=value` headers so tests control
    /// metadata without Markdown.
    struct KeyValueLoader;

    impl SourceLoader for KeyValueLoader {
        fn load_str(&self, text: &str) -> Result<Source> {
            let (head, body) = text.split_once('\n').unwrap_or((text, ""));
            let mut meta = RawMeta::new();
            for pair in head.split(';').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                meta.entry(key.to_string()).or_default().push(value.to_string());
            }
            Ok(Source {
                meta,
                html: body.to_string(),
            })
        }
    }

    fn site(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        dir
    }

    fn app() -> App {
        let mut tera = tera::Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", "{{ page_content }}"),
            ("article.html", "{{ page_content | safe }}"),
            ("author.html", "{{ refs | length }}"),
            ("articles.html", "{% for p in pages %}{{ p.slug }} {% endfor %}"),
            ("authors.html", "{{ pages | length }}"),
        ])
        .unwrap();
        App::from_tera(tera)
    }

    fn generator(dir: &Path) -> ContentGenerator {
        ContentGenerator::builder()
            .basic_generators()
            .unwrap()
            .loader(KeyValueLoader)
            .search_path(dir)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_without_loader_fails() {
        let dir = site(&[]);
        let result = ContentGenerator::builder().search_path(dir.path()).build();
        assert!(matches!(result, Err(Error::MissingLoader)));
    }

    #[test]
    fn test_duplicate_generator_fails() {
        let result = ContentGenerator::builder()
            .basic_generators()
            .unwrap()
            .page_generator("article", ClassGenerator::new(PageClass::ARTICLE));
        assert!(matches!(result, Err(Error::DuplicateRegistration { .. })));
    }

    #[test]
    fn test_app_config_wins() {
        let dir = site(&[("a.txt", "type=page;slug=a\n")]);
        let config = Config {
            search_path: Some(dir.path().to_path_buf()),
            file_ext: Some(FileExt::One("txt".into())),
        };
        let app = app().with_config(config);

        let generator = ContentGenerator::builder()
            .loader(KeyValueLoader)
            .search_path("/does/not/matter")
            .init_app(&app)
            .build()
            .unwrap();
        assert_eq!(generator.search_path(), dir.path());
        assert_eq!(generator.page_files().len(), 1);
    }

    #[test]
    fn test_unknown_type_fails() {
        let dir = site(&[("a.md", "type=recipe;slug=soup\n")]);
        let err = generator(dir.path()).generate(&mut app()).unwrap_err();
        assert!(matches!(err, Error::UnknownContentType { ref content_type, .. } if content_type == "recipe"));
    }

    #[test]
    fn test_missing_slug_fails() {
        let dir = site(&[("a.md", "type=article\n")]);
        let err = generator(dir.path()).generate(&mut app()).unwrap_err();
        assert!(matches!(err, Error::MissingMeta { field: "slug", .. }));
    }

    #[test]
    fn test_author_refs_and_listing() {
        let dir = site(&[
            ("alice.md", "type=author;slug=alice\n"),
            ("one.md", "type=article;slug=one;author=alice\n<p>1</p>"),
            ("two.md", "type=article;slug=two;author=alice;author=bob\n<p>2</p>"),
        ]);
        let mut generator = generator(dir.path());
        let mut app = app();
        generator.generate(&mut app).unwrap();

        assert_eq!(generator.get_page("alice").unwrap().refs, vec!["one", "two"]);
        assert_eq!(
            generator.diagnostics().warnings(),
            vec![Warning::MissingAuthor {
                author: "bob".into(),
                article: "two".into()
            }]
        );
        assert_eq!(app.respond("/authors/alice/").as_deref(), Some("2"));
        assert_eq!(app.respond("/articles/").as_deref(), Some("one two "));
        assert_eq!(app.respond("/authors/").as_deref(), Some("1"));
        assert_eq!(app.respond("/articles/two/").as_deref(), Some("<p>2</p>"));
    }

    #[test]
    fn test_pages_iter_filters_by_type() {
        let dir = site(&[
            ("a.md", "type=page;slug=about\n"),
            ("b.md", "type=article;slug=b\n"),
            ("c.md", "type=article;slug=a\n"),
        ]);
        let mut generator = generator(dir.path());
        generator.generate(&mut app()).unwrap();

        let articles: Vec<&str> = generator.pages_iter("article").map(|p| p.slug.as_str()).collect();
        assert_eq!(articles, vec!["a", "b"]);
        assert_eq!(generator.pages_iter("article").count(), 2);
        assert_eq!(generator.pages_iter("author").count(), 0);
    }
}
