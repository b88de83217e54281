//! Content generator extensions.
//!
//! An extension watches every source page the generator loads, keeps its
//! own derived state, and afterwards produces an extra page set plus
//! template context. [`ExtensionHost`] wraps an extension with the
//! `unset-up -> set-up -> registered` lifecycle and its local generators.

use std::path::Path;

use serde_json::{Map, Value};

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::generator::{PageGenerator, PageSet, merge_pages};
use crate::meta::{Meta, MetaProcessor};
use crate::registry::Registry;

pub type Generators = Registry<Box<dyn PageGenerator>>;
pub type MetaProcessors = Registry<Box<dyn MetaProcessor>>;

pub trait ContentExtension {
    fn name(&self) -> &str;

    /// Initialize private state. No generator is available yet.
    fn setup(&mut self, diagnostics: &Diagnostics) {
        let _ = diagnostics;
    }

    /// Contribute processors and generators.
    fn register(&mut self, registrar: &mut Registrar<'_>) -> Result<()> {
        let _ = registrar;
        Ok(())
    }

    /// Observe one loaded source page.
    fn process_page(&mut self, meta: &Meta, html: &str, file_name: &Path) {
        let _ = (meta, html, file_name);
    }

    /// Build pages from the accumulated state.
    fn load_pages(&mut self, cx: &LoadContext<'_>) -> Result<PageSet> {
        let _ = cx;
        Ok(PageSet::new())
    }

    /// Extra values for the shared template context.
    fn generate_context(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// Registration access handed to [`ContentExtension::register`].
pub struct Registrar<'a> {
    extension: &'a str,
    meta_processors: &'a mut MetaProcessors,
    generators: &'a mut Generators,
    set_generators: &'a mut Generators,
    local_generators: &'a mut Generators,
    local_set_generators: &'a mut Generators,
    diagnostics: &'a Diagnostics,
}

impl<'a> Registrar<'a> {
    pub fn extension(&self) -> &str {
        self.extension
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        self.diagnostics
    }

    /// Add a processor to the generator for every source page.
    pub fn add_meta_processor(&mut self, label: &str, processor: Box<dyn MetaProcessor>) -> Result<()> {
        self.meta_processors.insert(label, processor)
    }

    /// Add a generator for a source content type.
    pub fn add_page_generator(&mut self, name: &str, generator: Box<dyn PageGenerator>) -> Result<()> {
        self.generators.insert(name, generator)
    }

    /// Add a set generator run by the content generator.
    pub fn add_set_generator(&mut self, name: &str, generator: Box<dyn PageGenerator>) -> Result<()> {
        self.set_generators.insert(name, generator)
    }

    /// Add a generator only this extension uses.
    pub fn add_local_generator(&mut self, name: &str, generator: Box<dyn PageGenerator>) -> Result<()> {
        self.local_generators.insert(name, generator)
    }

    /// Add a set generator run when this extension produces its pages.
    pub fn add_local_set_generator(
        &mut self,
        name: &str,
        generator: Box<dyn PageGenerator>,
    ) -> Result<()> {
        self.local_set_generators.insert(name, generator)
    }
}

/// What an extension sees while producing pages.
pub struct LoadContext<'a> {
    /// Pages loaded from source files.
    pub primary: &'a PageSet,
    /// The extension's local generators.
    pub generators: &'a Generators,
    pub diagnostics: &'a Diagnostics,
}

impl LoadContext<'_> {
    pub fn generator(&self, name: &str) -> Result<&dyn PageGenerator> {
        self.generators
            .get(name)
            .map(|g| g.as_ref())
            .ok_or_else(|| Error::MissingGenerator {
                name: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionState {
    Unset,
    SetUp,
    Registered,
}

pub struct ExtensionHost {
    inner: Box<dyn ContentExtension>,
    state: ExtensionState,
    generators: Generators,
    set_generators: Generators,
    diagnostics: Diagnostics,
}

impl ExtensionHost {
    pub fn new(extension: impl ContentExtension + 'static) -> Self {
        let diagnostics = Diagnostics::default().child("extension", extension.name());
        Self {
            inner: Box::new(extension),
            state: ExtensionState::Unset,
            generators: Registry::new("Page generator"),
            set_generators: Registry::new("Set generator"),
            diagnostics,
        }
    }

    /// Wrap and set up in one step.
    pub fn set_up(extension: impl ContentExtension + 'static) -> Self {
        let mut host = Self::new(extension);
        host.setup();
        host
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn state(&self) -> ExtensionState {
        self.state
    }

    pub fn setup(&mut self) -> &mut Self {
        self.diagnostics
            .in_scope(|| tracing::debug!(extension = self.inner.name(), "setting up extension"));
        self.inner.setup(&self.diagnostics);
        if self.state == ExtensionState::Unset {
            self.state = ExtensionState::SetUp;
        }
        self
    }

    pub(crate) fn register(
        &mut self,
        meta_processors: &mut MetaProcessors,
        generators: &mut Generators,
        set_generators: &mut Generators,
        diagnostics: &Diagnostics,
    ) -> Result<()> {
        if self.state == ExtensionState::Unset {
            return Err(Error::ExtensionNotSetUp {
                name: self.name().to_string(),
            });
        }

        self.diagnostics = diagnostics.child("extension", self.inner.name());
        let name = self.inner.name().to_string();
        self.diagnostics
            .in_scope(|| tracing::debug!(extension = %name, "registering extension"));

        let mut registrar = Registrar {
            extension: &name,
            meta_processors,
            generators,
            set_generators,
            local_generators: &mut self.generators,
            local_set_generators: &mut self.set_generators,
            diagnostics: &self.diagnostics,
        };
        self.inner.register(&mut registrar)?;
        self.state = ExtensionState::Registered;
        Ok(())
    }

    pub fn process_page(&mut self, meta: &Meta, html: &str, file_name: &Path) {
        self.inner.process_page(meta, html, file_name);
    }

    /// Produce this extension's page set: its own pages plus those of its
    /// local set generators.
    pub fn produce(&mut self, primary: &PageSet) -> Result<PageSet> {
        if self.state != ExtensionState::Registered {
            return Err(Error::ExtensionNotRegistered {
                name: self.name().to_string(),
            });
        }

        let cx = LoadContext {
            primary,
            generators: &self.generators,
            diagnostics: &self.diagnostics,
        };
        let mut pages = self.inner.load_pages(&cx)?;

        for (name, generator) in self.set_generators.iter() {
            let origin = format!("set generator '{name}' of {}", self.inner.name());
            merge_pages(&mut pages, generator.generate_set(&self.diagnostics)?, &origin)?;
        }

        self.diagnostics.in_scope(|| {
            tracing::debug!(extension = self.inner.name(), pages = pages.len(), "extension produced pages")
        });
        Ok(pages)
    }

    pub fn generate_context(&self) -> Map<String, Value> {
        self.inner.generate_context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ClassGenerator;
    use crate::page::{PageArgs, PageClass};

    #[derive(Default)]
    struct Counter {
        seen: Vec<String>,
    }

    impl ContentExtension for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn register(&mut self, registrar: &mut Registrar<'_>) -> Result<()> {
            registrar.add_local_generator(
                "seen",
                Box::new(ClassGenerator::for_extension(PageClass::PAGE, registrar.extension())),
            )?;
            registrar.add_local_set_generator(
                "articles",
                Box::new(ClassGenerator::for_extension(PageClass::ARTICLE_LISTING, "counter")),
            )
        }

        fn process_page(&mut self, meta: &Meta, _html: &str, _file_name: &Path) {
            if let Some(slug) = meta.get("slug").and_then(|v| v.as_str()) {
                self.seen.push(format!("seen-{slug}"));
            }
        }

        fn load_pages(&mut self, cx: &LoadContext<'_>) -> Result<PageSet> {
            let mut pages = PageSet::new();
            for slug in &self.seen {
                let page = cx.generator("seen")?.generate(PageArgs::new(slug), cx.diagnostics)?;
                merge_pages(&mut pages, page, "counter")?;
            }
            Ok(pages)
        }
    }

    fn registries() -> (MetaProcessors, Generators, Generators) {
        (
            Registry::new("Meta processor"),
            Registry::new("Page generator"),
            Registry::new("Set generator"),
        )
    }

    #[test]
    fn test_register_before_setup_fails() {
        let mut host = ExtensionHost::new(Counter::default());
        let (mut mp, mut pg, mut sg) = registries();

        let err = host
            .register(&mut mp, &mut pg, &mut sg, &Diagnostics::default())
            .unwrap_err();
        assert!(matches!(err, Error::ExtensionNotSetUp { .. }));
        assert_eq!(host.state(), ExtensionState::Unset);
    }

    #[test]
    fn test_produce_before_register_fails() {
        let mut host = ExtensionHost::set_up(Counter::default());
        let err = host.produce(&PageSet::new()).unwrap_err();
        assert!(matches!(err, Error::ExtensionNotRegistered { .. }));
    }

    #[test]
    fn test_produce_combines_state_and_local_set_generators() {
        let mut host = ExtensionHost::set_up(Counter::default());
        let (mut mp, mut pg, mut sg) = registries();
        host.register(&mut mp, &mut pg, &mut sg, &Diagnostics::default())
            .unwrap();
        assert_eq!(host.state(), ExtensionState::Registered);

        let mut meta = Meta::new();
        meta.insert("slug".into(), "intro".into());
        host.process_page(&meta, "", Path::new("intro.md"));

        let pages = host.produce(&PageSet::new()).unwrap();
        let slugs: Vec<_> = pages.keys().cloned().collect();
        assert_eq!(slugs, vec!["articles".to_string(), "seen-intro".to_string()]);
    }

    #[test]
    fn test_internal_collision_fails() {
        let mut host = ExtensionHost::set_up(Counter::default());
        let (mut mp, mut pg, mut sg) = registries();
        host.register(&mut mp, &mut pg, &mut sg, &Diagnostics::default())
            .unwrap();

        let mut meta = Meta::new();
        meta.insert("slug".into(), "x".into());
        host.process_page(&meta, "", Path::new("a.md"));
        host.process_page(&meta, "", Path::new("b.md"));

        assert!(matches!(
            host.produce(&PageSet::new()),
            Err(Error::DuplicateSlug { .. })
        ));
    }
}
