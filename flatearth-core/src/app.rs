//! The web application collaborator.
//!
//! Pages register their URL rules and views through [`WebApp`]. [`App`] is
//! the built-in implementation: a routing table, a view table and a tera
//! renderer that knows about every registered endpoint.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tera::{Context, Tera};

use crate::config::Config;
use crate::error::Result;
use crate::template::TemplateRenderer;

/// Zero-argument view bound to an endpoint.
pub type View = Arc<dyn Fn() -> String + Send + Sync>;

pub trait WebApp {
    /// Host settings; see [`crate::config`] for the keys read.
    fn config(&self) -> &Config;

    fn add_url_rule(&mut self, rule: &str, endpoint: &str) -> Result<()>;

    /// Render a named template. Every rule registered so far resolves
    /// through `url_for`.
    fn render_template(&mut self, template: &str, context: &Context) -> Result<String>;

    fn set_view(&mut self, endpoint: &str, view: View);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub rule: String,
    pub endpoint: String,
}

pub struct App {
    config: Config,
    renderer: TemplateRenderer,
    url_map: Vec<Rule>,
    views: BTreeMap<String, View>,
    urls_dirty: bool,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("url_map", &self.url_map)
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl App {
    /// Load templates matching a glob, e.g. `templates/**/*.html`.
    pub fn new(template_glob: &str) -> Result<Self> {
        Ok(Self::from_renderer(TemplateRenderer::new(template_glob)?))
    }

    pub fn from_tera(tera: Tera) -> Self {
        Self::from_renderer(TemplateRenderer::from_tera(tera))
    }

    fn from_renderer(renderer: TemplateRenderer) -> Self {
        Self {
            config: Config::default(),
            renderer,
            url_map: Vec::new(),
            views: BTreeMap::new(),
            urls_dirty: false,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.url_map
    }

    pub fn view(&self, endpoint: &str) -> Option<View> {
        self.views.get(endpoint).cloned()
    }

    /// URL of the first rule registered for `endpoint`.
    pub fn url_for(&self, endpoint: &str) -> Option<&str> {
        self.url_map
            .iter()
            .find(|r| r.endpoint == endpoint)
            .map(|r| r.rule.as_str())
    }

    /// Dispatch a request path to its view. A path without its trailing
    /// slash matches the slashed rule.
    pub fn respond(&self, path: &str) -> Option<String> {
        let slashed = format!("{}/", path.trim_end_matches('/'));
        let rule = self
            .url_map
            .iter()
            .find(|r| r.rule == path)
            .or_else(|| self.url_map.iter().find(|r| r.rule == slashed))?;
        self.views.get(&rule.endpoint).map(|view| view())
    }

    /// Every routed path with its endpoint's view, first registration per
    /// path only. Rules whose endpoint has no view are skipped.
    pub fn routes(&self) -> impl Iterator<Item = (&str, View)> + '_ {
        self.url_map.iter().enumerate().filter_map(|(i, r)| {
            if self.url_map[..i].iter().any(|earlier| earlier.rule == r.rule) {
                return None;
            }
            self.views
                .get(&r.endpoint)
                .map(|view| (r.rule.as_str(), Arc::clone(view)))
        })
    }

    pub fn tera_mut(&mut self) -> &mut Tera {
        self.renderer.tera_mut()
    }

    fn endpoint_urls(&self) -> BTreeMap<String, String> {
        let mut urls = BTreeMap::new();
        for rule in &self.url_map {
            urls.entry(rule.endpoint.clone())
                .or_insert_with(|| rule.rule.clone());
        }
        urls
    }
}

impl WebApp for App {
    fn config(&self) -> &Config {
        &self.config
    }

    fn add_url_rule(&mut self, rule: &str, endpoint: &str) -> Result<()> {
        if self.url_map.iter().any(|r| r.rule == rule) {
            tracing::debug!(rule, endpoint, "rule already routed, first registration wins");
        }
        self.url_map.push(Rule {
            rule: rule.to_string(),
            endpoint: endpoint.to_string(),
        });
        self.urls_dirty = true;
        Ok(())
    }

    fn render_template(&mut self, template: &str, context: &Context) -> Result<String> {
        if self.urls_dirty {
            let urls = self.endpoint_urls();
            self.renderer.set_urls(urls);
            self.urls_dirty = false;
        }
        self.renderer.render(template, context)
    }

    fn set_view(&mut self, endpoint: &str, view: View) {
        self.views.insert(endpoint.to_string(), view);
    }
}
