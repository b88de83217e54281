use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tera::{Context, Tera};

use crate::error::Result;

/// Template filter that renders a string as a template, so `url_for` calls
/// embedded in page content resolve.
pub const RENDER_FILTER: &str = "flatearth_render";

/// Template function resolving an endpoint to its registered URL.
pub const URL_FOR: &str = "url_for";

type UrlTable = Arc<BTreeMap<String, String>>;

pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn new(template_glob: &str) -> Result<Self> {
        Ok(Self::from_tera(Tera::new(template_glob)?))
    }

    pub fn from_tera(tera: Tera) -> Self {
        let mut renderer = Self { tera };
        renderer.set_urls(BTreeMap::new());
        renderer
    }

    /// Replace the endpoint table seen by `url_for` and `flatearth_render`.
    pub fn set_urls(&mut self, urls: BTreeMap<String, String>) {
        let urls: UrlTable = Arc::new(urls);
        self.tera.register_function(URL_FOR, UrlFor { urls: Arc::clone(&urls) });
        self.tera.register_filter(RENDER_FILTER, RenderFilter { urls });
    }

    pub fn render(&self, template: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template, context)?)
    }

    pub fn tera_mut(&mut self) -> &mut Tera {
        &mut self.tera
    }
}

struct UrlFor {
    urls: UrlTable,
}

impl tera::Function for UrlFor {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        let endpoint = args
            .get("endpoint")
            .and_then(Value::as_str)
            .ok_or_else(|| tera::Error::msg("url_for requires a string `endpoint` argument"))?;

        self.urls
            .get(endpoint)
            .map(|url| Value::String(url.clone()))
            .ok_or_else(|| tera::Error::msg(format!("Could not build url for endpoint '{endpoint}'")))
    }

    fn is_safe(&self) -> bool {
        true
    }
}

struct RenderFilter {
    urls: UrlTable,
}

impl tera::Filter for RenderFilter {
    fn filter(&self, value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
        let Some(source) = value.as_str() else {
            return Ok(value.clone());
        };

        let mut tera = Tera::default();
        tera.register_function(URL_FOR, UrlFor { urls: Arc::clone(&self.urls) });
        tera.render_str(source, &Context::new()).map(Value::String)
    }

    fn is_safe(&self) -> bool {
        true
    }
}
