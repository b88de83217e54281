pub mod app;
pub mod config;
pub mod content;
pub mod diagnostics;
pub mod error;
pub mod extension;
pub mod generator;
pub mod markdown;
pub mod meta;
pub mod page;
pub mod registry;
pub mod scanner;
pub mod template;
pub mod topics;

// Re-export main types
pub use app::{App, View, WebApp};
pub use config::{Config, FileExt};
pub use content::{ContentGenerator, ContentGeneratorBuilder};
pub use diagnostics::{Diagnostics, Warning};
pub use error::{Error, Result};
pub use extension::{ContentExtension, ExtensionHost, ExtensionState, LoadContext, Registrar};
pub use generator::{ClassGenerator, PageGenerator, PageSet};
pub use markdown::{MarkdownLoader, Source, SourceLoader};
pub use meta::{Meta, MetaProcessor, MetaValue, RawMeta};
pub use page::{Page, PageArgs, PageClass, Rules};
pub use template::TemplateRenderer;
pub use topics::{TopicExtension, TopicMetaProcessor};
