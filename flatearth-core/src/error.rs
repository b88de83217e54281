use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Slug cannot be empty for {class}")]
    EmptySlug { class: &'static str },

    #[error("{kind} '{name}' already registered")]
    DuplicateRegistration { kind: &'static str, name: String },

    #[error("Extension '{name}' registration failed, extension not set up")]
    ExtensionNotSetUp { name: String },

    #[error("Extension '{name}' not yet registered with a generator")]
    ExtensionNotRegistered { name: String },

    #[error("Attempting to register view before registering rules for '{slug}'")]
    ViewBeforeRules { slug: String },

    #[error("Page '{slug}' already present, attempted duplicate by {origin}")]
    DuplicateSlug { slug: String, origin: String },

    #[error("Source {} has no '{field}' metadata", path.display())]
    MissingMeta { field: &'static str, path: PathBuf },

    #[error("No page generator for content type '{content_type}' in {}", path.display())]
    UnknownContentType { content_type: String, path: PathBuf },

    #[error("Rule '{rule}' needs a value for '{{{param}}}'")]
    MissingRuleParam { rule: String, param: String },

    #[error("No generator registered as '{name}'")]
    MissingGenerator { name: String },

    #[error("{what} is not implemented")]
    Unimplemented { what: String },

    #[error("No source loader configured")]
    MissingLoader,

    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Config error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Scan error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_param_message_keeps_braces() {
        let err = Error::MissingRuleParam {
            rule: "/{year}/{slug}/".into(),
            param: "year".into(),
        };
        assert_eq!(
            err.to_string(),
            "Rule '/{year}/{slug}/' needs a value for '{year}'"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }
}
