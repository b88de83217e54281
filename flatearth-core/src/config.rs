use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const SEARCH_PATH_KEY: &str = "FLATEARTH_SEARCH_PATH";
pub const FILE_EXT_KEY: &str = "FLATEARTH_FILE_EXT";
pub const DEFAULT_FILE_EXT: &str = ".md";

/// Source file extension setting: one extension or several.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum FileExt {
    One(String),
    Many(Vec<String>),
}

impl Default for FileExt {
    fn default() -> Self {
        FileExt::One(DEFAULT_FILE_EXT.to_string())
    }
}

impl FileExt {
    /// Whether `path` has one of the configured extensions. Case and a
    /// leading dot are ignored.
    pub fn matches(&self, path: &Path) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let ext = ext.to_string_lossy().to_lowercase();
        self.iter().any(|wanted| wanted == ext)
    }

    fn iter(&self) -> impl Iterator<Item = String> + '_ {
        let list: &[String] = match self {
            FileExt::One(ext) => std::slice::from_ref(ext),
            FileExt::Many(exts) => exts,
        };
        list.iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
    }
}

/// Host application settings read by the content generator.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(
        rename = "FLATEARTH_SEARCH_PATH",
        alias = "flatearth_search_path",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub search_path: Option<PathBuf>,
    #[serde(
        rename = "FLATEARTH_FILE_EXT",
        alias = "flatearth_file_ext",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub file_ext: Option<FileExt>,
}

impl Config {
    /// Read settings from a TOML file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&data)?)
    }

    /// Layer an optional TOML file and then the environment.
    ///
    /// Environment variables use the same names as the file keys, e.g.
    /// `FLATEARTH_SEARCH_PATH=./content`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path.filter(|p| p.exists()) {
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Toml),
            );
        }

        for key in [SEARCH_PATH_KEY, FILE_EXT_KEY] {
            if let Ok(value) = std::env::var(key) {
                builder = builder.set_override(key, value)?;
            }
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}
