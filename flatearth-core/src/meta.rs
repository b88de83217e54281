use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::registry::Registry;

/// Metadata as read from a source file: field name to raw lines.
pub type RawMeta = BTreeMap<String, Vec<String>>;

/// Metadata after normalization.
pub type Meta = BTreeMap<String, MetaValue>;

/// Fields that stay lists even when they hold a single value.
pub const COLLECTION_FIELDS: &[&str] = &["author"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    Scalar(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Every value held, in order, whatever the shape.
    pub fn values(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            MetaValue::Scalar(s) => Box::new(std::iter::once(s.as_str())),
            MetaValue::List(v) => Box::new(v.iter().map(String::as_str)),
            MetaValue::Set(s) => Box::new(s.iter().map(String::as_str)),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values().any(|v| v == value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Scalar(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Scalar(value)
    }
}

/// Maps one raw metadata field to its normalized value.
///
/// Processors are registered under the field label they handle. The default
/// [`MetaProcessor::process`] fails with [`Error::Unimplemented`]; a
/// processor that reaches it was registered without a policy.
pub trait MetaProcessor {
    fn name(&self) -> &str;

    /// Name of the extension that contributed this processor, if any.
    fn extension(&self) -> Option<&str> {
        None
    }

    fn process(&self, data: &[String]) -> Result<MetaValue> {
        let _ = data;
        Err(Error::Unimplemented {
            what: format!("MetaProcessor {}", self.name()),
        })
    }
}

/// Normalize raw metadata through the processors registered by label.
///
/// Fields without a processor collapse single-element lists to scalars,
/// except [`COLLECTION_FIELDS`].
pub fn normalize(
    raw: &RawMeta,
    processors: &Registry<Box<dyn MetaProcessor>>,
    diagnostics: &Diagnostics,
) -> Result<Meta> {
    let mut meta = Meta::new();
    for (label, values) in raw {
        let value = match processors.get(label) {
            Some(processor) => {
                diagnostics.in_scope(|| {
                    tracing::debug!(label = %label, processor = processor.name(), "processing meta")
                });
                processor.process(values)?
            }
            None => collapse(label, values),
        };
        meta.insert(label.clone(), value);
    }
    Ok(meta)
}

fn collapse(label: &str, values: &[String]) -> MetaValue {
    match values {
        [single] if !COLLECTION_FIELDS.contains(&label) => MetaValue::Scalar(single.clone()),
        _ => MetaValue::List(values.to_vec()),
    }
}
