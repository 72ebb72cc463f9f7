//! Canonical identifiers for loadable units

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Kind of resource a key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Lazily loaded view/page module
    Route,
    /// Image asset
    Image,
    /// Font file
    Font,
    /// Stylesheet
    Stylesheet,
    /// Cheap API existence probe
    ApiProbe,
}

/// Opaque identifier for a loadable unit.
///
/// Keys are trimmed on construction so that two spellings of the same
/// resource land on the same map slot. Cloning is a refcount bump.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    /// Create a key
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref().trim()))
    }

    /// Borrow the key text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Infer the resource kind from the key shape
    pub fn kind(&self) -> ResourceKind {
        let path = self.0.split(['?', '#']).next().unwrap_or_default();
        if path.starts_with("/api/") || path.contains("/api/") {
            return ResourceKind::ApiProbe;
        }

        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "avif" | "ico" => {
                ResourceKind::Image
            }
            "woff" | "woff2" | "ttf" | "otf" => ResourceKind::Font,
            "css" => ResourceKind::Stylesheet,
            _ => ResourceKind::Route,
        }
    }
}

impl fmt::Debug for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceKey({:?})", &*self.0)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ResourceKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}
