//! Bundle identity extraction from `Info.plist`.

use crate::delivery::error::{Error, Result};
use std::path::Path;

pub const BUNDLE_IDENTIFIER_KEY: &str = "CFBundleIdentifier";
pub const SHORT_VERSION_KEY: &str = "CFBundleShortVersionString";
pub const BUILD_NUMBER_KEY: &str = "CFBundleVersion";

/// Identity fields read from an application manifest.
///
/// A field is `None` when the key is absent, not a string, or blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleIdentity {
    pub bundle_id: Option<String>,
    pub version: Option<String>,
    pub build_number: Option<String>,
}

/// Parses a property list file (XML or binary) and reads the identity fields.
pub async fn read_bundle_identity(plist_path: &Path) -> Result<BundleIdentity> {
    let bytes = tokio::fs::read(plist_path).await.map_err(|e| {
        Error::infrastructure_with(
            format!("Failed to read Info.plist at {}: {}", plist_path.display(), e),
            e,
        )
    })?;
    parse_bundle_identity(&bytes)
}

/// Reads the identity fields from in-memory property list bytes.
pub fn parse_bundle_identity(bytes: &[u8]) -> Result<BundleIdentity> {
    let value = plist::Value::from_reader(std::io::Cursor::new(bytes))
        .map_err(|e| Error::infrastructure_with(format!("Failed to parse Info.plist: {}", e), e))?;
    let dict = value.as_dictionary().ok_or_else(|| {
        Error::infrastructure("Failed to parse Info.plist: top-level value is not a dictionary.")
    })?;

    let field = |key: &str| {
        dict.get(key)
            .and_then(plist::Value::as_string)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    Ok(BundleIdentity {
        bundle_id: field(BUNDLE_IDENTIFIER_KEY),
        version: field(SHORT_VERSION_KEY),
        build_number: field(BUILD_NUMBER_KEY),
    })
}
