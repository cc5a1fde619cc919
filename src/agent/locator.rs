//! Classification of page locators where no content agent can ever run.

use serde::{Deserialize, Serialize};

/// Why a context cannot host a content agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    BrowserInternal,
    LocalFile,
    OpaqueResource,
    ExtensionPage,
    WebStore,
    MissingLocator,
}

impl Restriction {
    pub fn as_str(self) -> &'static str {
        match self {
            Restriction::BrowserInternal => "browser_internal",
            Restriction::LocalFile => "local_file",
            Restriction::OpaqueResource => "opaque_resource",
            Restriction::ExtensionPage => "extension_page",
            Restriction::WebStore => "web_store",
            Restriction::MissingLocator => "missing_locator",
        }
    }
}

impl std::fmt::Display for Restriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const RESTRICTED_PREFIXES: &[(&str, Restriction)] = &[
    ("chrome://", Restriction::BrowserInternal),
    ("chrome-untrusted://", Restriction::BrowserInternal),
    ("chrome-search://", Restriction::BrowserInternal),
    ("devtools://", Restriction::BrowserInternal),
    ("edge://", Restriction::BrowserInternal),
    ("brave://", Restriction::BrowserInternal),
    ("opera://", Restriction::BrowserInternal),
    ("vivaldi://", Restriction::BrowserInternal),
    ("about:", Restriction::BrowserInternal),
    ("view-source:", Restriction::BrowserInternal),
    ("file://", Restriction::LocalFile),
    ("data:", Restriction::OpaqueResource),
    ("blob:", Restriction::OpaqueResource),
    ("chrome-extension://", Restriction::ExtensionPage),
    ("moz-extension://", Restriction::ExtensionPage),
    ("extension://", Restriction::ExtensionPage),
    ("https://chrome.google.com/webstore", Restriction::WebStore),
    ("https://chromewebstore.google.com", Restriction::WebStore),
];

/// Classify a locator; `None` means an agent may be activated there.
pub fn classify_locator(locator: &str) -> Option<Restriction> {
    let trimmed = locator.trim();
    if trimmed.is_empty() {
        return Some(Restriction::MissingLocator);
    }
    let lowered = trimmed.to_ascii_lowercase();
    RESTRICTED_PREFIXES
        .iter()
        .find(|(prefix, _)| lowered.starts_with(prefix))
        .map(|(_, restriction)| *restriction)
}

pub fn is_context_restricted(locator: &str) -> bool {
    classify_locator(locator).is_some()
}
