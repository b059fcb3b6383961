//! Demo application toggle

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    /// Serve the TodoMVC demo at `/`
    pub enabled: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileDemo {
    pub enabled: Option<bool>,
}

impl DemoConfig {
    pub fn from_file(file: Option<FileDemo>) -> Self {
        let file = file.unwrap_or_default();
        Self {
            enabled: file.enabled.unwrap_or(Self::default().enabled),
        }
    }
}
