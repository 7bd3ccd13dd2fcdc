// os-release(5) fields, parsed by rs_release

use crate::error::{ParseOsReleaseSnafu, ReadOsReleaseSnafu, Result};
use snafu::ResultExt;
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    fields: HashMap<Cow<'static, str>, String>,
}

impl OsRelease {
    /// Read and parse the descriptor at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(ReadOsReleaseSnafu { path })?;
        Self::parse(&content, path)
    }

    /// Parse descriptor text; `path` only labels errors
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let fields = rs_release::parse_os_release_str(content).map_err(|e| {
            ParseOsReleaseSnafu {
                path,
                message: e.to_string(),
            }
            .build()
        })?;
        Ok(Self { fields })
    }

    /// Non-empty value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn id(&self) -> Option<&str> {
        self.get("ID")
    }

    /// Whitespace-separated `ID_LIKE` entries
    pub fn id_like(&self) -> Vec<&str> {
        self.get("ID_LIKE")
            .map(|value| value.split_whitespace().collect())
            .unwrap_or_default()
    }
}
