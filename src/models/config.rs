use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Default maximum nesting depth for recursive extraction.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// User configuration from `unnest.yaml`
///
/// Contains extractor settings and the saved password list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub extractor: ExtractorSettings,
    pub passwords: PasswordBook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorSettings {
    /// Path to the external decoder; empty means auto-discover
    pub decoder_path: String,

    /// Default destination directory
    pub output_dir: String,

    pub extract_to_source: bool,

    pub remember_password: bool,

    /// Last used password, only persisted when `remember_password` is set
    pub password: String,

    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    pub debug_mode: bool,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            decoder_path: String::new(),
            output_dir: String::new(),
            extract_to_source: false,
            remember_password: false,
            password: String::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            debug_mode: false,
        }
    }
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

impl ExtractorSettings {
    /// Saved password, if remembering is enabled and one was stored.
    pub fn remembered_password(&self) -> Option<&str> {
        if self.remember_password && !self.password.is_empty() {
            Some(&self.password)
        } else {
            None
        }
    }

    /// Record a password that was used for a run.
    ///
    /// Only kept when `remember_password` is on; otherwise any stored value is cleared.
    pub fn remember(&mut self, password: &str) {
        if self.remember_password {
            self.password = password.to_string();
        } else {
            self.password.clear();
        }
    }
}

/// Ordered, de-duplicated list of saved passwords.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordBook {
    passwords: IndexSet<String>,
}

impl PasswordBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a password. Empty and already-present passwords are rejected.
    pub fn add(&mut self, password: &str) -> bool {
        if password.is_empty() {
            return false;
        }
        self.passwords.insert(password.to_string())
    }

    pub fn remove(&mut self, password: &str) -> bool {
        self.passwords.shift_remove(password)
    }

    /// Replace `old` in place, keeping its position in the list.
    pub fn update(&mut self, old: &str, new: &str) -> bool {
        if new.is_empty() || self.passwords.contains(new) {
            return false;
        }
        let Some(index) = self.passwords.get_index_of(old) else {
            return false;
        };
        self.passwords.insert(new.to_string());
        // insert appends; move the new entry into the old slot, then drop the old one
        let last = self.passwords.len() - 1;
        self.passwords.move_index(last, index);
        self.passwords.shift_remove(old);
        true
    }

    pub fn contains(&self, password: &str) -> bool {
        self.passwords.contains(password)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.passwords.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.passwords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty()
    }

    pub fn clear(&mut self) {
        self.passwords.clear();
    }
}
