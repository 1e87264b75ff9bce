use serde::{Deserialize, Serialize};

/// Slot holding the application state of the quote wizard.
pub const APP_STATE: &str = "app-state";
/// Slot holding the per-device secret that anchors key derivation.
pub const DEVICE_SECRET: &str = "device-secret";

/// Slots every backup carries.
pub const DEFAULT_SLOTS: &[&str] = &[
    APP_STATE,
    "app-quotes",
    "app-docintel",
    "dark-mode-flag",
    "coi-draft",
    "email-drafts",
    "quickref-cards",
    DEVICE_SECRET,
];

/// Prefixes of dynamically created slots (export history, CGL state) picked up at export time.
/// Underscore forms are the names earlier releases wrote.
pub const DEFAULT_PREFIXES: &[&str] = &["altech-", "cgl-", "altech_", "cgl_"];

/// Set of slots considered "backed up": a fixed list plus name prefixes
/// matched against whatever the store holds at export time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRegistry {
    pub slots: Vec<String>,
    pub prefixes: Vec<String>,
}

impl Default for SlotRegistry {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS.iter().map(|s| s.to_string()).collect(),
            prefixes: DEFAULT_PREFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SlotRegistry {
    pub fn is_registered(&self, slot: &str) -> bool {
        self.slots.iter().any(|s| s == slot)
    }

    pub fn matches_prefix(&self, slot: &str) -> bool {
        self.prefixes.iter().any(|p| slot.starts_with(p.as_str()))
    }

    /// Registered slots in declaration order, followed by discovered slots
    /// matching a prefix that are not already registered.
    pub fn resolve<'a>(&self, present: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut out = self.slots.clone();
        for name in present {
            if self.matches_prefix(name) && !out.iter().any(|s| s == name) {
                out.push(name.to_string());
            }
        }
        out
    }
}
