//! Runtime settings.
//!
//! Settings are thread-local, like the rest of the runtime state. They are read
//! when a region is created, so changing them only affects regions created
//! afterwards.

use std::cell::RefCell;

// =============================================================================
// Anchor Mode
// =============================================================================

/// Host node used as a region's anchor marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnchorMode {
    /// A comment node whose data is the region id. Visible in markup dumps.
    #[default]
    Comment,
    /// An empty text node. Invisible; the node itself carries no id, so
    /// resolve it with [`region_of`](crate::region_of) and read
    /// [`Region::id`](crate::Region::id) instead.
    Text,
}

// =============================================================================
// Runtime Config
// =============================================================================

/// All runtime settings in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Anchor marker variant for new regions.
    pub anchor_mode: AnchorMode,
    /// Prefix of generated region ids (`{prefix}-{n}`).
    pub anchor_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            anchor_mode: AnchorMode::default(),
            anchor_prefix: "fg".to_string(),
        }
    }
}

thread_local! {
    static CONFIG: RefCell<RuntimeConfig> = RefCell::new(RuntimeConfig::default());
}

/// Replace the runtime settings.
pub fn configure(config: RuntimeConfig) {
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Current runtime settings.
pub fn config() -> RuntimeConfig {
    CONFIG.with(|c| c.borrow().clone())
}

/// Current anchor mode.
pub fn anchor_mode() -> AnchorMode {
    CONFIG.with(|c| c.borrow().anchor_mode)
}

/// Set the anchor mode for regions created from now on.
pub fn set_anchor_mode(mode: AnchorMode) {
    CONFIG.with(|c| c.borrow_mut().anchor_mode = mode);
}

pub(crate) fn anchor_prefix() -> String {
    CONFIG.with(|c| c.borrow().anchor_prefix.clone())
}

/// Restore default settings (for testing).
pub fn reset_config() {
    configure(RuntimeConfig::default());
}
