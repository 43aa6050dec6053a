//! Editor configuration.

use crate::constraint::DEFAULT_MAX_ITERATIONS;

/// Configuration for an [`Editor`](crate::editor::Editor).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditorConfig {
    /// Maximum number of undoable actions (`None` for unbounded).
    pub max_undo_depth: Option<usize>,
    /// Run constraint resolution over the page after every transaction.
    pub resolve_constraints: bool,
    /// Cap on full constraint passes per transaction.
    pub max_iterations: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: None,
            resolve_constraints: true,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Builder for editor configuration.
pub struct EditorConfigBuilder {
    config: EditorConfig,
}

impl EditorConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: EditorConfig::default(),
        }
    }

    pub fn max_undo_depth(mut self, depth: usize) -> Self {
        self.config.max_undo_depth = Some(depth);
        self
    }

    pub fn unbounded_undo(mut self) -> Self {
        self.config.max_undo_depth = None;
        self
    }

    pub fn resolve_constraints(mut self, enabled: bool) -> Self {
        self.config.resolve_constraints = enabled;
        self
    }

    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.config.max_iterations = iterations;
        self
    }

    pub fn build(self) -> EditorConfig {
        self.config
    }
}

impl Default for EditorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
