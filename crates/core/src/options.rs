//! Option Set (C2): the recognized construction-time knobs.
//!
//! An `Options` value is immutable once an engine is built from it; the
//! per-call option groups ([`GetOptions`], [`SetOptions`], [`DeleteOptions`])
//! are separate, cheap, `Default`-able records passed to individual calls.

use crate::key::DEFAULT_SEPARATOR;
use crate::Timestamp;

/// Construction-time configuration shared by every engine.
///
/// ```
/// use stratakv_core::Options;
///
/// let opts = Options::default();
/// assert_eq!(opts.separator(), ".");
/// assert_eq!(opts.default_limit(), 10);
/// assert!(!opts.auto_clean());
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    auto_clean: bool,
    separator: String,
    default_limit: i64,
    debug: bool,
}

impl Options {
    /// Start from the defaults and customize with a builder chain.
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Enable background sweeping via the cleanup scheduler.
    pub fn auto_clean(&self) -> bool {
        self.auto_clean
    }

    /// The key-path separator.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Default child-page size when a caller requests children with limit 0.
    pub fn default_limit(&self) -> i64 {
        self.default_limit
    }

    /// Verbose backend diagnostics.
    pub fn debug(&self) -> bool {
        self.debug
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            auto_clean: false,
            separator: DEFAULT_SEPARATOR.to_string(),
            default_limit: 10,
            debug: false,
        }
    }
}

/// Fluent builder for [`Options`].
#[derive(Debug, Clone, Default)]
pub struct OptionsBuilder {
    inner: OptionsOverrides,
}

#[derive(Debug, Clone, Default)]
struct OptionsOverrides {
    auto_clean: Option<bool>,
    separator: Option<String>,
    default_limit: Option<i64>,
    debug: Option<bool>,
}

impl OptionsBuilder {
    /// Enable background sweeping.
    pub fn auto_clean(mut self, enabled: bool) -> Self {
        self.inner.auto_clean = Some(enabled);
        self
    }

    /// Override the key-path separator.
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.inner.separator = Some(separator.into());
        self
    }

    /// Override the default child-page size.
    pub fn default_limit(mut self, limit: i64) -> Self {
        self.inner.default_limit = Some(limit);
        self
    }

    /// Enable verbose backend diagnostics.
    pub fn debug(mut self, enabled: bool) -> Self {
        self.inner.debug = Some(enabled);
        self
    }

    /// Finalize into an immutable [`Options`].
    pub fn build(self) -> Options {
        let defaults = Options::default();
        Options {
            auto_clean: self.inner.auto_clean.unwrap_or(defaults.auto_clean),
            separator: self.inner.separator.unwrap_or(defaults.separator),
            default_limit: self.inner.default_limit.unwrap_or(defaults.default_limit),
            debug: self.inner.debug.unwrap_or(defaults.debug),
        }
    }
}

/// Per-call options for `get`/`get-multi`.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Whether to enumerate children alongside the node itself.
    pub children: bool,
    /// Pagination cursor: a bare or full key, strictly-greater-than bound.
    pub start: String,
    /// Page size. Zero with `children` requested means "use the option-set
    /// default"; negative or omitted means "no limit"; zero with `children`
    /// disabled means "return the node without children".
    pub limit: i64,
}

impl GetOptions {
    /// Request children starting from the beginning, with no limit.
    pub fn children() -> Self {
        GetOptions {
            children: true,
            start: String::new(),
            limit: -1,
        }
    }

    /// Resolve the effective page size given an option set's default.
    ///
    /// ```
    /// use stratakv_core::options::GetOptions;
    ///
    /// let mut opts = GetOptions { children: true, start: String::new(), limit: 0 };
    /// assert_eq!(opts.effective_limit(10), Some(10));
    /// opts.limit = -1;
    /// assert_eq!(opts.effective_limit(10), None);
    /// opts.limit = 3;
    /// assert_eq!(opts.effective_limit(10), Some(3));
    /// ```
    pub fn effective_limit(&self, default_limit: i64) -> Option<i64> {
        if !self.children {
            return Some(0);
        }
        if self.limit == 0 {
            Some(default_limit)
        } else if self.limit < 0 {
            None
        } else {
            Some(self.limit)
        }
    }
}

/// Per-call options for `set`/`set-multi`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Expiry instant; [`Timestamp::EPOCH`] (the default) means "never expires".
    pub expire_at: Timestamp,
}

/// Per-call options for `delete`/`delete-multi`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Also delete every descendant of the targeted key(s).
    pub children: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = Options::default();
        assert_eq!(opts.separator(), ".");
        assert_eq!(opts.default_limit(), 10);
        assert!(!opts.auto_clean());
        assert!(!opts.debug());
    }

    #[test]
    fn builder_overrides_selectively() {
        let opts = Options::builder().separator("/").auto_clean(true).build();
        assert_eq!(opts.separator(), "/");
        assert!(opts.auto_clean());
        assert_eq!(opts.default_limit(), 10);
    }

    #[test]
    fn effective_limit_zero_uses_default_when_children_requested() {
        let opts = GetOptions {
            children: true,
            start: String::new(),
            limit: 0,
        };
        assert_eq!(opts.effective_limit(10), Some(10));
    }

    #[test]
    fn effective_limit_negative_means_unbounded() {
        let opts = GetOptions {
            children: true,
            start: String::new(),
            limit: -1,
        };
        assert_eq!(opts.effective_limit(10), None);
    }

    #[test]
    fn effective_limit_zero_without_children_means_node_only() {
        let opts = GetOptions {
            children: false,
            start: String::new(),
            limit: 0,
        };
        assert_eq!(opts.effective_limit(10), Some(0));
    }
}
