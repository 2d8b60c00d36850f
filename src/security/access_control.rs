//! Menu-based access control.
//!
//! A caller is allowed a path when any granted menu's `path`, `url` or
//! `permission` covers it. No menus means no access.

use std::fmt;
use std::sync::Arc;

use crate::security::claims::Menu;
use crate::security::pattern::PathMatcher;

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoMenusGranted,
    PathNotAuthorized,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::NoMenusGranted => "No menu permissions granted",
            DenyReason::PathNotAuthorized => "Not authorized to access this path",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny(DenyReason),
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionDecision::Allow)
    }
}

/// Evaluates menu grants against request paths.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    matcher: Arc<dyn PathMatcher>,
    prefix_match: bool,
}

impl PermissionGate {
    /// `prefix_match` enables the plain string-prefix fallback, which is
    /// looser than the glob rules (`/api` also covers `/api-internal`).
    pub fn new(matcher: Arc<dyn PathMatcher>, prefix_match: bool) -> Self {
        Self {
            matcher,
            prefix_match,
        }
    }

    pub fn check(&self, path: &str, menus: &[Menu]) -> PermissionDecision {
        if menus.is_empty() {
            return PermissionDecision::Deny(DenyReason::NoMenusGranted);
        }

        let granted = menus
            .iter()
            .flat_map(|menu| menu.candidates())
            .any(|candidate| self.covers(candidate, path));

        if granted {
            PermissionDecision::Allow
        } else {
            PermissionDecision::Deny(DenyReason::PathNotAuthorized)
        }
    }

    fn covers(&self, candidate: &str, path: &str) -> bool {
        if self.matcher.matches(candidate, path) {
            return true;
        }
        let subtree = format!("{}/**", candidate.trim_end_matches('/'));
        if self.matcher.matches(&subtree, path) {
            return true;
        }
        self.prefix_match && path.starts_with(candidate)
    }
}
