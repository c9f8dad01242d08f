//! Destructive-action gate

use super::registry::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Allow,
    Deny,
}

/// Deletes go through only with explicit confirmation; everything else passes
pub fn guard(action: Action, confirmed: bool) -> Gate {
    match action {
        Action::Delete if !confirmed => Gate::Deny,
        _ => Gate::Allow,
    }
}
