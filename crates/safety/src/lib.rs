#[derive(Debug, Clone, Default)]
pub struct ConfirmContext {
    pub assume_yes: bool,
    pub confirmation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyDecision {
    Allow,
    Deny(String),
}

/// Snapshot operations that lose data and therefore need confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destructive {
    /// Removes the snapshot for good.
    Delete,
    /// Overwrites the live disk with the snapshot.
    Restore,
}

impl Destructive {
    pub fn verb(self) -> &'static str {
        match self {
            Destructive::Delete => "delete",
            Destructive::Restore => "restore",
        }
    }
}

/// Allows `op` on snapshot `tag` when `assume_yes` is set or the tag was
/// typed back exactly. Surrounding whitespace in the typed text is ignored.
pub fn can_proceed(ctx: &ConfirmContext, op: Destructive, tag: &str) -> SafetyDecision {
    if ctx.assume_yes {
        return SafetyDecision::Allow;
    }

    let Some(typed) = &ctx.confirmation else {
        return SafetyDecision::Deny(format!("Denied: {} requires confirmation", op.verb()));
    };
    if typed.trim() != tag {
        return SafetyDecision::Deny(format!(
            "Denied: confirmation does not match snapshot tag '{}'",
            tag
        ));
    }

    SafetyDecision::Allow
}

pub fn can_restore(ctx: &ConfirmContext, tag: &str) -> SafetyDecision {
    can_proceed(ctx, Destructive::Restore, tag)
}

pub fn can_delete(ctx: &ConfirmContext, tag: &str) -> SafetyDecision {
    can_proceed(ctx, Destructive::Delete, tag)
}
