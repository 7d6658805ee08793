//! Branch policy for the publish stage.

use super::trigger::{Trigger, TriggerKind};

/// Whether a successful build of `trigger` may be published.
///
/// Only pushes to the release branch publish. Pull requests validate the
/// build and stop, even when their head branch is named like the release branch.
pub fn publish_eligible(trigger: &Trigger, release_branch: &str) -> bool {
    trigger.kind == TriggerKind::Push && trigger.branch == release_branch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_to_release_branch() {
        let trigger = Trigger::push("main", "abc123").unwrap();
        assert!(publish_eligible(&trigger, "main"));
        assert!(!publish_eligible(&trigger, "trunk"));
    }

    #[test]
    fn test_feature_branch() {
        let trigger = Trigger::push("feature/x", "abc123").unwrap();
        assert!(!publish_eligible(&trigger, "main"));
    }

    #[test]
    fn test_branch_match_is_exact() {
        assert!(!publish_eligible(&Trigger::push("Main", "a1").unwrap(), "main"));
        assert!(!publish_eligible(&Trigger::push("main2", "a1").unwrap(), "main"));
    }

    #[test]
    fn test_pull_request_never_publishes() {
        let trigger = Trigger::pull_request("main", "abc123").unwrap();
        assert!(!publish_eligible(&trigger, "main"));
    }
}
