//! Monoline placement and sponsor-tree moves

use super::plan::MAX_LEVELS;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("a member cannot sponsor themself")]
    SelfSponsor,
    #[error("new sponsor is inside the member's own downline")]
    Cycle,
}

/// Next free slot at the end of the line
pub fn next_monoline_position(current_max: Option<i64>) -> i64 {
    current_max.map_or(1, |max| max.max(0) + 1)
}

/// Downline depth reported to members, capped at the payout depth
pub fn network_depth(deepest_level: i64) -> i64 {
    deepest_level.clamp(0, MAX_LEVELS as i64)
}

/// `new_sponsor_ancestors` is the sponsor chain above the new sponsor,
/// nearest first. If the moved member shows up there the move would close a loop.
pub fn validate_move(
    member_id: &str,
    new_sponsor_id: &str,
    new_sponsor_ancestors: &[String],
) -> Result<(), MoveError> {
    if member_id == new_sponsor_id {
        return Err(MoveError::SelfSponsor);
    }
    if new_sponsor_ancestors.iter().any(|a| a == member_id) {
        return Err(MoveError::Cycle);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_position_is_one() {
        assert_eq!(next_monoline_position(None), 1);
        assert_eq!(next_monoline_position(Some(41)), 42);
    }

    #[test]
    fn test_network_depth_cap() {
        assert_eq!(network_depth(0), 0);
        assert_eq!(network_depth(3), 3);
        assert_eq!(network_depth(12), 7);
    }

    #[test]
    fn test_move_rejects_self_and_cycles() {
        assert_eq!(validate_move("a", "a", &[]), Err(MoveError::SelfSponsor));
        // c's ancestors are b, a: moving a under c would loop
        let ancestors = vec!["b".to_string(), "a".to_string()];
        assert_eq!(validate_move("a", "c", &ancestors), Err(MoveError::Cycle));
        assert_eq!(validate_move("x", "c", &ancestors), Ok(()));
    }
}
