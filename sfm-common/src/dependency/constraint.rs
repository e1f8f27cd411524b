//! Merging of two constraints discovered for the same formula via
//! different paths in the dependency graph.

use std::cmp::Ordering;

use tracing::debug;

use crate::error::{Result, SfmError};
use crate::model::version::{compare_versions, Comparator, VersionConstraint};

/// Combine a newly discovered constraint with the currently recorded one.
///
/// Precedence: an equality pin already in place is sticky; a new equality
/// pin overrides inequalities; two lower bounds keep the tighter (greater)
/// one; two upper bounds keep the tighter (lesser) one. Opposite bounds are
/// rejected outright, although some would be resolvable in practice.
pub fn resolve_constraints(
    new: &VersionConstraint,
    current: &VersionConstraint,
) -> Result<VersionConstraint> {
    let (new_comparator, current_comparator) = match (new.comparator, current.comparator) {
        (None, None) => return Ok(VersionConstraint::unconstrained()),
        (None, Some(_)) => return Ok(current.clone()),
        (Some(_), None) => return Ok(new.clone()),
        (Some(n), Some(c)) => (n, c),
    };

    debug!("Resolving constraints '{new}' against '{current}'");

    if current_comparator == Comparator::Equal {
        return Ok(current.clone());
    }
    if new_comparator == Comparator::Equal {
        return Ok(new.clone());
    }
    if new_comparator != current_comparator {
        return Err(SfmError::ConstraintResolution(format!(
            "Contradictory constraints '{new}' and '{current}'"
        )));
    }

    let ordering = compare_versions(&new.tag, &current.tag);
    let merged = match new_comparator {
        // Tightest lower bound wins.
        Comparator::AtLeast if ordering == Ordering::Greater => new.clone(),
        Comparator::AtLeast => current.clone(),
        // Tightest upper bound wins.
        Comparator::AtMost if ordering == Ordering::Less => new.clone(),
        Comparator::AtMost => current.clone(),
        Comparator::Equal => unreachable!("equality handled above"),
    };
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(raw: &str) -> VersionConstraint {
        VersionConstraint::parse(raw)
    }

    #[test]
    fn both_empty_stays_unconstrained() {
        let merged = resolve_constraints(&constraint(""), &constraint("")).unwrap();
        assert!(merged.is_unconstrained());
    }

    #[test]
    fn non_empty_side_wins_over_empty() {
        let merged = resolve_constraints(&constraint(""), &constraint("==v1.0.0")).unwrap();
        assert_eq!(merged.to_string(), "==v1.0.0");

        let merged = resolve_constraints(&constraint(">=v1.0.0"), &constraint("")).unwrap();
        assert_eq!(merged.to_string(), ">=v1.0.0");
    }

    #[test]
    fn equality_wins_regardless_of_argument_order() {
        let merged = resolve_constraints(&constraint("==v1.0"), &constraint(">=v0.9")).unwrap();
        assert_eq!(merged.to_string(), "==v1.0");

        let merged = resolve_constraints(&constraint(">=v0.9"), &constraint("==v1.0")).unwrap();
        assert_eq!(merged.to_string(), "==v1.0");
    }

    #[test]
    fn current_equality_pin_is_sticky() {
        let merged = resolve_constraints(&constraint("==v2.0"), &constraint("==v1.0")).unwrap();
        assert_eq!(merged.to_string(), "==v1.0");
    }

    #[test]
    fn greater_lower_bound_wins() {
        let merged = resolve_constraints(&constraint(">=v1.0.0"), &constraint(">=v2.0.0")).unwrap();
        assert_eq!(merged.to_string(), ">=v2.0.0");

        let merged = resolve_constraints(&constraint(">=v3.0.0"), &constraint(">=v2.0.0")).unwrap();
        assert_eq!(merged.to_string(), ">=v3.0.0");
    }

    #[test]
    fn lesser_upper_bound_wins() {
        let merged = resolve_constraints(&constraint("<=v1.0.0"), &constraint("<=v2.0.0")).unwrap();
        assert_eq!(merged.to_string(), "<=v1.0.0");
    }

    #[test]
    fn lower_bound_comparison_is_semantic() {
        // Lexicographically "v9.0.0" > "v10.0.0"; semantically it is not.
        let merged = resolve_constraints(&constraint(">=v9.0.0"), &constraint(">=v10.0.0")).unwrap();
        assert_eq!(merged.to_string(), ">=v10.0.0");
    }

    #[test]
    fn contradictory_bounds_are_rejected() {
        let err = resolve_constraints(&constraint(">=v1.0"), &constraint("<=v2.0")).unwrap_err();
        assert!(matches!(err, SfmError::ConstraintResolution(_)));
    }
}
