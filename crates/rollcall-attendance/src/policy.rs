//! Role-based check-in authorization.
//!
//! Decision matrix, in precedence order:
//! 1. self check-in — permitted iff enrolled in the session's class;
//! 2. admin — always permitted (a non-enrolled target is an
//!    observability event for the caller to log, not an error);
//! 3. teacher — permitted iff they teach the class and the target is
//!    enrolled in it;
//! 4. anyone else acting on a third party — denied.
//!
//! The two deny messages are deliberately distinct (self-not-enrolled
//! vs third-party-not-authorized) but say nothing about whether any
//! other identity would have fared better.

use crate::model::{IdentityProfile, Role, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotEnrolled,
    NotAuthorized,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::NotEnrolled => "You are not enrolled in this class.",
            DenyReason::NotAuthorized => "You are not authorized to check in this student.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzDecision {
    Permit {
        /// Set when an admin checks in a student who is not enrolled in
        /// the class. Logged by the orchestrator, never a failure.
        enrollment_mismatch: bool,
    },
    Deny { reason: DenyReason },
}

impl AuthzDecision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, AuthzDecision::Permit { .. })
    }
}

/// Decide whether `acting` may record attendance for `matched` in `session`.
pub fn authorize(
    acting: &IdentityProfile,
    matched: &IdentityProfile,
    session: &Session,
) -> AuthzDecision {
    let enrolled = matched.is_enrolled_in(session.class_id);

    if acting.id == matched.id {
        return if enrolled {
            AuthzDecision::Permit {
                enrollment_mismatch: false,
            }
        } else {
            AuthzDecision::Deny {
                reason: DenyReason::NotEnrolled,
            }
        };
    }

    match acting.role {
        Role::Admin => AuthzDecision::Permit {
            enrollment_mismatch: !enrolled,
        },
        Role::Teacher => {
            if acting.teaches(session.class_id) && enrolled {
                AuthzDecision::Permit {
                    enrollment_mismatch: false,
                }
            } else {
                AuthzDecision::Deny {
                    reason: DenyReason::NotAuthorized,
                }
            }
        }
        Role::Student => AuthzDecision::Deny {
            reason: DenyReason::NotAuthorized,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn profile(id: i64, role: Role, enrolled: &[i64], teaching: &[i64]) -> IdentityProfile {
        IdentityProfile {
            id,
            username: format!("user{id}"),
            full_name: format!("User {id}"),
            role,
            enrolled_classes: enrolled.iter().copied().collect::<BTreeSet<_>>(),
            teaching_classes: teaching.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    fn session(class_id: i64) -> Session {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap();
        Session {
            id: 500,
            class_id,
            start_time: start,
            end_time: start + chrono::Duration::hours(1),
        }
    }

    #[test]
    fn test_student_self_enrolled_permitted() {
        let student = profile(1, Role::Student, &[42], &[]);
        let decision = authorize(&student, &student, &session(42));
        assert_eq!(
            decision,
            AuthzDecision::Permit {
                enrollment_mismatch: false
            }
        );
    }

    #[test]
    fn test_student_self_not_enrolled_denied() {
        let student = profile(1, Role::Student, &[7], &[]);
        let decision = authorize(&student, &student, &session(42));
        assert_eq!(
            decision,
            AuthzDecision::Deny {
                reason: DenyReason::NotEnrolled
            }
        );
    }

    #[test]
    fn test_admin_can_check_in_anyone() {
        let admin = profile(99, Role::Admin, &[], &[]);
        let enrolled = profile(1, Role::Student, &[42], &[]);
        let stranger = profile(2, Role::Student, &[], &[]);

        assert_eq!(
            authorize(&admin, &enrolled, &session(42)),
            AuthzDecision::Permit {
                enrollment_mismatch: false
            }
        );
        // Non-enrolled target: still permitted, flagged for logging.
        assert_eq!(
            authorize(&admin, &stranger, &session(42)),
            AuthzDecision::Permit {
                enrollment_mismatch: true
            }
        );
    }

    #[test]
    fn test_teacher_of_class_with_enrolled_student_permitted() {
        let teacher = profile(50, Role::Teacher, &[], &[42]);
        let student = profile(1, Role::Student, &[42], &[]);
        assert!(authorize(&teacher, &student, &session(42)).is_permitted());
    }

    #[test]
    fn test_teacher_with_non_enrolled_student_denied() {
        let teacher = profile(50, Role::Teacher, &[], &[42]);
        let student = profile(1, Role::Student, &[7], &[]);
        assert_eq!(
            authorize(&teacher, &student, &session(42)),
            AuthzDecision::Deny {
                reason: DenyReason::NotAuthorized
            }
        );
    }

    #[test]
    fn test_teacher_of_unrelated_class_denied() {
        let teacher = profile(50, Role::Teacher, &[], &[7]);
        let student = profile(1, Role::Student, &[42], &[]);
        assert_eq!(
            authorize(&teacher, &student, &session(42)),
            AuthzDecision::Deny {
                reason: DenyReason::NotAuthorized
            }
        );
    }

    #[test]
    fn test_student_cannot_check_in_someone_else() {
        let acting = profile(2, Role::Student, &[42], &[]);
        let target = profile(1, Role::Student, &[42], &[]);
        assert_eq!(
            authorize(&acting, &target, &session(42)),
            AuthzDecision::Deny {
                reason: DenyReason::NotAuthorized
            }
        );
    }

    #[test]
    fn test_deny_messages_are_distinct_and_reveal_nothing() {
        let not_enrolled = DenyReason::NotEnrolled.message();
        let not_authorized = DenyReason::NotAuthorized.message();
        assert_ne!(not_enrolled, not_authorized);
        // Neither message names an identity or a similarity.
        for msg in [not_enrolled, not_authorized] {
            assert!(!msg.contains("similarity"));
            assert!(!msg.contains("match"));
        }
    }
}
