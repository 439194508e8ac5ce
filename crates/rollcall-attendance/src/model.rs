use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Closed set of principal roles. Adding a role is a compile-time
/// decision point: the authorization policy matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// An enrolled principal as resolved by the identity directory.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityProfile {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    /// Class ids the identity is enrolled in (students).
    pub enrolled_classes: BTreeSet<i64>,
    /// Class ids the identity teaches (teachers).
    pub teaching_classes: BTreeSet<i64>,
}

impl IdentityProfile {
    pub fn is_enrolled_in(&self, class_id: i64) -> bool {
        self.enrolled_classes.contains(&class_id)
    }

    pub fn teaches(&self, class_id: i64) -> bool {
        self.teaching_classes.contains(&class_id)
    }
}

/// A scheduled class occurrence. Referenced, never mutated, during
/// verification.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: i64,
    pub class_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Attendance status. Absence is implicit: no record means absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

/// The durable attendance entity, unique per (student, session).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub student_id: i64,
    pub session_id: i64,
    pub status: AttendanceStatus,
    /// None for records created by manual override without a check-in.
    pub check_in_time: Option<DateTime<Utc>>,
    pub late_minutes: i64,
}
