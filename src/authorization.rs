//! Role-based access control.
//!
//! Each request is checked against a fixed role/permission matrix:
//! 1. Admin → FULL ACCESS to everything
//! 2. Receptionist → FULL ACCESS to front-desk work (patients, sales,
//!    sessions, bills), read-only catalogue
//! 3. Therapist → read patients and catalogue, OWN RECORDS for sessions
//! 4. Default → DENY
//!
//! `AccessLevel::OwnRecords` means the caller may act only on sessions
//! assigned to the therapist linked to their user account; handlers apply
//! that restriction.

use crate::models::Role;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ManageUsers,
    /// Treatments, packages, form templates and therapist records.
    ManageCatalogue,
    ViewCatalogue,
    ManagePatients,
    ViewPatients,
    SellPackages,
    /// Book, reschedule and delete sessions.
    ManageSessions,
    /// Status transitions and notes.
    UpdateSessions,
    ViewSessions,
    ManageBills,
    ViewAdminDashboard,
    ViewReceptionDashboard,
    ViewTherapistDashboard,
    ViewAuditLog,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManageUsers => "manage_users",
            Self::ManageCatalogue => "manage_catalogue",
            Self::ViewCatalogue => "view_catalogue",
            Self::ManagePatients => "manage_patients",
            Self::ViewPatients => "view_patients",
            Self::SellPackages => "sell_packages",
            Self::ManageSessions => "manage_sessions",
            Self::UpdateSessions => "update_sessions",
            Self::ViewSessions => "view_sessions",
            Self::ManageBills => "manage_bills",
            Self::ViewAdminDashboard => "view_admin_dashboard",
            Self::ViewReceptionDashboard => "view_reception_dashboard",
            Self::ViewTherapistDashboard => "view_therapist_dashboard",
            Self::ViewAuditLog => "view_audit_log",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Full,
    /// Restricted to the caller's own therapist sessions.
    OwnRecords,
}

/// Why access was granted (or denied), for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    AdminRole,
    FrontDeskRole,
    ClinicalRole,
    AssignedTherapist,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub level: AccessLevel,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allow(level: AccessLevel, reason: AccessReason) -> Self {
        Self {
            allowed: true,
            level,
            reason,
        }
    }

    fn deny() -> Self {
        Self {
            allowed: false,
            level: AccessLevel::OwnRecords,
            reason: AccessReason::Denied,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("Role '{role}' lacks permission '{}'", .permission.as_str())]
    Forbidden { role: Role, permission: Permission },
}

// ═══════════════════════════════════════════════════════════
// Authorization check
// ═══════════════════════════════════════════════════════════

pub fn check_permission(role: Role, permission: Permission) -> AccessDecision {
    use Permission::*;

    // Rule 1: Admin
    if role == Role::Admin {
        return AccessDecision::allow(AccessLevel::Full, AccessReason::AdminRole);
    }

    match (role, permission) {
        // Rule 2: Front desk
        (Role::Receptionist, ManageUsers | ManageCatalogue | ViewAdminDashboard | ViewAuditLog) => {
            AccessDecision::deny()
        }
        (Role::Receptionist, ViewTherapistDashboard) => AccessDecision::deny(),
        (Role::Receptionist, _) => {
            AccessDecision::allow(AccessLevel::Full, AccessReason::FrontDeskRole)
        }

        // Rule 3: Clinical staff
        (Role::Therapist, ViewPatients | ViewCatalogue | ViewTherapistDashboard) => {
            AccessDecision::allow(AccessLevel::Full, AccessReason::ClinicalRole)
        }
        (Role::Therapist, ViewSessions | UpdateSessions) => {
            AccessDecision::allow(AccessLevel::OwnRecords, AccessReason::AssignedTherapist)
        }

        // Rule 4: Default deny
        _ => AccessDecision::deny(),
    }
}

/// `Ok(level)` when allowed, `Forbidden` otherwise.
pub fn require(role: Role, permission: Permission) -> Result<AccessLevel, AuthorizationError> {
    let decision = check_permission(role, permission);
    if decision.allowed {
        Ok(decision.level)
    } else {
        tracing::debug!(%role, permission = permission.as_str(), "Permission denied");
        Err(AuthorizationError::Forbidden { role, permission })
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
