//! AccessScopeGuard: role capability sets plus office scoping.
//!
//! Two independent checks:
//!
//! * **stage authority** ([`AccessScopeGuard::authorize`]) governs workflow
//!   transitions and administrative actions;
//! * **document-category authority** ([`AccessScopeGuard::authorize_document`])
//!   governs upload, replace and verify on a document category.
//!
//! A regional reviewer may replace kabupaten-category documents (category
//! authority) without holding authority over the originating-office stage or
//! over those documents' verification state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DocumentCategory, WorkflowError, WorkflowResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Originating office (kabupaten/kota).
    Operator,
    /// Regional reviewer.
    AdminWilayah,
    /// Central reviewer and reference-data administrator.
    Superadmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CreateSubmission,
    EditDraft,
    Submit,
    RegionalApprove,
    RegionalReject,
    SubmitToCentral,
    FinalApprove,
    FinalReject,
    ReturnToRegional,
    EditJobClassification,
    OverrideStatus,
    DeleteSubmission,
    ManageCatalog,
    ManageTracking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentOperation {
    Upload,
    Replace,
    Verify,
}

const OPERATOR_ACTIONS: &[Action] = &[Action::CreateSubmission, Action::EditDraft, Action::Submit];

const ADMIN_WILAYAH_ACTIONS: &[Action] = &[
    Action::RegionalApprove,
    Action::RegionalReject,
    Action::SubmitToCentral,
];

const SUPERADMIN_ACTIONS: &[Action] = &[
    Action::CreateSubmission,
    Action::EditDraft,
    Action::Submit,
    Action::RegionalApprove,
    Action::RegionalReject,
    Action::SubmitToCentral,
    Action::FinalApprove,
    Action::FinalReject,
    Action::ReturnToRegional,
    Action::EditJobClassification,
    Action::OverrideStatus,
    Action::DeleteSubmission,
    Action::ManageCatalog,
    Action::ManageTracking,
];

const BOTH_CATEGORIES: &[DocumentCategory] =
    &[DocumentCategory::Kabupaten, DocumentCategory::AdminWilayah];

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Operator => "operator",
            Role::AdminWilayah => "admin_wilayah",
            Role::Superadmin => "superadmin",
        }
    }

    pub fn capabilities(self) -> &'static [Action] {
        match self {
            Role::Operator => OPERATOR_ACTIONS,
            Role::AdminWilayah => ADMIN_WILAYAH_ACTIONS,
            Role::Superadmin => SUPERADMIN_ACTIONS,
        }
    }

    pub fn can(self, action: Action) -> bool {
        self.capabilities().contains(&action)
    }

    /// Document categories this role may touch with `operation`.
    pub fn document_authority(self, operation: DocumentOperation) -> &'static [DocumentCategory] {
        match (self, operation) {
            (Role::Superadmin, _) => BOTH_CATEGORIES,
            (Role::Operator, DocumentOperation::Upload) => &[DocumentCategory::Kabupaten],
            (Role::Operator, _) => &[],
            (Role::AdminWilayah, DocumentOperation::Upload) => &[DocumentCategory::AdminWilayah],
            (Role::AdminWilayah, DocumentOperation::Replace) => &[DocumentCategory::Kabupaten],
            (Role::AdminWilayah, DocumentOperation::Verify) => &[DocumentCategory::AdminWilayah],
        }
    }

    /// Whether an upload by this role into `category` is self-attested and
    /// therefore approved immediately.
    pub fn self_attests(self, category: DocumentCategory) -> bool {
        matches!(
            (self, category),
            (Role::AdminWilayah, DocumentCategory::AdminWilayah)
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "operator" => Ok(Role::Operator),
            "admin_wilayah" => Ok(Role::AdminWilayah),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(WorkflowError::validation(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Action::CreateSubmission => "create submissions",
            Action::EditDraft => "edit draft submissions",
            Action::Submit => "submit submissions",
            Action::RegionalApprove => "approve submissions at the regional stage",
            Action::RegionalReject => "reject submissions at the regional stage",
            Action::SubmitToCentral => "submit submissions to the central reviewer",
            Action::FinalApprove => "give final approval",
            Action::FinalReject => "give final rejection",
            Action::ReturnToRegional => "return submissions to the regional reviewer",
            Action::EditJobClassification => "edit job classifications",
            Action::OverrideStatus => "override submission status",
            Action::DeleteSubmission => "delete submissions",
            Action::ManageCatalog => "manage the job requirement catalog",
            Action::ManageTracking => "manage tracking",
        };
        f.write_str(label)
    }
}

impl fmt::Display for DocumentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentOperation::Upload => "upload",
            DocumentOperation::Replace => "replace",
            DocumentOperation::Verify => "verify",
        })
    }
}

/// The acting user for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub office_id: Option<Uuid>,
}

impl Principal {
    /// Principals without an office affiliation act centrally and see every
    /// office.
    pub fn is_unrestricted(&self) -> bool {
        self.office_id.is_none()
    }

    pub fn in_scope(&self, owning_office: Uuid) -> bool {
        match self.office_id {
            None => true,
            Some(office) => office == owning_office,
        }
    }
}

pub struct AccessScopeGuard;

impl AccessScopeGuard {
    pub fn can_view(principal: &Principal, owning_office: Uuid) -> bool {
        principal.in_scope(owning_office)
    }

    pub fn ensure_view(principal: &Principal, owning_office: Uuid) -> WorkflowResult<()> {
        if Self::can_view(principal, owning_office) {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(
                "submission belongs to another office",
            ))
        }
    }

    /// Actions that are not bound to an existing submission (catalog and
    /// tracking administration).
    pub fn authorize_global(principal: &Principal, action: Action) -> WorkflowResult<()> {
        if principal.role.can(action) {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(format!(
                "role {} may not {action}",
                principal.role
            )))
        }
    }

    /// Stage authority: the role's capability set must include `action` and
    /// the submission must be inside the principal's office scope.
    pub fn authorize(
        principal: &Principal,
        action: Action,
        owning_office: Uuid,
    ) -> WorkflowResult<()> {
        Self::authorize_global(principal, action)?;
        Self::ensure_view(principal, owning_office)
    }

    /// Document-category authority, independent of stage authority.
    pub fn authorize_document(
        principal: &Principal,
        operation: DocumentOperation,
        category: DocumentCategory,
        owning_office: Uuid,
    ) -> WorkflowResult<()> {
        if !principal
            .role
            .document_authority(operation)
            .contains(&category)
        {
            return Err(WorkflowError::forbidden(format!(
                "role {} may not {operation} {category} documents",
                principal.role
            )));
        }
        Self::ensure_view(principal, owning_office)
    }
}
