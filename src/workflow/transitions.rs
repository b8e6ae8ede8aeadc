//! The submission lifecycle.
//!
//! ```text
//! draft ──submit──▶ submitted ──regional_approve──▶ admin_wilayah_approved
//!                       │                                   │
//!                       └─regional_reject─▶ rejected        └─submit_to_central─┐
//!                                                                                ▼
//!   admin_wilayah_rejected ◀──return_to_regional── admin_wilayah_submitted ◀─────┤
//!            │                                        │        │                  │
//!            └──────────submit_to_central (resubmit)──┼────────┼──────────────────┘
//!                                                     │        └─final_reject─▶ final_rejected
//!                                                     └─final_approve─▶ final_approved
//! ```
//!
//! `approved` and `resubmitted` are only reachable through the audited
//! administrative status override.

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    require_reason, Action, CompletenessReport, Principal, SubmissionStatus, WorkflowError,
    WorkflowResult,
};
use crate::models::Submission;
use crate::utils::time::to_iso;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Submit,
    RegionalApprove,
    RegionalReject { reason: String },
    SubmitToCentral,
    FinalApprove,
    FinalReject { reason: String },
    ReturnToRegional { reason: String },
}

/// One changed column, recorded as one audit entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            field: field.into(),
            old_value,
            new_value,
        }
    }
}

impl Transition {
    pub fn regional_reject(reason: Option<&str>) -> WorkflowResult<Self> {
        Ok(Self::RegionalReject {
            reason: require_reason(reason, "reject a submission")?,
        })
    }

    pub fn final_reject(reason: Option<&str>) -> WorkflowResult<Self> {
        Ok(Self::FinalReject {
            reason: require_reason(reason, "reject a submission")?,
        })
    }

    pub fn return_to_regional(reason: Option<&str>) -> WorkflowResult<Self> {
        Ok(Self::ReturnToRegional {
            reason: require_reason(reason, "return a submission for revision")?,
        })
    }

    /// Audit action name.
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Submit => "submit",
            Transition::RegionalApprove => "regional_approve",
            Transition::RegionalReject { .. } => "regional_reject",
            Transition::SubmitToCentral => "submit_to_central",
            Transition::FinalApprove => "final_approve",
            Transition::FinalReject { .. } => "final_reject",
            Transition::ReturnToRegional { .. } => "return_to_regional",
        }
    }

    pub fn action(&self) -> Action {
        match self {
            Transition::Submit => Action::Submit,
            Transition::RegionalApprove => Action::RegionalApprove,
            Transition::RegionalReject { .. } => Action::RegionalReject,
            Transition::SubmitToCentral => Action::SubmitToCentral,
            Transition::FinalApprove => Action::FinalApprove,
            Transition::FinalReject { .. } => Action::FinalReject,
            Transition::ReturnToRegional { .. } => Action::ReturnToRegional,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Transition::RegionalReject { reason }
            | Transition::FinalReject { reason }
            | Transition::ReturnToRegional { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn allowed_from(&self) -> &'static [SubmissionStatus] {
        match self {
            Transition::Submit => &[SubmissionStatus::Draft],
            Transition::RegionalApprove | Transition::RegionalReject { .. } => {
                &[SubmissionStatus::Submitted]
            }
            Transition::SubmitToCentral => &[
                SubmissionStatus::AdminWilayahApproved,
                SubmissionStatus::AdminWilayahRejected,
            ],
            Transition::FinalApprove
            | Transition::FinalReject { .. }
            | Transition::ReturnToRegional { .. } => &[SubmissionStatus::AdminWilayahSubmitted],
        }
    }

    pub fn target(&self) -> SubmissionStatus {
        match self {
            Transition::Submit => SubmissionStatus::Submitted,
            Transition::RegionalApprove => SubmissionStatus::AdminWilayahApproved,
            Transition::RegionalReject { .. } => SubmissionStatus::Rejected,
            Transition::SubmitToCentral => SubmissionStatus::AdminWilayahSubmitted,
            Transition::FinalApprove => SubmissionStatus::FinalApproved,
            Transition::FinalReject { .. } => SubmissionStatus::FinalRejected,
            Transition::ReturnToRegional { .. } => SubmissionStatus::AdminWilayahRejected,
        }
    }

    pub fn requires_completeness(&self) -> bool {
        matches!(self, Transition::SubmitToCentral)
    }

    pub fn check_source(&self, from: SubmissionStatus) -> WorkflowResult<()> {
        if self.allowed_from().contains(&from) {
            Ok(())
        } else {
            Err(WorkflowError::invalid_state(format!(
                "cannot {} a submission in status '{from}'",
                self.name().replace('_', " ")
            )))
        }
    }

    /// Returns the submission as it looks after the transition. The caller
    /// has already checked stage authority; `gate` must carry the regional
    /// completeness report for gated transitions.
    pub fn apply(
        &self,
        current: &Submission,
        actor: &Principal,
        now: NaiveDateTime,
        gate: Option<&CompletenessReport>,
    ) -> WorkflowResult<Submission> {
        let from = current_status(current)?;
        self.check_source(from)?;

        if self.requires_completeness() {
            match gate {
                Some(report) => report.ensure_complete()?,
                None => {
                    return Err(WorkflowError::invalid_state(
                        "document completeness was not evaluated",
                    ))
                }
            }
        }

        let mut next = current.clone();
        next.status = self.target().as_str().to_string();
        next.updated_at = now;

        match self {
            // The regional approver is recorded by the audit trail only; a
            // completed pass carries exactly one outcome stamp.
            Transition::Submit | Transition::RegionalApprove => {}
            Transition::RegionalReject { reason } => {
                next.rejected_by = Some(actor.user_id);
                next.rejected_at = Some(now);
                next.rejection_reason = Some(reason.clone());
            }
            Transition::SubmitToCentral => {
                if from == SubmissionStatus::AdminWilayahRejected {
                    next.resubmitted_by = Some(actor.user_id);
                    next.resubmitted_at = Some(now);
                    next.final_rejected_by = None;
                    next.final_rejected_at = None;
                    next.final_rejection_reason = None;
                    next.rejected_by = None;
                    next.rejected_at = None;
                    next.rejection_reason = None;
                }
            }
            Transition::FinalApprove => {
                next.final_approved_by = Some(actor.user_id);
                next.final_approved_at = Some(now);
            }
            Transition::FinalReject { reason } | Transition::ReturnToRegional { reason } => {
                next.final_rejected_by = Some(actor.user_id);
                next.final_rejected_at = Some(now);
                next.final_rejection_reason = Some(reason.clone());
            }
        }

        Ok(next)
    }
}

pub fn current_status(submission: &Submission) -> WorkflowResult<SubmissionStatus> {
    submission.status.parse().map_err(|_| {
        WorkflowError::invalid_state(format!(
            "submission has unrecognised status '{}'",
            submission.status
        ))
    })
}

/// Administrative status override. Bypasses the transition table; the
/// caller records the change with the mandatory reason.
pub fn override_status(
    current: &Submission,
    status: SubmissionStatus,
    now: NaiveDateTime,
) -> WorkflowResult<Submission> {
    if current.status == status.as_str() {
        return Err(WorkflowError::validation(format!(
            "submission is already in status '{status}'"
        )));
    }
    let mut next = current.clone();
    next.status = status.as_str().to_string();
    next.updated_at = now;
    Ok(next)
}

fn json_opt_uuid(value: Option<Uuid>) -> Option<Value> {
    value.map(|id| json!(id))
}

fn json_opt_time(value: Option<NaiveDateTime>) -> Option<Value> {
    value.map(|dt| json!(to_iso(dt)))
}

fn json_opt_text(value: Option<&str>) -> Option<Value> {
    value.map(|text| json!(text))
}

fn audited_fields(submission: &Submission) -> Vec<(&'static str, Option<Value>)> {
    vec![
        ("employee_name", Some(json!(submission.employee_name))),
        ("job_classification", Some(json!(submission.job_classification))),
        ("status", Some(json!(submission.status))),
        ("notes", json_opt_text(submission.notes.as_deref())),
        ("rejection_reason", json_opt_text(submission.rejection_reason.as_deref())),
        ("rejected_by", json_opt_uuid(submission.rejected_by)),
        ("rejected_at", json_opt_time(submission.rejected_at)),
        ("approved_by", json_opt_uuid(submission.approved_by)),
        ("approved_at", json_opt_time(submission.approved_at)),
        ("resubmitted_by", json_opt_uuid(submission.resubmitted_by)),
        ("resubmitted_at", json_opt_time(submission.resubmitted_at)),
        ("final_approved_by", json_opt_uuid(submission.final_approved_by)),
        ("final_approved_at", json_opt_time(submission.final_approved_at)),
        ("final_rejected_by", json_opt_uuid(submission.final_rejected_by)),
        ("final_rejected_at", json_opt_time(submission.final_rejected_at)),
        (
            "final_rejection_reason",
            json_opt_text(submission.final_rejection_reason.as_deref()),
        ),
    ]
}

/// Field-level difference between two versions of a submission, in column
/// order. `updated_at` is bookkeeping and never reported.
pub fn submission_changes(before: &Submission, after: &Submission) -> Vec<FieldChange> {
    audited_fields(before)
        .into_iter()
        .zip(audited_fields(after))
        .filter(|((_, old), (_, new))| old != new)
        .map(|((field, old), (_, new))| FieldChange::new(field, old, new))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::workflow::{
        CompletenessEvaluator, DocumentCategory, DocumentSlot, JobRequirement, RequirementEntry,
        Role, VerificationStatus,
    };

    fn principal(role: Role) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            username: role.as_str().into(),
            display_name: format!("{role} user"),
            role,
            office_id: None,
        }
    }

    fn submission(status: SubmissionStatus) -> Submission {
        let now = Utc::now().naive_utc();
        Submission {
            id: Uuid::new_v4(),
            employee_nip: "198503302010011001".into(),
            employee_name: "Budi Santoso".into(),
            job_classification: "Analis Kepegawaian".into(),
            status: status.as_str().into(),
            notes: None,
            rejection_reason: None,
            rejected_by: None,
            rejected_at: None,
            approved_by: None,
            approved_at: None,
            resubmitted_by: None,
            resubmitted_at: None,
            final_approved_by: None,
            final_approved_at: None,
            final_rejected_by: None,
            final_rejected_at: None,
            final_rejection_reason: None,
            office_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    fn complete_report() -> CompletenessReport {
        CompletenessEvaluator::evaluate(
            "Analis Kepegawaian",
            None,
            DocumentCategory::AdminWilayah,
            std::iter::empty(),
        )
    }

    fn all_transitions() -> Vec<Transition> {
        vec![
            Transition::Submit,
            Transition::RegionalApprove,
            Transition::RegionalReject {
                reason: "berkas tidak lengkap".into(),
            },
            Transition::SubmitToCentral,
            Transition::FinalApprove,
            Transition::FinalReject {
                reason: "incomplete evidence".into(),
            },
            Transition::ReturnToRegional {
                reason: "perbaiki SKP".into(),
            },
        ]
    }

    #[test]
    fn every_status_accepts_exactly_the_listed_transitions() {
        let actor = principal(Role::Superadmin);
        let now = Utc::now().naive_utc();
        let report = complete_report();

        for status in SubmissionStatus::ALL {
            for transition in all_transitions() {
                let current = submission(*status);
                let result = transition.apply(&current, &actor, now, Some(&report));
                if transition.allowed_from().contains(status) {
                    let next = result.unwrap();
                    assert_eq!(next.status, transition.target().as_str());
                } else {
                    assert!(matches!(result, Err(WorkflowError::InvalidState(_))));
                }
            }
        }
    }

    #[test]
    fn rejected_transition_leaves_submission_untouched() {
        let actor = principal(Role::AdminWilayah);
        let current = submission(SubmissionStatus::Draft);
        let snapshot = current.clone();

        let err = Transition::RegionalApprove
            .apply(&current, &actor, Utc::now().naive_utc(), None)
            .unwrap_err();

        assert_eq!(
            err,
            WorkflowError::invalid_state("cannot regional approve a submission in status 'draft'")
        );
        assert_eq!(current, snapshot);
    }

    #[test]
    fn regional_reject_stamps_actor_and_reason() {
        let actor = principal(Role::AdminWilayah);
        let now = Utc::now().naive_utc();
        let transition = Transition::regional_reject(Some(" berkas tidak lengkap ")).unwrap();
        let next = transition
            .apply(&submission(SubmissionStatus::Submitted), &actor, now, None)
            .unwrap();

        assert_eq!(next.status, "rejected");
        assert_eq!(next.rejected_by, Some(actor.user_id));
        assert_eq!(next.rejected_at, Some(now));
        assert_eq!(next.rejection_reason.as_deref(), Some("berkas tidak lengkap"));
    }

    #[test]
    fn rejections_require_a_reason() {
        assert!(matches!(
            Transition::regional_reject(None),
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            Transition::final_reject(Some("  ")),
            Err(WorkflowError::Validation(_))
        ));
        assert!(Transition::return_to_regional(Some("revisi")).is_ok());
    }

    #[test]
    fn submit_to_central_is_gated_on_completeness() {
        let actor = principal(Role::AdminWilayah);
        let requirement = JobRequirement {
            id: Uuid::new_v4(),
            name: "Analis Kepegawaian".into(),
            active: true,
            kabupaten: vec![],
            admin_wilayah: vec![
                RequirementEntry::required("sk_pangkat"),
                RequirementEntry::required("skp"),
            ],
        };
        let current = submission(SubmissionStatus::AdminWilayahApproved);

        let empty = CompletenessEvaluator::evaluate(
            &current.job_classification,
            Some(&requirement),
            DocumentCategory::AdminWilayah,
            std::iter::empty(),
        );
        let err = Transition::SubmitToCentral
            .apply(&current, &actor, Utc::now().naive_utc(), Some(&empty))
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::IncompleteDocuments {
                missing: vec!["sk_pangkat".into(), "skp".into()]
            }
        );

        let docs = [
            DocumentSlot {
                category: DocumentCategory::AdminWilayah,
                document_type: "sk_pangkat",
                verification: VerificationStatus::Approved,
            },
            DocumentSlot {
                category: DocumentCategory::AdminWilayah,
                document_type: "skp",
                verification: VerificationStatus::Approved,
            },
        ];
        let full = CompletenessEvaluator::evaluate(
            &current.job_classification,
            Some(&requirement),
            DocumentCategory::AdminWilayah,
            docs,
        );
        let next = Transition::SubmitToCentral
            .apply(&current, &actor, Utc::now().naive_utc(), Some(&full))
            .unwrap();
        assert_eq!(next.status, "admin_wilayah_submitted");
    }

    #[test]
    fn gated_transition_without_report_is_refused() {
        let actor = principal(Role::AdminWilayah);
        let result = Transition::SubmitToCentral.apply(
            &submission(SubmissionStatus::AdminWilayahApproved),
            &actor,
            Utc::now().naive_utc(),
            None,
        );
        assert!(matches!(result, Err(WorkflowError::InvalidState(_))));
    }

    #[test]
    fn resubmission_clears_rejection_markers() {
        let central = principal(Role::Superadmin);
        let reviewer = principal(Role::AdminWilayah);
        let now = Utc::now().naive_utc();

        let returned = Transition::return_to_regional(Some("perbaiki SKP"))
            .unwrap()
            .apply(
                &submission(SubmissionStatus::AdminWilayahSubmitted),
                &central,
                now,
                None,
            )
            .unwrap();
        assert_eq!(returned.status, "admin_wilayah_rejected");
        assert!(returned.final_rejected_at.is_some());
        assert_eq!(returned.final_rejection_reason.as_deref(), Some("perbaiki SKP"));

        let resubmitted = Transition::SubmitToCentral
            .apply(&returned, &reviewer, now, Some(&complete_report()))
            .unwrap();
        assert_eq!(resubmitted.status, "admin_wilayah_submitted");
        assert!(resubmitted.final_rejected_at.is_none());
        assert!(resubmitted.final_rejected_by.is_none());
        assert!(resubmitted.final_rejection_reason.is_none());
        assert!(resubmitted.rejected_at.is_none());
        assert_eq!(resubmitted.resubmitted_by, Some(reviewer.user_id));
        assert_eq!(resubmitted.resubmitted_at, Some(now));
    }

    #[test]
    fn first_submission_to_central_is_not_a_resubmission() {
        let reviewer = principal(Role::AdminWilayah);
        let next = Transition::SubmitToCentral
            .apply(
                &submission(SubmissionStatus::AdminWilayahApproved),
                &reviewer,
                Utc::now().naive_utc(),
                Some(&complete_report()),
            )
            .unwrap();
        assert!(next.resubmitted_at.is_none());
    }

    #[test]
    fn happy_path_changes_one_field_per_audit_entry() {
        let reviewer = principal(Role::AdminWilayah);
        let central = principal(Role::Superadmin);
        let operator = principal(Role::Operator);
        let now = Utc::now().naive_utc();
        let report = complete_report();

        let draft = submission(SubmissionStatus::Draft);
        let submitted = Transition::Submit.apply(&draft, &operator, now, None).unwrap();
        let approved = Transition::RegionalApprove
            .apply(&submitted, &reviewer, now, None)
            .unwrap();
        let at_central = Transition::SubmitToCentral
            .apply(&approved, &reviewer, now, Some(&report))
            .unwrap();
        let final_approved = Transition::FinalApprove
            .apply(&at_central, &central, now, None)
            .unwrap();

        let steps = [
            submission_changes(&draft, &submitted),
            submission_changes(&submitted, &approved),
            submission_changes(&approved, &at_central),
            submission_changes(&at_central, &final_approved),
        ];
        let counts: Vec<usize> = steps.iter().map(Vec::len).collect();
        assert_eq!(counts, vec![1, 1, 1, 3]);

        let fields: Vec<&str> = steps[3].iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["status", "final_approved_by", "final_approved_at"]);
        assert_eq!(steps[0][0].old_value, Some(json!("draft")));
        assert_eq!(steps[0][0].new_value, Some(json!("submitted")));
    }

    fn outcome_stamps(submission: &Submission) -> usize {
        [
            submission.approved_by.is_some() || submission.approved_at.is_some(),
            submission.rejected_by.is_some() || submission.rejected_at.is_some(),
            submission.final_approved_by.is_some() || submission.final_approved_at.is_some(),
            submission.final_rejected_by.is_some() || submission.final_rejected_at.is_some(),
        ]
        .into_iter()
        .filter(|stamped| *stamped)
        .count()
    }

    #[test]
    fn completed_pass_carries_exactly_one_outcome() {
        let operator = principal(Role::Operator);
        let reviewer = principal(Role::AdminWilayah);
        let central = principal(Role::Superadmin);
        let now = Utc::now().naive_utc();
        let report = complete_report();

        let submitted = Transition::Submit
            .apply(&submission(SubmissionStatus::Draft), &operator, now, None)
            .unwrap();
        let approved = Transition::RegionalApprove
            .apply(&submitted, &reviewer, now, None)
            .unwrap();
        assert_eq!(outcome_stamps(&approved), 0);
        let at_central = Transition::SubmitToCentral
            .apply(&approved, &reviewer, now, Some(&report))
            .unwrap();

        let final_approved = Transition::FinalApprove
            .apply(&at_central, &central, now, None)
            .unwrap();
        assert_eq!(outcome_stamps(&final_approved), 1);

        let final_rejected = Transition::final_reject(Some("masa kerja kurang"))
            .unwrap()
            .apply(&at_central, &central, now, None)
            .unwrap();
        assert_eq!(outcome_stamps(&final_rejected), 1);

        let rejected = Transition::regional_reject(Some("berkas tidak lengkap"))
            .unwrap()
            .apply(&submitted, &reviewer, now, None)
            .unwrap();
        assert_eq!(outcome_stamps(&rejected), 1);

        let returned = Transition::return_to_regional(Some("perbaiki SKP"))
            .unwrap()
            .apply(&at_central, &central, now, None)
            .unwrap();
        let resubmitted = Transition::SubmitToCentral
            .apply(&returned, &reviewer, now, Some(&report))
            .unwrap();
        let approved_again = Transition::FinalApprove
            .apply(&resubmitted, &central, now, None)
            .unwrap();
        assert_eq!(outcome_stamps(&approved_again), 1);
    }

    #[test]
    fn cleared_fields_are_reported_as_null() {
        let mut before = submission(SubmissionStatus::AdminWilayahRejected);
        before.final_rejection_reason = Some("perbaiki SKP".into());
        let mut after = before.clone();
        after.final_rejection_reason = None;

        let changes = submission_changes(&before, &after);
        assert_eq!(
            changes,
            vec![FieldChange::new(
                "final_rejection_reason",
                Some(json!("perbaiki SKP")),
                None
            )]
        );
    }

    #[test]
    fn override_bypasses_the_table_but_not_identity() {
        let now = Utc::now().naive_utc();
        let current = submission(SubmissionStatus::Rejected);
        let next = override_status(&current, SubmissionStatus::Resubmitted, now).unwrap();
        assert_eq!(next.status, "resubmitted");
        assert!(override_status(&next, SubmissionStatus::Resubmitted, now).is_err());
    }

    #[test]
    fn unknown_stored_status_is_an_invalid_state() {
        let mut current = submission(SubmissionStatus::Draft);
        current.status = "archived".into();
        let err = Transition::Submit
            .apply(&current, &principal(Role::Operator), Utc::now().naive_utc(), None)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState(_)));
    }
}
