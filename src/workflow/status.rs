//! Persisted vocabularies. The string forms are stored verbatim in the
//! database and exposed over the API, so they are case-sensitive and must not
//! change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::WorkflowError;

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($variant:ident => $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = WorkflowError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(WorkflowError::Validation(format!(
                        "unknown {} '{other}'",
                        $label
                    ))),
                }
            }
        }
    };
}

vocabulary! {
    /// Overall lifecycle status of a submission.
    SubmissionStatus, "submission status" {
        Draft => "draft",
        Submitted => "submitted",
        Approved => "approved",
        Rejected => "rejected",
        Resubmitted => "resubmitted",
        AdminWilayahApproved => "admin_wilayah_approved",
        AdminWilayahRejected => "admin_wilayah_rejected",
        AdminWilayahSubmitted => "admin_wilayah_submitted",
        FinalApproved => "final_approved",
        FinalRejected => "final_rejected",
    }
}

vocabulary! {
    /// Which stage a document belongs to. Doubles as the stage selector for
    /// completeness evaluation.
    DocumentCategory, "document category" {
        Kabupaten => "kabupaten",
        AdminWilayah => "admin_wilayah",
    }
}

vocabulary! {
    VerificationStatus, "verification status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

vocabulary! {
    UploadStatus, "upload status" {
        Uploaded => "uploaded",
        Verified => "verified",
        Rejected => "rejected",
    }
}

impl SubmissionStatus {
    /// Statuses after which this core accepts no further workflow or document
    /// mutation. Tracking takes over after `final_approved`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubmissionStatus::Rejected
                | SubmissionStatus::FinalApproved
                | SubmissionStatus::FinalRejected
        )
    }
}

impl DocumentCategory {
    /// Submission statuses in which documents of this category may be
    /// uploaded.
    pub fn upload_window(self) -> &'static [SubmissionStatus] {
        match self {
            DocumentCategory::Kabupaten => &[SubmissionStatus::Draft],
            DocumentCategory::AdminWilayah => &[
                SubmissionStatus::AdminWilayahApproved,
                SubmissionStatus::AdminWilayahRejected,
            ],
        }
    }
}

impl VerificationStatus {
    pub fn upload_status(self) -> UploadStatus {
        match self {
            VerificationStatus::Pending => UploadStatus::Uploaded,
            VerificationStatus::Approved => UploadStatus::Verified,
            VerificationStatus::Rejected => UploadStatus::Rejected,
        }
    }
}
