//! CompletenessEvaluator: decides whether a stage's required documents are
//! present and approved.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{
    DocumentCategory, JobRequirement, VerificationStatus, WorkflowError, WorkflowResult,
};
use crate::models::Document;

/// The parts of a document the evaluator looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentSlot<'a> {
    pub category: DocumentCategory,
    pub document_type: &'a str,
    pub verification: VerificationStatus,
}

impl<'a> DocumentSlot<'a> {
    /// Rows carrying values outside the vocabulary are skipped rather than
    /// counted.
    pub fn from_document(document: &'a Document) -> Option<Self> {
        Some(Self {
            category: document.category.parse().ok()?,
            document_type: &document.document_type,
            verification: document.verification_status.parse().ok()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletenessReport {
    pub stage: DocumentCategory,
    pub job_classification: String,
    /// False when no active classification matched; the stage then has no
    /// required documents.
    pub resolved: bool,
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub satisfied: Vec<String>,
    pub missing: Vec<String>,
    pub complete: bool,
}

impl CompletenessReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn ensure_complete(&self) -> WorkflowResult<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(WorkflowError::IncompleteDocuments {
                missing: self.missing.clone(),
            })
        }
    }
}

pub struct CompletenessEvaluator;

impl CompletenessEvaluator {
    pub fn evaluate<'a, I>(
        job_classification: &str,
        requirement: Option<&JobRequirement>,
        stage: DocumentCategory,
        documents: I,
    ) -> CompletenessReport
    where
        I: IntoIterator<Item = DocumentSlot<'a>>,
    {
        let mut approved: HashMap<&str, usize> = HashMap::new();
        for slot in documents {
            if slot.category == stage && slot.verification == VerificationStatus::Approved {
                *approved.entry(slot.document_type).or_default() += 1;
            }
        }

        let entries = requirement.map(|req| req.for_stage(stage)).unwrap_or(&[]);
        let required_tags: HashSet<&str> = entries
            .iter()
            .filter(|entry| entry.required)
            .map(|entry| entry.document_type.as_str())
            .collect();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut satisfied = Vec::new();
        let mut missing = Vec::new();

        for entry in entries {
            let tag = entry.document_type.as_str();
            if !seen.insert(tag) {
                continue;
            }
            if required_tags.contains(tag) {
                required.push(tag.to_string());
                if approved.get(tag).copied().unwrap_or(0) >= 1 {
                    satisfied.push(tag.to_string());
                } else {
                    missing.push(tag.to_string());
                }
            } else {
                optional.push(tag.to_string());
            }
        }

        let complete = missing.is_empty();
        CompletenessReport {
            stage,
            job_classification: job_classification.to_string(),
            resolved: requirement.is_some(),
            required,
            optional,
            satisfied,
            missing,
            complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use uuid::Uuid;

    use super::*;
    use crate::workflow::RequirementEntry;

    fn requirement(admin_wilayah: Vec<RequirementEntry>) -> JobRequirement {
        JobRequirement {
            id: Uuid::new_v4(),
            name: "Analis Kepegawaian".into(),
            active: true,
            kabupaten: vec![RequirementEntry::required("surat_pengantar")],
            admin_wilayah,
        }
    }

    fn slot(
        category: DocumentCategory,
        document_type: &str,
        verification: VerificationStatus,
    ) -> DocumentSlot<'_> {
        DocumentSlot {
            category,
            document_type,
            verification,
        }
    }

    #[test]
    fn complete_when_every_required_tag_is_approved() {
        let req = requirement(vec![
            RequirementEntry::required("sk_pangkat"),
            RequirementEntry::required("skp"),
            RequirementEntry::optional("ijazah"),
        ]);
        let docs = [
            slot(DocumentCategory::AdminWilayah, "sk_pangkat", VerificationStatus::Approved),
            slot(DocumentCategory::AdminWilayah, "skp", VerificationStatus::Approved),
        ];

        let report = CompletenessEvaluator::evaluate(
            "Analis Kepegawaian",
            Some(&req),
            DocumentCategory::AdminWilayah,
            docs,
        );
        assert!(report.is_complete());
        assert!(report.complete);
        assert_eq!(report.satisfied, vec!["sk_pangkat", "skp"]);
        assert_eq!(report.optional, vec!["ijazah"]);
        assert!(report.ensure_complete().is_ok());
    }

    #[test]
    fn pending_and_rejected_documents_do_not_count() {
        let req = requirement(vec![
            RequirementEntry::required("sk_pangkat"),
            RequirementEntry::required("skp"),
        ]);
        let docs = [
            slot(DocumentCategory::AdminWilayah, "sk_pangkat", VerificationStatus::Pending),
            slot(DocumentCategory::AdminWilayah, "skp", VerificationStatus::Rejected),
        ];
        let report = CompletenessEvaluator::evaluate(
            "Analis Kepegawaian",
            Some(&req),
            DocumentCategory::AdminWilayah,
            docs,
        );
        assert_eq!(report.missing, vec!["sk_pangkat", "skp"]);
        assert_eq!(
            report.ensure_complete().unwrap_err(),
            WorkflowError::IncompleteDocuments {
                missing: vec!["sk_pangkat".into(), "skp".into()]
            }
        );
    }

    #[test]
    fn documents_of_the_other_category_do_not_count() {
        let req = requirement(vec![RequirementEntry::required("sk_pangkat")]);
        let docs = [slot(
            DocumentCategory::Kabupaten,
            "sk_pangkat",
            VerificationStatus::Approved,
        )];
        let report = CompletenessEvaluator::evaluate(
            "Analis Kepegawaian",
            Some(&req),
            DocumentCategory::AdminWilayah,
            docs,
        );
        assert_eq!(report.missing, vec!["sk_pangkat"]);
    }

    #[test]
    fn optional_documents_never_block() {
        let req = requirement(vec![RequirementEntry::optional("ijazah")]);
        let report = CompletenessEvaluator::evaluate(
            "Analis Kepegawaian",
            Some(&req),
            DocumentCategory::AdminWilayah,
            std::iter::empty(),
        );
        assert!(report.is_complete());
        assert!(report.required.is_empty());
    }

    #[test]
    fn unresolved_classification_requires_nothing() {
        let report = CompletenessEvaluator::evaluate(
            "Jabatan Tidak Dikenal",
            None,
            DocumentCategory::AdminWilayah,
            std::iter::empty(),
        );
        assert!(!report.resolved);
        assert!(report.is_complete());
    }

    #[test]
    fn duplicate_tags_are_listed_once() {
        let req = requirement(vec![
            RequirementEntry::required("skp"),
            RequirementEntry::required("skp"),
            RequirementEntry::optional("skp"),
        ]);
        let report = CompletenessEvaluator::evaluate(
            "Analis Kepegawaian",
            Some(&req),
            DocumentCategory::AdminWilayah,
            std::iter::empty(),
        );
        assert_eq!(report.required, vec!["skp"]);
        assert_eq!(report.missing, vec!["skp"]);
        assert!(report.optional.is_empty());
    }

    #[test]
    fn stage_selects_the_requirement_list() {
        let req = requirement(vec![]);
        let report = CompletenessEvaluator::evaluate(
            "Analis Kepegawaian",
            Some(&req),
            DocumentCategory::Kabupaten,
            std::iter::empty(),
        );
        assert_eq!(report.missing, vec!["surat_pengantar"]);
    }

    #[test]
    fn gate_holds_for_random_requirement_configurations() {
        const TAGS: &[&str] = &["sk_cpns", "sk_pns", "sk_pangkat", "skp", "ijazah", "ktp"];
        const VERIFICATIONS: &[VerificationStatus] = &[
            VerificationStatus::Pending,
            VerificationStatus::Approved,
            VerificationStatus::Rejected,
        ];
        let mut rng = StdRng::seed_from_u64(0x5eed_2026);

        for _ in 0..500 {
            let mut entries: Vec<RequirementEntry> = Vec::new();
            for tag in TAGS {
                if rng.gen_bool(0.6) {
                    entries.push(RequirementEntry {
                        document_type: tag.to_string(),
                        required: rng.gen_bool(0.7),
                    });
                }
            }
            let req = requirement(entries.clone());

            let mut docs: Vec<DocumentSlot<'static>> = Vec::new();
            for tag in TAGS {
                if !rng.gen_bool(0.5) {
                    continue;
                }
                let category = if rng.gen_bool(0.8) {
                    DocumentCategory::AdminWilayah
                } else {
                    DocumentCategory::Kabupaten
                };
                docs.push(DocumentSlot {
                    category,
                    document_type: *tag,
                    verification: VERIFICATIONS[rng.gen_range(0..VERIFICATIONS.len())],
                });
            }

            let report = CompletenessEvaluator::evaluate(
                "Analis Kepegawaian",
                Some(&req),
                DocumentCategory::AdminWilayah,
                docs.iter().copied(),
            );

            let every_required_approved = entries.iter().filter(|e| e.required).all(|entry| {
                docs.iter().any(|doc| {
                    doc.category == DocumentCategory::AdminWilayah
                        && doc.document_type == entry.document_type
                        && doc.verification == VerificationStatus::Approved
                })
            });

            assert_eq!(report.is_complete(), every_required_approved);
            for tag in &report.missing {
                assert!(entries.iter().any(|e| e.required && &e.document_type == tag));
            }
            assert_eq!(
                report.satisfied.len() + report.missing.len(),
                report.required.len()
            );
        }
    }
}
