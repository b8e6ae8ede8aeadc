//! JobRequirementCatalog: resolves a submission's free-text job
//! classification to the per-stage document requirements.
//!
//! The catalog is injected into [`crate::state::AppState`] as a trait object.
//! [`CachedCatalog`] is a read-through cache keyed by the normalised label;
//! negative lookups are cached too and everything expires after the
//! configured TTL or on [`JobRequirementCatalog::invalidate`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::DocumentCategory;
use crate::error::AppResult;
use crate::models::{JobClassification, JobDocumentRequirement};
use crate::schema::{job_classifications, job_document_requirements};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementEntry {
    pub document_type: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl RequirementEntry {
    pub fn required(document_type: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            required: true,
        }
    }

    pub fn optional(document_type: impl Into<String>) -> Self {
        Self {
            document_type: document_type.into(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequirement {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub kabupaten: Vec<RequirementEntry>,
    pub admin_wilayah: Vec<RequirementEntry>,
}

impl JobRequirement {
    pub fn for_stage(&self, stage: DocumentCategory) -> &[RequirementEntry] {
        match stage {
            DocumentCategory::Kabupaten => &self.kabupaten,
            DocumentCategory::AdminWilayah => &self.admin_wilayah,
        }
    }
}

pub trait JobRequirementCatalog: Send + Sync + 'static {
    /// Resolves a classification label. `None` means no active
    /// classification matches.
    fn resolve(
        &self,
        conn: &mut PgConnection,
        label: &str,
    ) -> AppResult<Option<Arc<JobRequirement>>>;

    fn invalidate(&self);
}

struct CacheEntry {
    loaded_at: Instant,
    value: Option<Arc<JobRequirement>>,
}

pub struct CachedCatalog {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CachedCatalog {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn cache_key(label: &str) -> String {
        label.trim().to_lowercase()
    }

    /// Returns the cached entry for `label` or calls `load` with the
    /// normalised key and caches its result.
    pub fn get_or_load<F>(&self, label: &str, load: F) -> AppResult<Option<Arc<JobRequirement>>>
    where
        F: FnOnce(&str) -> AppResult<Option<JobRequirement>>,
    {
        let key = Self::cache_key(label);
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(&key) {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = load(&key)?.map(Arc::new);
        debug!(label = %key, resolved = value.is_some(), "job requirement cache miss");
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key,
            CacheEntry {
                loaded_at: Instant::now(),
                value: value.clone(),
            },
        );
        Ok(value)
    }
}

impl JobRequirementCatalog for CachedCatalog {
    fn resolve(
        &self,
        conn: &mut PgConnection,
        label: &str,
    ) -> AppResult<Option<Arc<JobRequirement>>> {
        self.get_or_load(label, |key| load_active_by_label(conn, key))
    }

    fn invalidate(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Case-insensitive match of `label` against active classification names.
pub fn load_active_by_label(
    conn: &mut PgConnection,
    label: &str,
) -> AppResult<Option<JobRequirement>> {
    let wanted = label.trim().to_lowercase();
    let active: Vec<JobClassification> = job_classifications::table
        .filter(job_classifications::active.eq(true))
        .load(conn)?;

    match active
        .into_iter()
        .find(|classification| classification.name.trim().to_lowercase() == wanted)
    {
        Some(classification) => Ok(Some(load_for_classification(conn, classification)?)),
        None => Ok(None),
    }
}

pub fn load_for_classification(
    conn: &mut PgConnection,
    classification: JobClassification,
) -> AppResult<JobRequirement> {
    let rows: Vec<JobDocumentRequirement> = job_document_requirements::table
        .filter(job_document_requirements::job_classification_id.eq(classification.id))
        .order((
            job_document_requirements::sort_order.asc(),
            job_document_requirements::document_type.asc(),
        ))
        .load(conn)?;
    Ok(assemble(classification, rows))
}

pub fn assemble(classification: JobClassification, rows: Vec<JobDocumentRequirement>) -> JobRequirement {
    let mut kabupaten = Vec::new();
    let mut admin_wilayah = Vec::new();
    for row in rows {
        let entry = RequirementEntry {
            document_type: row.document_type,
            required: row.required,
        };
        match row.stage.parse::<DocumentCategory>() {
            Ok(DocumentCategory::Kabupaten) => kabupaten.push(entry),
            Ok(DocumentCategory::AdminWilayah) => admin_wilayah.push(entry),
            Err(_) => {}
        }
    }

    JobRequirement {
        id: classification.id,
        name: classification.name,
        active: classification.active,
        kabupaten,
        admin_wilayah,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn requirement(name: &str) -> JobRequirement {
        JobRequirement {
            id: Uuid::new_v4(),
            name: name.to_string(),
            active: true,
            kabupaten: vec![RequirementEntry::required("surat_pengantar")],
            admin_wilayah: vec![
                RequirementEntry::required("sk_pangkat"),
                RequirementEntry::optional("ijazah"),
            ],
        }
    }

    #[test]
    fn cache_reads_through_once_per_normalised_label() {
        let catalog = CachedCatalog::new(Duration::from_secs(60));
        let loads = Cell::new(0);

        for label in ["Guru Ahli Pertama", " guru ahli pertama ", "GURU AHLI PERTAMA"] {
            let resolved = catalog
                .get_or_load(label, |key| {
                    loads.set(loads.get() + 1);
                    assert_eq!(key, "guru ahli pertama");
                    Ok(Some(requirement("Guru Ahli Pertama")))
                })
                .unwrap();
            assert_eq!(resolved.unwrap().name, "Guru Ahli Pertama");
        }

        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn negative_lookups_are_cached() {
        let catalog = CachedCatalog::new(Duration::from_secs(60));
        let loads = Cell::new(0);
        for _ in 0..3 {
            let resolved = catalog
                .get_or_load("unknown", |_| {
                    loads.set(loads.get() + 1);
                    Ok(None)
                })
                .unwrap();
            assert!(resolved.is_none());
        }
        assert_eq!(loads.get(), 1);
    }

    #[test]
    fn expired_entries_are_reloaded() {
        let catalog = CachedCatalog::new(Duration::ZERO);
        let loads = Cell::new(0);
        for _ in 0..2 {
            catalog
                .get_or_load("analis", |_| {
                    loads.set(loads.get() + 1);
                    Ok(Some(requirement("Analis")))
                })
                .unwrap();
        }
        assert_eq!(loads.get(), 2);
    }

    #[test]
    fn invalidate_drops_cached_entries() {
        let catalog = CachedCatalog::new(Duration::from_secs(60));
        catalog
            .get_or_load("analis", |_| Ok(Some(requirement("Analis"))))
            .unwrap();
        catalog.invalidate();

        let reloaded = Cell::new(false);
        catalog
            .get_or_load("analis", |_| {
                reloaded.set(true);
                Ok(None)
            })
            .unwrap();
        assert!(reloaded.get());
    }

    #[test]
    fn load_errors_are_not_cached() {
        let catalog = CachedCatalog::new(Duration::from_secs(60));
        let first = catalog.get_or_load("analis", |_| {
            Err(crate::error::AppError::internal("connection reset"))
        });
        assert!(first.is_err());

        let second = catalog
            .get_or_load("analis", |_| Ok(Some(requirement("Analis"))))
            .unwrap();
        assert!(second.is_some());
    }

    #[test]
    fn assemble_splits_rows_by_stage_in_order() {
        let classification = JobClassification {
            id: Uuid::new_v4(),
            name: "Pranata Komputer".into(),
            active: true,
            created_at: chrono::Utc::now().naive_utc(),
            updated_at: chrono::Utc::now().naive_utc(),
        };
        let row = |stage: &str, document_type: &str, required: bool, sort_order: i32| {
            JobDocumentRequirement {
                id: Uuid::new_v4(),
                job_classification_id: classification.id,
                stage: stage.into(),
                document_type: document_type.into(),
                required,
                sort_order,
            }
        };
        let rows = vec![
            row("kabupaten", "surat_pengantar", true, 0),
            row("admin_wilayah", "sk_pangkat", true, 0),
            row("admin_wilayah", "ijazah", false, 1),
        ];

        let requirement = assemble(classification, rows);
        assert_eq!(requirement.kabupaten, vec![RequirementEntry::required("surat_pengantar")]);
        assert_eq!(
            requirement.for_stage(DocumentCategory::AdminWilayah),
            &[
                RequirementEntry::required("sk_pangkat"),
                RequirementEntry::optional("ijazah")
            ]
        );
    }
}
