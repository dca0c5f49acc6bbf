//! Project registry — what exists in the codebase, by domain.
//!
//! Pages, components, APIs and database collections each live in one JSON
//! file under `registry/`. Inserts enforce exact-lowercase name uniqueness
//! within a domain and surface near-duplicates (name similarity ≥ 0.75) so
//! agents stop re-creating what already exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::info;

use crate::paths::StateLayout;
use crate::store::{read_json_or_quarantine, write_json_atomic, StoreError};

/// Similarity at which two names are surfaced as likely duplicates.
const DUPLICATE_SIMILARITY: f64 = 0.75;

/// Registry domains, one file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Pages,
    Components,
    Apis,
    Database,
}

impl Domain {
    pub fn file_stem(self) -> &'static str {
        match self {
            Self::Pages => "pages",
            Self::Components => "components",
            Self::Apis => "apis",
            Self::Database => "database",
        }
    }

    pub const ALL: [Domain; 4] = [Self::Pages, Self::Components, Self::Apis, Self::Database];
}

/// One registered artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub name: String,
    pub file_path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A near-duplicate surfaced on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateWarning {
    pub existing_id: String,
    pub existing_name: String,
    pub similarity: f64,
}

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("`{name}` already exists in {domain:?} as {existing_id}")]
    NameTaken {
        domain: Domain,
        name: String,
        existing_id: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Filesystem-backed project registry.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    layout: StateLayout,
}

impl ProjectRegistry {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// Insert an entry. Exact-lowercase name collisions are rejected; the
    /// returned warnings list any names with similarity ≥ 0.75.
    pub fn insert(
        &self,
        domain: Domain,
        entry: RegistryEntry,
    ) -> RegistryResult<Vec<DuplicateWarning>> {
        let mut entries = self.list(domain)?;
        let lowered = entry.name.to_lowercase();

        if let Some(existing) = entries.iter().find(|e| e.name.to_lowercase() == lowered) {
            return Err(RegistryError::NameTaken {
                domain,
                name: entry.name,
                existing_id: existing.id.clone(),
            });
        }

        let warnings: Vec<DuplicateWarning> = entries
            .iter()
            .filter_map(|existing| {
                let similarity =
                    normalized_levenshtein(&lowered, &existing.name.to_lowercase());
                (similarity >= DUPLICATE_SIMILARITY).then(|| DuplicateWarning {
                    existing_id: existing.id.clone(),
                    existing_name: existing.name.clone(),
                    similarity,
                })
            })
            .collect();

        info!(
            domain = ?domain,
            name = entry.name,
            near_duplicates = warnings.len(),
            "registry insert"
        );
        entries.push(entry);
        write_json_atomic(&self.layout.registry_domain(domain.file_stem()), &entries)?;
        Ok(warnings)
    }

    /// All entries of a domain.
    pub fn list(&self, domain: Domain) -> RegistryResult<Vec<RegistryEntry>> {
        Ok(
            read_json_or_quarantine(&self.layout.registry_domain(domain.file_stem()))?
                .unwrap_or_default(),
        )
    }

    /// Find an entry by exact-lowercase name.
    pub fn find(&self, domain: Domain, name: &str) -> RegistryResult<Option<RegistryEntry>> {
        let lowered = name.to_lowercase();
        Ok(self
            .list(domain)?
            .into_iter()
            .find(|e| e.name.to_lowercase() == lowered))
    }

    /// Routing affinity: 1.0 when any of `files` was registered by `role`
    /// (in any domain), else 0.0.
    pub fn affinity(&self, role: &str, files: &[String]) -> RegistryResult<f64> {
        for domain in Domain::ALL {
            for entry in self.list(domain)? {
                if entry.created_by == role && files.iter().any(|f| f == &entry.file_path) {
                    return Ok(1.0);
                }
            }
        }
        Ok(0.0)
    }
}
