use async_trait::async_trait;
use fd_lock::RwLock as FileLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::errors::StoreError;
use super::store::{apply_orders, PhaseStore};
use super::types::{sort_definitions, CanonicalRepair, PhaseDefinition, PhaseName, ProductType};

const DOCUMENT_VERSION: u32 = 1;

/// On-disk layout of the phase table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    workflows: BTreeMap<ProductType, Vec<PhaseDefinition>>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            workflows: BTreeMap::new(),
        }
    }
}

/// JSON file backed store.
///
/// Writes go to a sibling temp file that is renamed over the document, so a
/// reader sees either the old or the new table. Writers hold an advisory lock
/// on `<path>.lock` for the read-modify-write; a second process trying to write
/// at the same time gets [`StoreError::Locked`].
pub struct FilePhaseStore {
    path: PathBuf,
    lock_path: PathBuf,
    write_guard: Mutex<()>,
}

impl FilePhaseStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = sibling(&path, "lock");
        Self {
            path,
            lock_path,
            write_guard: Mutex::new(()),
        }
    }

    async fn read_document(&self) -> Result<StoreDocument, StoreError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreDocument::default()),
            Err(e) => return Err(e.into()),
        };
        let document: StoreDocument = serde_json::from_str(&contents)?;
        if document.version != DOCUMENT_VERSION {
            return Err(StoreError::Corrupt {
                reason: format!(
                    "unsupported document version {} (expected {})",
                    document.version, DOCUMENT_VERSION
                ),
            });
        }
        for (product_type, definitions) in &document.workflows {
            if let Some(stray) = definitions.iter().find(|d| &d.product_type != product_type) {
                return Err(StoreError::Corrupt {
                    reason: format!(
                        "phase {} filed under {} claims product type {}",
                        stray.phase_name, product_type, stray.product_type
                    ),
                });
            }
        }
        Ok(document)
    }

    async fn write_document(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let staging = sibling(&self.path, "tmp");
        let contents = serde_json::to_vec_pretty(document)?;
        fs::write(&staging, contents).await?;
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }

    /// Read-modify-write under both the in-process and the cross-process lock.
    /// `mutate` returns its result and whether the document changed; nothing is
    /// written when it fails or reports no change.
    async fn update<T, F>(&self, mutate: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnOnce(&mut StoreDocument) -> Result<(T, bool), StoreError> + Send,
    {
        let _in_process = self.write_guard.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        let mut lock = FileLock::new(lock_file);
        let _cross_process = lock.try_write().map_err(|e| match e.kind() {
            ErrorKind::WouldBlock => StoreError::Locked {
                path: self.lock_path.clone(),
            },
            _ => StoreError::Io(e),
        })?;

        let mut document = self.read_document().await?;
        let (outcome, changed) = mutate(&mut document)?;
        if changed {
            self.write_document(&document).await?;
            debug!(path = %self.path.display(), "Phase store document written");
        }
        Ok(outcome)
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

#[async_trait]
impl PhaseStore for FilePhaseStore {
    async fn load(&self, product_type: &ProductType) -> Result<Vec<PhaseDefinition>, StoreError> {
        let mut document = self.read_document().await?;
        let mut definitions = document.workflows.remove(product_type).unwrap_or_default();
        sort_definitions(&mut definitions);
        Ok(definitions)
    }

    async fn product_types(&self) -> Result<Vec<ProductType>, StoreError> {
        let document = self.read_document().await?;
        Ok(document.workflows.into_keys().collect())
    }

    async fn replace_workflow(
        &self,
        product_type: &ProductType,
        definitions: &[PhaseDefinition],
    ) -> Result<(), StoreError> {
        let mut snapshot = definitions.to_vec();
        sort_definitions(&mut snapshot);
        self.update(move |document| {
            document.workflows.insert(product_type.clone(), snapshot);
            Ok(((), true))
        })
        .await
    }

    async fn reassign_orders(
        &self,
        product_type: &ProductType,
        orders: &[(PhaseName, u32)],
    ) -> Result<(), StoreError> {
        self.update(|document| {
            let current = document
                .workflows
                .get(product_type)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let updated = apply_orders(product_type, current, orders)?;
            document.workflows.insert(product_type.clone(), updated);
            Ok(((), true))
        })
        .await
    }

    async fn apply_canonical(
        &self,
        product_type: &ProductType,
        canonical: &[PhaseName],
    ) -> Result<Option<CanonicalRepair>, StoreError> {
        self.update(|document| {
            let Some(current) = document.workflows.get(product_type) else {
                return Ok((None, false));
            };
            let repair = CanonicalRepair::plan(current, canonical);
            if repair.is_noop() {
                return Ok((Some(repair), false));
            }
            let updated = apply_orders(product_type, current, &repair.assignments())?;
            document.workflows.insert(product_type.clone(), updated);
            Ok((Some(repair), true))
        })
        .await
    }
}
