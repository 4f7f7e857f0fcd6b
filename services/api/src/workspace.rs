//! Session view-models: the sheets of one upload as the user sees and edits
//! them. Edits stay here until an explicit save.

use ingest::{CellValue, DataRow, IngestResult, Ingestion, NewFileRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Prefix of file ids handed out when the store could not take the file.
pub const LOCAL_ID_PREFIX: &str = "local-";

pub fn local_file_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4())
}

pub fn is_local(file_id: &str) -> bool {
    file_id.starts_with(LOCAL_ID_PREFIX)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("sheet '{0}' not found")]
    UnknownSheet(String),

    #[error("row {row} not found in sheet '{sheet}'")]
    RowOutOfRange { sheet: String, row: usize },

    #[error("column '{column}' not found in sheet '{sheet}'")]
    UnknownColumn { sheet: String, column: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Workspace {
    pub file_id: String,
    pub file_name: String,
    pub size: u64,
    pub persisted: bool,
    /// True while there are edits not yet saved.
    pub dirty: bool,
    pub sheets: IngestResult,
    #[serde(skip)]
    revision: u64,
    /// Held for the whole of a save so two saves cannot both create a file.
    #[serde(skip)]
    save_lock: Arc<Mutex<()>>,
}

impl Workspace {
    pub fn new(file_id: String, persisted: bool, ingestion: Ingestion) -> Self {
        Self {
            file_id,
            file_name: ingestion.file_name,
            size: ingestion.size,
            persisted,
            dirty: false,
            sheets: ingestion.sheets,
            revision: 0,
            save_lock: Arc::default(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn record(&self) -> NewFileRecord {
        NewFileRecord::from_sheets(&self.file_name, self.size, &self.sheets)
    }

    /// Row `row` (0-based) of `sheet`.
    pub fn row(&self, sheet: &str, row: usize) -> Result<&DataRow, EditError> {
        self.sheets
            .get(sheet)
            .ok_or_else(|| EditError::UnknownSheet(sheet.to_string()))?
            .rows
            .get(row)
            .ok_or_else(|| EditError::RowOutOfRange {
                sheet: sheet.to_string(),
                row,
            })
    }

    fn row_mut(&mut self, sheet: &str, row: usize) -> Result<&mut DataRow, EditError> {
        self.sheets
            .get_mut(sheet)
            .ok_or_else(|| EditError::UnknownSheet(sheet.to_string()))?
            .rows
            .get_mut(row)
            .ok_or_else(|| EditError::RowOutOfRange {
                sheet: sheet.to_string(),
                row,
            })
    }

    /// Overwrite one existing cell.
    pub fn edit_cell(
        &mut self,
        sheet: &str,
        row: usize,
        column: &str,
        value: CellValue,
    ) -> Result<(), EditError> {
        let cell = self
            .row_mut(sheet, row)?
            .get_mut(column)
            .ok_or_else(|| EditError::UnknownColumn {
                sheet: sheet.to_string(),
                column: column.to_string(),
            })?;
        *cell = value;
        self.touch();
        Ok(())
    }

    /// Remove a whole row; later rows move up by one.
    pub fn delete_row(&mut self, sheet: &str, row: usize) -> Result<DataRow, EditError> {
        let rows = &mut self
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| EditError::UnknownSheet(sheet.to_string()))?
            .rows;
        if row >= rows.len() {
            return Err(EditError::RowOutOfRange {
                sheet: sheet.to_string(),
                row,
            });
        }
        let removed = rows.remove(row);
        self.touch();
        Ok(removed)
    }

    /// Record a successful save of the state at `revision`.
    pub fn mark_saved(&mut self, file_id: String, revision: u64) {
        self.file_id = file_id;
        self.persisted = true;
        self.dirty = self.revision != revision;
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.dirty = true;
    }
}

/// Open workspaces by id.
#[derive(Default)]
pub struct Workspaces {
    inner: RwLock<HashMap<Uuid, Workspace>>,
}

impl Workspaces {
    pub async fn insert(&self, workspace: Workspace) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.insert(id, workspace);
        id
    }

    pub async fn snapshot(&self, id: Uuid) -> Option<Workspace> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Run `f` on the workspace under the write lock.
    pub async fn update<T>(&self, id: Uuid, f: impl FnOnce(&mut Workspace) -> T) -> Option<T> {
        self.inner.write().await.get_mut(&id).map(f)
    }

    pub async fn save_lock(&self, id: Uuid) -> Option<Arc<Mutex<()>>> {
        self.inner.read().await.get(&id).map(|ws| ws.save_lock.clone())
    }

    /// Close a workspace, dropping any unsaved edits.
    pub async fn remove(&self, id: Uuid) -> Option<Workspace> {
        self.inner.write().await.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::{ingest_with, IngestOptions, CASE_ID_COLUMN};

    fn workspace() -> Workspace {
        let ingestion = ingest_with(
            b"Id,Status,Valor\n1,Pendente,10\n2,Ok,20\n3,Ok,30\n",
            "casos.csv",
            None,
            IngestOptions { year: 2024 },
        )
        .unwrap();
        Workspace::new(local_file_id(), false, ingestion)
    }

    #[test]
    fn test_local_ids() {
        let id = local_file_id();
        assert!(is_local(&id));
        assert!(!is_local(&Uuid::new_v4().to_string()));
    }

    #[test]
    fn test_edit_cell_marks_dirty() {
        let mut ws = workspace();
        ws.edit_cell("Sheet 1", 1, "Status", CellValue::from("Erro")).unwrap();

        assert!(ws.dirty);
        assert_eq!(ws.row("Sheet 1", 1).unwrap()["Status"], CellValue::from("Erro"));
    }

    #[test]
    fn test_edit_rejects_unknown_targets() {
        let mut ws = workspace();
        assert_eq!(
            ws.edit_cell("Nope", 0, "Status", CellValue::Null),
            Err(EditError::UnknownSheet("Nope".to_string()))
        );
        assert!(matches!(
            ws.edit_cell("Sheet 1", 9, "Status", CellValue::Null),
            Err(EditError::RowOutOfRange { row: 9, .. })
        ));
        assert!(matches!(
            ws.edit_cell("Sheet 1", 0, "Coluna", CellValue::Null),
            Err(EditError::UnknownColumn { .. })
        ));
        assert!(!ws.dirty);
    }

    #[test]
    fn test_delete_row_shifts_rows() {
        let mut ws = workspace();
        let removed = ws.delete_row("Sheet 1", 0).unwrap();

        assert_eq!(removed[CASE_ID_COLUMN], CellValue::from("1"));
        assert_eq!(ws.sheets["Sheet 1"].rows.len(), 2);
        assert_eq!(ws.row("Sheet 1", 0).unwrap()[CASE_ID_COLUMN], CellValue::from("2"));
        assert!(ws.delete_row("Sheet 1", 2).is_err());
    }

    #[test]
    fn test_record_reflects_edits() {
        let mut ws = workspace();
        ws.delete_row("Sheet 1", 2).unwrap();
        let record = ws.record();
        assert_eq!(record.rows.len(), 2);
        assert_eq!(record.name, "casos.csv");
    }

    #[test]
    fn test_mark_saved_keeps_later_edits_dirty() {
        let mut ws = workspace();
        ws.edit_cell("Sheet 1", 0, "Status", CellValue::from("Ok")).unwrap();
        let saved_at = ws.revision();
        ws.edit_cell("Sheet 1", 1, "Status", CellValue::from("Erro")).unwrap();

        ws.mark_saved("f1".to_string(), saved_at);
        assert!(ws.persisted);
        assert!(ws.dirty);

        ws.mark_saved("f1".to_string(), ws.revision());
        assert!(!ws.dirty);
    }

    #[tokio::test]
    async fn test_registry_update() {
        let registry = Workspaces::default();
        let id = registry.insert(workspace()).await;

        let edited = registry
            .update(id, |ws| ws.edit_cell("Sheet 1", 0, "Valor", CellValue::from("5,00")))
            .await;
        assert_eq!(edited, Some(Ok(())));
        assert!(registry.snapshot(id).await.unwrap().dirty);
        assert!(registry.snapshot(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_registry_remove() {
        let registry = Workspaces::default();
        let id = registry.insert(workspace()).await;
        let other = registry.insert(workspace()).await;

        let removed = registry.remove(id).await.unwrap();
        assert_eq!(removed.file_name, "casos.csv");
        assert!(registry.remove(id).await.is_none());
        assert!(registry.snapshot(id).await.is_none());
        assert!(registry.save_lock(id).await.is_none());
        assert!(registry.snapshot(other).await.is_some());
    }

    #[tokio::test]
    async fn test_save_lock_is_shared_per_workspace() {
        let registry = Workspaces::default();
        let id = registry.insert(workspace()).await;
        let other = registry.insert(workspace()).await;

        let lock = registry.save_lock(id).await.unwrap();
        let _guard = lock.lock().await;
        assert!(registry.save_lock(id).await.unwrap().try_lock().is_err());
        assert!(registry.save_lock(other).await.unwrap().try_lock().is_ok());
    }
}
