//! Export, import preview and all-or-nothing import.

use super::{Engine, KanbanService};
use crate::error::{KanbanError, KanbanResult};
use crate::logging::log_outcome;
use crate::state::{State, Unit, UnitBuilder};
use crate::transfer::document::{check_schema_version, ExportDocument};
use crate::transfer::export::build_document;
use crate::transfer::import::{plan_import, ConflictResolution, ImportOptions, ImportReport};
use crate::worker::{BatchGuard, CancellationToken, JobHandle};
use log::info;
use std::sync::Arc;
use std::time::Instant;

impl Engine {
    fn export(&self, token: Option<&CancellationToken>) -> KanbanResult<ExportDocument> {
        let snapshot = self.snapshot();
        let mut batches = BatchGuard::new(token, self.batch_size);
        build_document(&snapshot, self.clock.now_ms(), &mut batches)
    }

    /// Plans against a snapshot, then commits under the writer lock.
    ///
    /// A unit planned on a stale snapshot is discarded and planned again
    /// while holding the lock. Cancellation is honored up to the commit.
    pub(super) fn import(
        &self,
        document: &ExportDocument,
        options: ImportOptions,
        token: Option<&CancellationToken>,
    ) -> KanbanResult<ImportReport> {
        check_schema_version(&document.header.schema_version)?;
        let mut batches = BatchGuard::new(token, self.batch_size);

        let planned_on = self.snapshot();
        let planned = plan_merge(
            &planned_on,
            document,
            options.resolution,
            self.next_timestamp(),
            &mut batches,
        )?;

        let repo = self.lock_writer();
        let current = self.snapshot();
        let (report, unit) = if current.version() == planned_on.version() {
            planned
        } else {
            info!(
                "event=import_replan module=transfer status=start planned_version={} current_version={}",
                planned_on.version(),
                current.version()
            );
            plan_merge(
                &current,
                document,
                options.resolution,
                self.next_timestamp(),
                &mut batches,
            )?
        };
        drop(current);
        drop(planned_on);
        batches.check()?;
        self.publish(&repo, &unit)?;
        info!(
            "event=import_commit module=transfer status=ok created={} identical={} conflicts={} overwritten={} history_appended={} history_skipped={}",
            report.created,
            report.identical,
            report.conflicts.len(),
            report.overwritten,
            report.history_appended,
            report.history_skipped
        );
        Ok(report)
    }
}

/// Plans the merge and proves the merged state valid. Every appended
/// history entry must name a record, live or tombstoned, of the merged store.
fn plan_merge(
    state: &State,
    document: &ExportDocument,
    resolution: ConflictResolution,
    timestamp: i64,
    batches: &mut BatchGuard<'_>,
) -> KanbanResult<(ImportReport, Unit)> {
    let mut builder = UnitBuilder::new(timestamp, state.ledger().next_seq());
    let report = plan_import(state, document, resolution, &mut builder, batches)?;
    if resolution == ConflictResolution::Reject && report.has_conflicts() {
        return Err(KanbanError::ImportConflict(report.conflicts));
    }
    let unit = builder.finish();
    let mut merged = state.clone();
    merged.apply(&unit);
    merged.store().validate_all()?;
    if let Some(orphan) = unit
        .history
        .iter()
        .find(|entry| merged.store().get(&entry.entity_id).is_none())
    {
        return Err(KanbanError::integrity(format!(
            "history entry {} references unknown entity {}",
            orphan.id, orphan.entity_id
        )));
    }
    Ok((report, unit))
}

impl KanbanService {
    /// Serializes the current snapshot.
    pub fn export_document(&self) -> KanbanResult<ExportDocument> {
        let started_at = Instant::now();
        let result = self.engine.export(None);
        log_outcome("export", "snapshot", started_at, &result);
        result
    }

    pub fn export_bytes(&self) -> KanbanResult<Vec<u8>> {
        self.export_document()?.to_bytes()
    }

    /// Serializes the current snapshot on the background worker.
    pub fn export_in_background(&self) -> KanbanResult<JobHandle<Vec<u8>>> {
        let engine = Arc::clone(&self.engine);
        self.worker.submit(move |token| {
            let started_at = Instant::now();
            let result = engine
                .export(Some(token))
                .and_then(|document| document.to_bytes());
            log_outcome("export_background", "snapshot", started_at, &result);
            result
        })
    }

    /// Classifies every incoming record without writing anything.
    ///
    /// Conflicts are reported, not raised, whatever the resolution.
    pub fn preview_import(
        &self,
        document: &ExportDocument,
        options: ImportOptions,
    ) -> KanbanResult<ImportReport> {
        let started_at = Instant::now();
        let result = check_schema_version(&document.header.schema_version).and_then(|_| {
            let snapshot = self.snapshot();
            let mut builder = UnitBuilder::new(
                self.engine.next_timestamp(),
                snapshot.ledger().next_seq(),
            );
            plan_import(
                &snapshot,
                document,
                options.resolution,
                &mut builder,
                &mut BatchGuard::foreground(),
            )
        });
        log_outcome("import_preview", "document", started_at, &result);
        result
    }

    /// Merges `document` atomically: everything or nothing is written.
    ///
    /// # Errors
    /// - `SchemaVersionMismatch` before any record is inspected.
    /// - `ImportConflict` under `Reject` when any record conflicts.
    /// - `IntegrityViolation` when the merged store would break an invariant
    ///   or an incoming history entry names no known record.
    pub fn import_document(
        &self,
        document: &ExportDocument,
        options: ImportOptions,
    ) -> KanbanResult<ImportReport> {
        let started_at = Instant::now();
        let result = self.engine.import(document, options, None);
        log_outcome("import", "document", started_at, &result);
        result
    }

    pub fn import_bytes(&self, bytes: &[u8], options: ImportOptions) -> KanbanResult<ImportReport> {
        let document = ExportDocument::from_bytes(bytes)?;
        self.import_document(&document, options)
    }

    /// Runs the import on the background worker. A cancelled import writes
    /// nothing and resolves to `Cancelled`.
    pub fn import_in_background(
        &self,
        document: ExportDocument,
        options: ImportOptions,
    ) -> KanbanResult<JobHandle<ImportReport>> {
        let engine = Arc::clone(&self.engine);
        self.worker.submit(move |token| {
            let started_at = Instant::now();
            let result = engine.import(&document, options, Some(token));
            log_outcome("import_background", "document", started_at, &result);
            result
        })
    }
}
