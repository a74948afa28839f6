//! Generation pipeline: field model plus source rows to a stored, populated spec.
//!
//! Order matters. The model is validated first so an invalid model persists
//! nothing; the version is assigned and the spec stored atomically as DRAFT;
//! rows are imported into the new scope without their IGNORE columns; the
//! spec is activated last, even when some import chunks failed.

use log::info;

use crate::{
    config::Settings,
    data::RecordData,
    error::Result,
    import::{ImportReport, import_rows},
    layout::LayoutBuilder,
    model::{FieldMode, FieldModel},
    store::{RecordStore, Scope, SpecStatus, SpecStore, StoredSpec},
};

#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub app_slug: &'a str,
    pub app_name: &'a str,
    pub model: &'a FieldModel,
    pub rows: Vec<RecordData>,
    /// Leave the new version as DRAFT when false.
    pub activate: bool,
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub spec: StoredSpec,
    pub import: ImportReport,
}

pub struct Generator<'a> {
    specs: &'a dyn SpecStore,
    records: &'a dyn RecordStore,
    builder: LayoutBuilder,
    options_cap: usize,
    chunk_size: usize,
}

impl<'a> Generator<'a> {
    pub fn new(specs: &'a dyn SpecStore, records: &'a dyn RecordStore, settings: &Settings) -> Self {
        Self {
            specs,
            records,
            builder: LayoutBuilder::new(settings.layout.clone()),
            options_cap: settings.classifier.fixed_options_cap,
            chunk_size: settings.import.chunk_size,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn generate(&self, request: GenerateRequest<'_>) -> Result<GenerationReport> {
        request.model.validate(self.options_cap)?;

        let stored = self.specs.create_next_version(
            request.app_slug,
            SpecStatus::Draft,
            &mut |version: u32| {
                self.builder
                    .build(request.app_slug, request.app_name, request.model, version)
            },
        )?;
        let scope = Scope::new(request.app_slug, stored.version);
        let ignored = request.model.keys_with_mode(FieldMode::Ignore);
        let rows = request
            .rows
            .into_iter()
            .map(|mut row| {
                for key in &ignored {
                    row.shift_remove(key);
                }
                row
            })
            .collect();
        let import = import_rows(self.records, &scope, rows, self.chunk_size);

        let spec = if request.activate {
            self.specs.activate(request.app_slug, stored.version)?
        } else {
            stored
        };
        info!(
            "Generated '{}' v{} ({}): imported {} of {} row(s)",
            request.app_slug,
            spec.version,
            spec.status.as_str(),
            import.imported,
            import.attempted
        );
        Ok(GenerationReport { spec, import })
    }
}
