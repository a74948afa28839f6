//! Generic CRUD runtime.
//!
//! [`AppRuntime`] interprets an ACTIVE [`LayoutSpec`] against a
//! [`RecordStore`] scope. It owns the navigation state, the loaded record
//! page and search query, the create/edit modal, the pending delete
//! confirmation, and inline notices. Every page is produced by one match over
//! [`Page`]; nothing here is specific to a particular app.
//!
//! Failures never escape as transport errors: store errors arrive as
//! [`AppError`] kinds, are recorded as dismissible [`Notice`]s, and are also
//! returned so callers can react.

use log::debug;
use serde_json::Value as JsonValue;

use crate::{
    classify::{distinct_values, unique_count},
    config::RuntimeSettings,
    data::{FieldValue, RecordData, ScalarKind, display_value, non_empty_text, parse_field_value},
    error::{AppError, Result},
    layout::{
        LayoutSpec, MAIN_PAGE_KEY, MANAGED_PAGE_PREFIX, OVERVIEW_PAGE_KEY, PageKind,
        SETTINGS_PAGE_KEY, SidebarItem,
    },
    store::{ListQuery, MAX_TAKE, Record, RecordStore, Scope, SpecStore},
};

/// The closed set of page variants the runtime can render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Overview,
    MainList,
    Managed(String),
    /// Settings, unknown page types, and keys the spec does not describe.
    Unavailable(String),
}

impl Page {
    pub fn resolve(spec: &LayoutSpec, key: &str) -> Page {
        match spec.page(key) {
            Some(page) => match page.kind {
                PageKind::Overview => Page::Overview,
                PageKind::MainList => Page::MainList,
                PageKind::ManagedList => {
                    let column = key
                        .strip_prefix(MANAGED_PAGE_PREFIX)
                        .map(str::to_string)
                        .or_else(|| page.entity.clone());
                    match column {
                        Some(column) if !column.is_empty() => Page::Managed(column),
                        _ => Page::Unavailable(key.to_string()),
                    }
                }
                PageKind::SettingsPlaceholder | PageKind::Unknown => {
                    Page::Unavailable(key.to_string())
                }
            },
            None => match key {
                OVERVIEW_PAGE_KEY => Page::Overview,
                MAIN_PAGE_KEY => Page::MainList,
                _ => match key.strip_prefix(MANAGED_PAGE_PREFIX) {
                    Some(column) if !column.is_empty() => Page::Managed(column.to_string()),
                    _ => Page::Unavailable(key.to_string()),
                },
            },
        }
    }
}

/// Sidebar state machine over the spec's page keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    menu: Vec<SidebarItem>,
    known: Vec<String>,
    current: String,
}

impl Navigator {
    pub fn new(spec: &LayoutSpec) -> Self {
        let sidebar = if spec.ui.sidebar.is_empty() {
            spec.ui
                .pages
                .iter()
                .map(|page| SidebarItem {
                    key: page.key.clone(),
                    label: page.title.clone(),
                })
                .collect()
        } else {
            spec.ui.sidebar.clone()
        };
        let known = sidebar
            .iter()
            .map(|item| item.key.clone())
            .chain(spec.ui.pages.iter().map(|page| page.key.clone()))
            .collect();
        let current = sidebar
            .first()
            .map(|item| item.key.clone())
            .unwrap_or_else(|| OVERVIEW_PAGE_KEY.to_string());
        let menu = sidebar
            .into_iter()
            .filter(|item| item.key != SETTINGS_PAGE_KEY)
            .collect();
        Self {
            menu,
            known,
            current,
        }
    }

    /// Navigable entries; the settings stub is never offered.
    pub fn menu(&self) -> &[SidebarItem] {
        &self.menu
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn is_known(&self, key: &str) -> bool {
        self.known.iter().any(|known| known == key)
    }

    /// Moves to `key` when the spec defines it; returns whether it moved.
    pub fn select(&mut self, key: &str) -> bool {
        if self.is_known(key) {
            self.current = key.to_string();
            true
        } else {
            debug!("Ignoring navigation to undefined page '{key}'");
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub retryable: bool,
}

impl From<&AppError> for Notice {
    fn from(err: &AppError) -> Self {
        Self {
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormTarget {
    Creating,
    Editing(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub key: String,
    pub kind: ScalarKind,
    /// Closed choices for FIXED columns.
    pub options: Option<Vec<String>>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub title: String,
    pub target: FormTarget,
    pub fields: Vec<FormField>,
    /// Stored data of the edited record; non-form columns are written back unchanged.
    base: RecordData,
    pub error: Option<String>,
}

impl FormState {
    pub fn value(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }

    /// Validates changed fields lazily and merges them over the base record.
    ///
    /// A field still showing its stored value keeps the stored JSON as is.
    fn to_data(&self) -> Result<RecordData> {
        let mut data = self.base.clone();
        for field in &self.fields {
            let untouched = self
                .base
                .get(&field.key)
                .is_some_and(|stored| display_value(stored) == field.value);
            if untouched {
                continue;
            }
            let value = match &field.options {
                Some(options) => fixed_choice(field, options)?,
                None => parse_field_value(&field.key, &field.value, field.kind)?.into_json(),
            };
            data.insert(field.key.clone(), value);
        }
        Ok(data)
    }
}

/// FIXED input must be one of the snapshot options, compared and stored verbatim.
fn fixed_choice(field: &FormField, options: &[String]) -> Result<JsonValue> {
    let choice = field.value.trim();
    if choice.is_empty() {
        return Ok(FieldValue::Empty.into_json());
    }
    if options.iter().any(|option| option == choice) {
        Ok(JsonValue::String(choice.to_string()))
    } else {
        Err(AppError::InvalidValue {
            field: field.key.clone(),
            message: format!("'{choice}' is not one of: {}", options.join(", ")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Modal {
    #[default]
    Closed,
    Open(FormState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListView {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<ListRow>,
    pub total: usize,
    pub search_key: String,
    pub query: String,
    /// Zero-based page index and page count.
    pub page: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedView {
    pub key: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kpi {
    pub label: String,
    pub value: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleCard {
    pub title: String,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewView {
    pub kpis: Vec<Kpi>,
    pub sample: Option<SampleCard>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Overview(OverviewView),
    MainList(ListView),
    Managed(ManagedView),
    Unavailable { key: String },
}

pub struct AppRuntime<'a> {
    spec: LayoutSpec,
    scope: Scope,
    records: &'a dyn RecordStore,
    settings: RuntimeSettings,
    navigator: Navigator,
    query: String,
    offset: usize,
    loaded: Vec<Record>,
    total: usize,
    unfiltered_total: usize,
    modal: Modal,
    pending_delete: Option<String>,
    notices: Vec<Notice>,
}

impl<'a> AppRuntime<'a> {
    /// Loads the app's ACTIVE spec and its first page of records.
    pub fn open(
        specs: &dyn SpecStore,
        records: &'a dyn RecordStore,
        app: &str,
        settings: RuntimeSettings,
    ) -> Result<Self> {
        let active = specs.active(app)?;
        let scope = Scope::new(app, active.version);
        let mut runtime = Self::new(active.spec, scope, records, settings);
        runtime.refresh()?;
        Ok(runtime)
    }

    /// A runtime over `spec` with nothing loaded yet.
    pub fn new(
        spec: LayoutSpec,
        scope: Scope,
        records: &'a dyn RecordStore,
        settings: RuntimeSettings,
    ) -> Self {
        let navigator = Navigator::new(&spec);
        Self {
            spec,
            scope,
            records,
            settings,
            navigator,
            query: String::new(),
            offset: 0,
            loaded: Vec::new(),
            total: 0,
            unfiltered_total: 0,
            modal: Modal::Closed,
            pending_delete: None,
            notices: Vec::new(),
        }
    }

    pub fn spec(&self) -> &LayoutSpec {
        &self.spec
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn records(&self) -> &[Record] {
        &self.loaded
    }

    /// Live records matching the current query.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Live records of the scope, whatever the query.
    pub fn unfiltered_total(&self) -> usize {
        self.unfiltered_total
    }

    fn page_size(&self) -> usize {
        self.settings.page_size.clamp(1, MAX_TAKE)
    }

    pub fn page_index(&self) -> usize {
        self.offset / self.page_size()
    }

    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.page_size()).max(1)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn modal(&self) -> &Modal {
        &self.modal
    }

    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn dismiss_notice(&mut self, index: usize) {
        if index < self.notices.len() {
            self.notices.remove(index);
        }
    }

    fn report(&mut self, err: &AppError) {
        self.notices.push(Notice::from(err));
    }

    fn primary_key(&self) -> &str {
        self.spec.primary_key()
    }

    fn title(&self) -> String {
        let title = self.spec.ui.main_list.title.trim();
        if title.is_empty() {
            self.spec.app.name.clone()
        } else {
            title.to_string()
        }
    }

    /// Refetches the current page of records for the current query.
    pub fn refresh(&mut self) -> Result<()> {
        match self.fetch_page() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    fn fetch_page(&mut self) -> Result<()> {
        let primary = self.primary_key();
        let mut query = ListQuery {
            search_key: (!primary.is_empty()).then(|| primary.to_string()),
            query: Some(self.query.clone()),
            skip: self.offset,
            take: self.page_size(),
        };
        let mut page = self.records.list(&self.scope, &query)?;
        if page.records.is_empty() && self.offset > 0 {
            // The page emptied under us; fall back to the last one.
            self.offset = (page.total.max(1) - 1) / self.page_size() * self.page_size();
            query.skip = self.offset;
            page = self.records.list(&self.scope, &query)?;
        }
        self.unfiltered_total = if self.query.trim().is_empty() {
            page.total
        } else {
            let all = ListQuery {
                take: 1,
                ..ListQuery::default()
            };
            self.records.list(&self.scope, &all)?.total
        };
        self.loaded = page.records;
        self.total = page.total;
        Ok(())
    }

    /// Case-insensitive substring search on the primary field; blank shows all.
    /// Starts again from the first page.
    pub fn search(&mut self, query: &str) -> Result<()> {
        self.query = query.to_string();
        self.offset = 0;
        self.refresh()
    }

    /// Loads the zero-based page `index`, clamped to the last page.
    pub fn go_to_page(&mut self, index: usize) -> Result<()> {
        let last = self.page_count() - 1;
        self.offset = index.min(last) * self.page_size();
        self.refresh()
    }

    pub fn current_page(&self) -> Page {
        Page::resolve(&self.spec, self.navigator.current())
    }

    /// Navigates to `key`; undefined keys leave the state unchanged.
    pub fn select_page(&mut self, key: &str) -> Page {
        if self.navigator.select(key) {
            self.current_page()
        } else {
            Page::Unavailable(key.to_string())
        }
    }

    pub fn view(&self) -> View {
        match self.current_page() {
            Page::Overview => View::Overview(self.overview()),
            Page::MainList => View::MainList(self.main_list()),
            Page::Managed(key) => View::Managed(self.managed_list(&key)),
            Page::Unavailable(key) => View::Unavailable { key },
        }
    }

    /// Spec columns, or the shown columns of the first loaded record.
    pub fn list_columns(&self) -> Vec<String> {
        let from_spec = non_blank(&self.spec.ui.main_list.columns);
        if !from_spec.is_empty() {
            return from_spec;
        }
        let primary = self.primary_key();
        match self.loaded.first() {
            Some(record) => {
                let keys = record
                    .data
                    .keys()
                    .filter(|k| k.as_str() != primary && self.spec.shows(k))
                    .cloned();
                (!primary.is_empty())
                    .then(|| primary.to_string())
                    .into_iter()
                    .chain(keys)
                    .take(self.settings.list_column_fallback.max(1))
                    .collect()
            }
            None if primary.is_empty() => Vec::new(),
            None => vec![primary.to_string()],
        }
    }

    /// Form fields, list columns, or the primary key alone, whichever is first non-empty.
    pub fn form_fields(&self) -> Vec<String> {
        let from_spec = non_blank(&self.spec.ui.form.fields);
        if !from_spec.is_empty() {
            return from_spec;
        }
        let columns = self.list_columns();
        if !columns.is_empty() {
            return columns;
        }
        let primary = self.primary_key();
        if primary.is_empty() {
            Vec::new()
        } else {
            vec![primary.to_string()]
        }
    }

    pub fn main_list(&self) -> ListView {
        let columns = self.list_columns();
        let rows = self
            .loaded
            .iter()
            .map(|record| ListRow {
                id: record.id.clone(),
                cells: columns
                    .iter()
                    .map(|c| record.data.get(c).map(display_value).unwrap_or_default())
                    .collect(),
            })
            .collect();
        ListView {
            title: self.title(),
            columns,
            rows,
            total: self.total,
            search_key: self.primary_key().to_string(),
            query: self.query.clone(),
            page: self.page_index(),
            pages: self.page_count(),
        }
    }

    /// Distinct values of `key` across the loaded records, first appearance first.
    pub fn managed_values(&self, key: &str) -> Vec<String> {
        distinct_values(
            self.loaded.iter().map(|r| r.data.get(key)),
            self.settings.managed_display_limit,
        )
    }

    pub fn managed_list(&self, key: &str) -> ManagedView {
        ManagedView {
            key: key.to_string(),
            values: self.managed_values(key),
        }
    }

    fn count_unique(&self, key: &str) -> usize {
        unique_count(self.loaded.iter().map(|r| r.data.get(key)), self.loaded.len())
    }

    pub fn overview(&self) -> OverviewView {
        let mut kpis = vec![Kpi {
            label: format!("Total {}", self.title()),
            value: Some(self.unfiltered_total),
        }];
        kpis.push(match self.spec.model.managed.first() {
            Some(key) => Kpi {
                label: format!("Unique {key}"),
                value: Some(self.count_unique(key)),
            },
            None => Kpi {
                label: "Managed".to_string(),
                value: None,
            },
        });
        kpis.push(match self.spec.model.fixed.first() {
            Some(key) => Kpi {
                label: format!("{key} options"),
                value: Some(self.count_unique(key)),
            },
            None => Kpi {
                label: "Fixed".to_string(),
                value: None,
            },
        });

        let primary = self.primary_key();
        let sample = self.loaded.first().map(|record| SampleCard {
            title: non_empty_text(record.data.get(primary)).unwrap_or_else(|| "—".to_string()),
            fields: record
                .data
                .iter()
                .filter(|(key, _)| key.as_str() != primary && self.spec.shows(key))
                .take(3)
                .map(|(key, value)| (key.clone(), display_value(value)))
                .collect(),
        });
        OverviewView { kpis, sample }
    }

    fn form_state(&self, target: FormTarget, base: RecordData) -> FormState {
        let fields = self
            .form_fields()
            .into_iter()
            .map(|key| FormField {
                kind: self.spec.kind_of(&key),
                options: self.spec.options_for(&key).map(<[String]>::to_vec),
                value: base.get(&key).map(display_value).unwrap_or_default(),
                key,
            })
            .collect();
        let title = match (&target, self.spec.ui.form.title.trim()) {
            (FormTarget::Editing(_), _) => format!("Edit {}", self.title()),
            (FormTarget::Creating, "") => format!("Create {}", self.title()),
            (FormTarget::Creating, title) => title.to_string(),
        };
        FormState {
            title,
            target,
            fields,
            base,
            error: None,
        }
    }

    /// Opens a blank form, replacing any open one.
    pub fn open_create(&mut self) {
        self.modal = Modal::Open(self.form_state(FormTarget::Creating, RecordData::new()));
    }

    /// Reads `id` from the store, so records on other pages are reachable too.
    fn live_record(&mut self, id: &str) -> Result<Record> {
        match self.records.fetch(&self.scope, id) {
            Ok(record) => Ok(record),
            Err(err) => {
                self.report(&err);
                if matches!(err, AppError::RecordNotFound(_)) {
                    let _ = self.refresh();
                }
                Err(err)
            }
        }
    }

    /// Opens the form pre-filled from the stored record, replacing any open one.
    pub fn open_edit(&mut self, id: &str) -> Result<()> {
        let record = self.live_record(id)?;
        let mut base = record.data;
        for key in self.form_fields() {
            base.entry(key).or_insert_with(|| JsonValue::String(String::new()));
        }
        self.modal = Modal::Open(self.form_state(FormTarget::Editing(id.to_string()), base));
        Ok(())
    }

    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        let Modal::Open(form) = &mut self.modal else {
            return Err(no_open_form());
        };
        let field = form
            .fields
            .iter_mut()
            .find(|f| f.key == key)
            .ok_or_else(|| AppError::InvalidValue {
                field: key.to_string(),
                message: "not a field of this form".to_string(),
            })?;
        field.value = value.to_string();
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.modal = Modal::Closed;
    }

    /// Validates and submits the open form.
    ///
    /// Success closes the form and refetches. Failure keeps it open with the
    /// error; a vanished target also triggers a refetch.
    pub fn save(&mut self) -> Result<Record> {
        let outcome = {
            let Modal::Open(form) = &self.modal else {
                return Err(no_open_form());
            };
            form.to_data().and_then(|data| match &form.target {
                FormTarget::Creating => self.records.create(&self.scope, data),
                FormTarget::Editing(id) => self.records.update(&self.scope, id, data),
            })
        };
        match outcome {
            Ok(record) => {
                self.modal = Modal::Closed;
                self.refresh()?;
                Ok(record)
            }
            Err(err) => {
                if let Modal::Open(form) = &mut self.modal {
                    form.error = Some(err.to_string());
                }
                self.report(&err);
                if matches!(err, AppError::RecordNotFound(_)) {
                    let _ = self.refresh();
                }
                Err(err)
            }
        }
    }

    /// Asks for confirmation before deleting a live record.
    pub fn request_delete(&mut self, id: &str) -> Result<()> {
        let record = self.live_record(id)?;
        self.pending_delete = Some(record.id);
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Soft-deletes the confirmed record and refetches either way.
    pub fn confirm_delete(&mut self) -> Result<()> {
        let Some(id) = self.pending_delete.take() else {
            return Err(AppError::InvalidValue {
                field: "delete".to_string(),
                message: "no delete is awaiting confirmation".to_string(),
            });
        };
        let outcome = self.records.soft_delete(&self.scope, &id);
        if let Err(err) = &outcome {
            self.report(err);
        }
        let refreshed = self.refresh();
        outcome.and(refreshed)
    }
}

fn non_blank(keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn no_open_form() -> AppError {
    AppError::InvalidValue {
        field: "form".to_string(),
        message: "no form is open".to_string(),
    }
}
