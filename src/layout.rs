//! Layout spec: the versioned, declarative description of a generated app.
//!
//! [`LayoutBuilder`] is a pure function from a [`FieldModel`] to a
//! [`LayoutSpec`]. Given the same model and version it produces identical
//! output apart from `notes.generatedAt`; [`LayoutSpec::fingerprint`] hashes
//! everything except that timestamp.
//!
//! Every section deserializes leniently so specs written by older builders
//! still load: missing sections fall back to defaults, `ui.createForm` is read
//! as `ui.form`, and unknown page types decode as [`PageKind::Unknown`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use similar::TextDiff;

use crate::{
    config::LayoutSettings,
    data::ScalarKind,
    error::{AppError, Result},
    model::{FieldMode, FieldModel},
};

/// Shape version of the document itself, independent of per-app versions.
pub const SPEC_SCHEMA_VERSION: u32 = 1;
pub const OVERVIEW_PAGE_KEY: &str = "overview";
pub const MAIN_PAGE_KEY: &str = "main";
pub const SETTINGS_PAGE_KEY: &str = "settings";
pub const MANAGED_PAGE_PREFIX: &str = "managed:";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutSpec {
    pub version: u32,
    pub schema_version: u32,
    pub app: AppSection,
    pub model: ModelSection,
    pub ui: UiSection,
    pub notes: Notes,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSection {
    pub slug: String,
    pub name: String,
    pub logo: Appearance,
    pub theme: Appearance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Appearance {
    pub mode: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSection {
    pub primary_field_key: String,
    pub managed: Vec<String>,
    pub fixed: Vec<String>,
    pub free_text: Vec<String>,
    pub field_kinds: BTreeMap<String, ScalarKind>,
    pub fixed_options: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UiSection {
    pub sidebar: Vec<SidebarItem>,
    pub pages: Vec<PageSpec>,
    pub main_list: MainListSpec,
    #[serde(alias = "createForm")]
    pub form: FormSpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SidebarItem {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageKind {
    Overview,
    MainList,
    ManagedList,
    SettingsPlaceholder,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PageSpec {
    pub key: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: PageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct MainListSpec {
    pub title: String,
    pub columns: Vec<String>,
    pub primary_key: String,
    pub search_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FormSpec {
    pub title: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Notes {
    pub generated_at: Option<DateTime<Utc>>,
    pub message: String,
}

pub fn managed_page_key(column: &str) -> String {
    format!("{MANAGED_PAGE_PREFIX}{column}")
}

impl LayoutSpec {
    pub fn page(&self, key: &str) -> Option<&PageSpec> {
        self.ui.pages.iter().find(|p| p.key == key)
    }

    /// Primary column as the runtime sees it: the list's key, else the model's.
    pub fn primary_key(&self) -> &str {
        let from_list = self.ui.main_list.primary_key.trim();
        if from_list.is_empty() {
            self.model.primary_field_key.trim()
        } else {
            from_list
        }
    }

    pub fn kind_of(&self, key: &str) -> ScalarKind {
        self.model.field_kinds.get(key).copied().unwrap_or_default()
    }

    /// Whether `key` may appear in lists, forms, and the overview.
    ///
    /// IGNORE columns are in none of the model's key lists. A spec whose
    /// model lists nothing shows every column.
    pub fn shows(&self, key: &str) -> bool {
        let model = &self.model;
        if model.managed.is_empty() && model.fixed.is_empty() && model.free_text.is_empty() {
            return true;
        }
        key == self.primary_key()
            || key == model.primary_field_key
            || [&model.managed, &model.fixed, &model.free_text]
                .iter()
                .any(|keys| keys.iter().any(|k| k == key))
    }

    pub fn options_for(&self, key: &str) -> Option<&[String]> {
        self.model.fixed_options.get(key).map(Vec::as_slice)
    }

    fn without_timestamp(&self) -> LayoutSpec {
        let mut copy = self.clone();
        copy.notes.generated_at = None;
        copy
    }

    /// SHA-256 of the canonical JSON, ignoring `notes.generatedAt`.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.without_timestamp())
            .map_err(|err| AppError::storage(format!("Serializing layout spec: {err}")))?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| AppError::storage(format!("Serializing layout spec: {err}")))
    }
}

/// Unified diff between two spec versions, ignoring generation timestamps.
pub fn diff_specs(old: &LayoutSpec, new: &LayoutSpec) -> Result<String> {
    let before = old.without_timestamp().to_pretty_json()?;
    let after = new.without_timestamp().to_pretty_json()?;
    let diff = TextDiff::from_lines(&before, &after);
    Ok(diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("v{}", old.version), &format!("v{}", new.version))
        .to_string())
}

#[derive(Debug, Clone, Default)]
pub struct LayoutBuilder {
    settings: LayoutSettings,
}

impl LayoutBuilder {
    pub fn new(settings: LayoutSettings) -> Self {
        Self { settings }
    }

    pub fn build(
        &self,
        app_slug: &str,
        app_name: &str,
        model: &FieldModel,
        version: u32,
    ) -> Result<LayoutSpec> {
        self.build_at(app_slug, app_name, model, version, Utc::now())
    }

    /// Builds the spec with an explicit generation timestamp.
    pub fn build_at(
        &self,
        app_slug: &str,
        app_name: &str,
        model: &FieldModel,
        version: u32,
        generated_at: DateTime<Utc>,
    ) -> Result<LayoutSpec> {
        if model.fields.is_empty() {
            return Err(AppError::invalid_model("The model has no fields"));
        }
        let primary = model.primary_field_key.trim();
        if primary.is_empty() {
            return Err(AppError::invalid_model("No primary field selected"));
        }
        if model.field(primary).is_none() {
            return Err(AppError::invalid_model(format!(
                "Primary field '{primary}' is not one of the model's fields"
            )));
        }

        let non_primary = || model.fields.iter().filter(|f| f.key != primary);
        let keys_of = |mode: FieldMode| -> Vec<String> {
            non_primary()
                .filter(|f| f.mode == mode)
                .map(|f| f.key.clone())
                .collect()
        };
        let managed = keys_of(FieldMode::Managed);
        let fixed = keys_of(FieldMode::Fixed);
        let free_text = keys_of(FieldMode::FreeText);

        let list_columns = std::iter::once(primary.to_string())
            .chain(
                non_primary()
                    .filter(|f| f.mode != FieldMode::Ignore)
                    .map(|f| f.key.clone()),
            )
            .take(self.settings.max_list_columns.max(1))
            .collect::<Vec<_>>();

        let form_fields = std::iter::once(primary.to_string())
            .chain(
                non_primary()
                    .filter(|f| match f.mode {
                        FieldMode::Fixed | FieldMode::FreeText => true,
                        FieldMode::Managed => self.settings.managed_in_form,
                        FieldMode::Primary | FieldMode::Ignore => false,
                    })
                    .map(|f| f.key.clone()),
            )
            .take(self.settings.max_form_fields.max(1))
            .collect::<Vec<_>>();

        let field_kinds = model
            .fields
            .iter()
            .filter(|f| f.mode != FieldMode::Ignore)
            .map(|f| (f.key.clone(), f.kind))
            .collect();
        let fixed_options = non_primary()
            .filter(|f| f.mode == FieldMode::Fixed)
            .filter_map(|f| f.fixed_options.clone().map(|options| (f.key.clone(), options)))
            .collect();

        let mut pages = vec![
            PageSpec {
                key: OVERVIEW_PAGE_KEY.to_string(),
                title: "Overview".to_string(),
                kind: PageKind::Overview,
                entity: None,
            },
            PageSpec {
                key: MAIN_PAGE_KEY.to_string(),
                title: app_name.to_string(),
                kind: PageKind::MainList,
                entity: Some(app_name.to_string()),
            },
        ];
        pages.extend(managed.iter().map(|column| PageSpec {
            key: managed_page_key(column),
            title: column.clone(),
            kind: PageKind::ManagedList,
            entity: Some(column.clone()),
        }));
        pages.push(PageSpec {
            key: SETTINGS_PAGE_KEY.to_string(),
            title: "Settings".to_string(),
            kind: PageKind::SettingsPlaceholder,
            entity: None,
        });
        let sidebar = pages
            .iter()
            .map(|page| SidebarItem {
                key: page.key.clone(),
                label: page.title.clone(),
            })
            .collect();

        Ok(LayoutSpec {
            version,
            schema_version: SPEC_SCHEMA_VERSION,
            app: AppSection {
                slug: app_slug.to_string(),
                name: app_name.to_string(),
                logo: Appearance {
                    mode: "AUTO_INITIAL".to_string(),
                },
                theme: Appearance {
                    mode: "DEFAULT".to_string(),
                },
            },
            model: ModelSection {
                primary_field_key: primary.to_string(),
                managed,
                fixed,
                free_text,
                field_kinds,
                fixed_options,
            },
            ui: UiSection {
                sidebar,
                pages,
                main_list: MainListSpec {
                    title: app_name.to_string(),
                    columns: list_columns,
                    primary_key: primary.to_string(),
                    search_key: primary.to_string(),
                },
                form: FormSpec {
                    title: format!("Create {app_name}"),
                    fields: form_fields,
                },
            },
            notes: Notes {
                generated_at: Some(generated_at),
                message: format!(
                    "Generated layout v{version}. Theme/logo can be customized later."
                ),
            },
        })
    }
}
