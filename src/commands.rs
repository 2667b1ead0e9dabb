//! Command handlers for the CLI.
//!
//! Each `pub fn` here backs one subcommand in `main.rs`. Handlers work
//! against a [`Hub`] (resolved paths plus a lazily opened store) and print
//! through [`Ui`]. Provider configs are always masked unless `--raw` is given.

use anstyle::AnsiColor;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use serde_json::Value;
use std::path::PathBuf;

use crate::app::AppType;
use crate::config::HubConfig;
use crate::doctor::run_doctor;
use crate::fs_utils::path_size;
use crate::mask::{mask_config, mask_provider, mask_providers, mask_universal};
use crate::paths::Paths;
use crate::providers::{
    self, ModelChoice, ProviderProfile, ProviderRecord, UniversalApps, UniversalModels,
    UniversalProviderInput,
};
use crate::snapshot::{SnapshotRequest, SnapshotStore, resolve_retention};
use crate::store::{Store, StoreHandle};
use crate::switch::ProviderSwitcher;
use crate::ui::Ui;

/// Resolved paths plus the provider store, opened on first use
pub struct Hub {
    pub paths: Paths,
    store: StoreHandle,
}

impl Hub {
    pub fn new(paths: Paths) -> Self {
        let store = StoreHandle::new(paths.db_file.clone());
        Self { paths, store }
    }

    pub fn store(&self) -> Result<&Store> {
        self.store
            .get()
            .with_context(|| format!("Failed to open database {}", self.store.path().display()))
    }

    pub fn switcher(&self) -> Result<ProviderSwitcher<'_>> {
        Ok(ProviderSwitcher::new(self.store()?, &self.paths))
    }

    pub fn snapshots(&self) -> SnapshotStore {
        SnapshotStore::new(self.paths.snapshots_dir.clone())
    }

    fn config(&self) -> Result<HubConfig> {
        HubConfig::read(&self.paths.config_file)
    }
}

fn format_millis(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Read a `--config` argument: inline JSON, or `@path` to read a file
pub fn read_config_arg(arg: &str) -> Result<Value> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?,
        None => arg.to_string(),
    };
    Ok(providers::parse_provider_config(&raw)?)
}

fn profile_label(record: &ProviderRecord) -> String {
    match record.profile() {
        Some(profile) => {
            let kind = match profile.kind {
                providers::ProfileKind::Api => "api",
                providers::ProfileKind::Official => "official",
            };
            match profile.vendor_key {
                Some(vendor) => format!("{} ({})", kind, vendor),
                None => kind.to_string(),
            }
        }
        None => "-".to_string(),
    }
}

// -----------------------------------------------------------------------------
// Providers
// -----------------------------------------------------------------------------

pub fn provider_list(hub: &Hub, app: Option<AppType>, ui: &Ui) -> Result<()> {
    let records = mask_providers(&hub.store()?.list_providers(app)?);

    if records.is_empty() {
        ui.warn("No providers found.");
        ui.newline();
        ui.println("Add one with:");
        ui.println(format!("  {} provider add <app> --config <json>", ui.bold("skillhub")));
        ui.println(format!("  {} provider capture <app>", ui.bold("skillhub")));
        return Ok(());
    }

    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell(""),
        ui.header_cell("App"),
        ui.header_cell("Name"),
        ui.header_cell("Id"),
        ui.header_cell("Profile"),
        ui.header_cell("Updated"),
    ]);
    for record in &records {
        table.add_row(vec![
            if record.is_current {
                ui.colored_cell(ui.icon_ok(), AnsiColor::Green)
            } else {
                ui.cell("")
            },
            ui.cell(record.app_type.as_str()),
            ui.cell(&record.name),
            ui.cell(&record.id),
            ui.cell(profile_label(record)),
            ui.cell(format_millis(record.updated_at)),
        ]);
    }

    ui.section("Providers");
    ui.println(table.to_string());
    Ok(())
}

pub fn provider_current(hub: &Hub, app: AppType, ui: &Ui) -> Result<()> {
    match hub.store()?.current_provider(app)? {
        Some(record) => show_provider(&mask_provider(&record), ui),
        None => ui.info(format!("No current provider for {}", app)),
    }
    Ok(())
}

pub fn provider_show(hub: &Hub, id: &str, raw: bool, ui: &Ui) -> Result<()> {
    let record = providers::get_provider_raw(hub.store()?, id)?;
    if raw {
        ui.warn("Showing unmasked secrets.");
        show_provider(&record, ui);
    } else {
        show_provider(&mask_provider(&record), ui);
    }
    Ok(())
}

fn show_provider(record: &ProviderRecord, ui: &Ui) {
    ui.section(format!("Provider: {}", record.name));
    ui.newline();
    let table = ui.details_table([
        ("Id", record.id.clone()),
        ("App", record.app_type.display_name().to_string()),
        ("Current", if record.is_current { "yes" } else { "no" }.to_string()),
        ("Profile", profile_label(record)),
        ("Created", format_millis(record.created_at)),
        ("Updated", format_millis(record.updated_at)),
    ]);
    ui.println(table.to_string());
    ui.newline();
    ui.json(&record.config);
}

pub fn provider_add(
    hub: &Hub,
    app: AppType,
    name: Option<&str>,
    config_arg: &str,
    ui: &Ui,
) -> Result<()> {
    let config = read_config_arg(config_arg)?;
    let record = providers::add_provider(hub.store()?, app, name, config)?;

    ui.ok(format!("Added {} provider '{}' ({})", app, record.name, record.id));
    ui.newline();
    ui.println("To make it live:");
    ui.println(format!("  skillhub provider switch {} {}", app, record.id));
    Ok(())
}

pub fn provider_update(
    hub: &Hub,
    id: &str,
    name: Option<&str>,
    config_arg: Option<&str>,
    ui: &Ui,
) -> Result<()> {
    if name.is_none() && config_arg.is_none() {
        bail!("Nothing to update.\nHint: Pass --name and/or --config.");
    }
    let config = config_arg.map(read_config_arg).transpose()?;
    let record = providers::update_provider(hub.store()?, id, name, config)?;

    ui.ok(format!("Updated provider '{}'", record.name));
    if record.is_current {
        ui.info("This provider is current; switch to it again to apply the change to live files.");
    }
    Ok(())
}

pub fn provider_delete(hub: &Hub, id: &str, ui: &Ui) -> Result<()> {
    let store = hub.store()?;
    let record = providers::get_provider_raw(store, id)?;
    if record.is_current {
        ui.warn(format!(
            "'{}' is the current {} provider; live files are left as they are.",
            record.name, record.app_type
        ));
    }
    providers::delete_provider(store, id)?;
    ui.ok(format!("Deleted provider '{}'", record.name));
    Ok(())
}

pub fn provider_capture(hub: &Hub, app: AppType, name: Option<&str>, ui: &Ui) -> Result<()> {
    let record = hub
        .switcher()?
        .capture_from_live(app, name, ProviderProfile::default())
        .with_context(|| format!("Failed to capture live {} config", app))?;

    ui.ok(format!("Captured live {} config as '{}' ({})", app, record.name, record.id));
    Ok(())
}

pub fn provider_switch(hub: &Hub, app: AppType, id: &str, ui: &Ui) -> Result<()> {
    let switcher = hub.switcher()?;
    let spinner = ui.spinner(format!("Switching {} to {}...", app, id));

    match switcher.switch_provider(app, id) {
        Ok(result) => {
            ui.spinner_finish_ok(&spinner, format!("{} now uses provider {}", app, result.switched_to));
            ui.println(ui.dim(format!(
                "  Backup id: {} (restore with: skillhub provider restore {} --backup-id {})",
                result.backup_id, app, result.backup_id
            )));
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Switch failed for {}", app));
            Err(e.into())
        }
    }
}

pub fn provider_restore(hub: &Hub, app: AppType, backup_id: Option<i64>, ui: &Ui) -> Result<()> {
    let backup = hub.switcher()?.restore_backup(app, backup_id)?;
    ui.ok(format!(
        "Restored {} live config from backup {} ({})",
        app,
        backup.id,
        format_millis(backup.created_at)
    ));
    Ok(())
}

pub fn provider_backups(hub: &Hub, app: AppType, limit: usize, ui: &Ui) -> Result<()> {
    let backups = hub.store()?.list_backups(app, limit)?;
    if backups.is_empty() {
        ui.info(format!("No backups for {}", app));
        return Ok(());
    }

    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell("Id"),
        ui.header_cell("Created"),
        ui.header_cell("Contents"),
    ]);
    for backup in &backups {
        let keys = backup
            .backup
            .as_object()
            .map(|m| m.keys().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        table.add_row(vec![
            ui.cell(backup.id.to_string()),
            ui.cell(format_millis(backup.created_at)),
            ui.cell(keys),
        ]);
    }

    ui.section(format!("Backups for {}", app.display_name()));
    ui.println(table.to_string());
    Ok(())
}

// -----------------------------------------------------------------------------
// Universal providers
// -----------------------------------------------------------------------------

/// Arguments for `universal add`
#[derive(Debug, Default)]
pub struct UniversalAddArgs {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub website: Option<String>,
    pub notes: Option<String>,
    /// Apps to enable; empty means all
    pub apps: Vec<AppType>,
    pub claude_model: Option<String>,
    pub codex_model: Option<String>,
    pub gemini_model: Option<String>,
}

impl UniversalAddArgs {
    fn into_input(self) -> UniversalProviderInput {
        let apps = if self.apps.is_empty() {
            UniversalApps::default()
        } else {
            UniversalApps {
                claude: self.apps.contains(&AppType::Claude),
                codex: self.apps.contains(&AppType::Codex),
                gemini: self.apps.contains(&AppType::Gemini),
            }
        };
        UniversalProviderInput {
            name: Some(self.name),
            base_url: Some(self.base_url),
            api_key: Some(self.api_key),
            website_url: self.website,
            notes: self.notes,
            apps: Some(apps),
            models: Some(UniversalModels {
                claude: ModelChoice { model: self.claude_model },
                codex: ModelChoice { model: self.codex_model },
                gemini: ModelChoice { model: self.gemini_model },
            }),
        }
    }
}

pub fn universal_list(hub: &Hub, ui: &Ui) -> Result<()> {
    let universals = hub.store()?.list_universal()?;
    if universals.is_empty() {
        ui.warn("No universal providers found.");
        return Ok(());
    }

    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell("Name"),
        ui.header_cell("Id"),
        ui.header_cell("Base URL"),
        ui.header_cell("API key"),
        ui.header_cell("Apps"),
    ]);
    for universal in universals.iter().map(mask_universal) {
        let apps: Vec<&str> = AppType::all()
            .into_iter()
            .filter(|app| universal.apps.is_enabled(*app))
            .map(|app| app.as_str())
            .collect();
        table.add_row(vec![
            ui.cell(&universal.name),
            ui.cell(&universal.id),
            ui.cell(&universal.base_url),
            ui.cell(&universal.api_key),
            ui.cell(apps.join(",")),
        ]);
    }

    ui.section("Universal providers");
    ui.println(table.to_string());
    Ok(())
}

pub fn universal_add(hub: &Hub, args: UniversalAddArgs, ui: &Ui) -> Result<()> {
    let universal = providers::add_universal_provider(hub.store()?, args.into_input())?;
    ui.ok(format!("Added universal provider '{}' ({})", universal.name, universal.id));
    ui.println(format!("  Apply it with: skillhub universal apply {}", universal.id));
    Ok(())
}

pub fn universal_apply(hub: &Hub, id: &str, ui: &Ui) -> Result<()> {
    let switcher = hub.switcher()?;
    let spinner = ui.spinner(format!("Applying universal provider {}...", id));

    match switcher.apply_universal_provider(id) {
        Ok(applied) => {
            ui.spinner_finish_ok(&spinner, format!("Applied to {} app(s)", applied.len()));
            for entry in &applied {
                ui.println(format!(
                    "  {} {} -> {} (backup {})",
                    ui.icon_ok(),
                    entry.switch.app_type,
                    entry.provider.name,
                    entry.switch.backup_id
                ));
            }
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, "Universal apply stopped");
            Err(e.into())
        }
    }
}

pub fn universal_delete(hub: &Hub, id: &str, ui: &Ui) -> Result<()> {
    if !hub.store()?.delete_universal(id)? {
        bail!("Universal provider not found: {}", id);
    }
    ui.ok(format!("Deleted universal provider {}", id));
    ui.println(ui.dim("  Providers already created from it are kept."));
    Ok(())
}

// -----------------------------------------------------------------------------
// Snapshots
// -----------------------------------------------------------------------------

fn configured_retention(hub: &Hub, explicit: Option<usize>) -> Result<Option<String>> {
    match explicit {
        Some(n) => Ok(Some(n.to_string())),
        None => Ok(hub.config()?.retention_hint()),
    }
}

pub fn snapshot_list(hub: &Hub, ui: &Ui) -> Result<()> {
    let snapshots = hub.snapshots();
    let listed = snapshots.list_snapshots()?;
    if listed.is_empty() {
        ui.info("No snapshots.");
        return Ok(());
    }

    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell("Id"),
        ui.header_cell("Created"),
        ui.header_cell("Operation"),
        ui.header_cell("Target"),
        ui.header_cell("Paths"),
        ui.header_cell("Size"),
    ]);
    for metadata in &listed {
        let size = path_size(&snapshots.snapshot_dir(&metadata.id))
            .map(format_bytes)
            .unwrap_or_else(|_| "?".to_string());
        table.add_row(vec![
            ui.cell(&metadata.id),
            ui.cell(
                metadata
                    .created_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
            ),
            ui.cell(metadata.operation.as_str()),
            ui.cell(&metadata.target),
            ui.cell(metadata.entries.len().to_string()),
            ui.cell(size),
        ]);
    }

    ui.section("Snapshots");
    ui.println(table.to_string());
    Ok(())
}

pub fn snapshot_show(hub: &Hub, id: &str, ui: &Ui) -> Result<()> {
    let metadata = hub.snapshots().get_snapshot(id)?;

    ui.section(format!("Snapshot: {}", metadata.id));
    ui.newline();
    let details = ui.details_table([
        ("Created", metadata.created_at.with_timezone(&Local).to_rfc3339()),
        ("Operation", metadata.operation.to_string()),
        ("Target", metadata.target.clone()),
        ("Mode", metadata.mode.as_str().to_string()),
    ]);
    ui.println(details.to_string());
    ui.newline();

    let mut table = ui.table();
    table.set_header(vec![
        ui.header_cell("Path"),
        ui.header_cell("Kind"),
        ui.header_cell("Archive"),
    ]);
    for entry in &metadata.entries {
        table.add_row(vec![
            ui.cell(entry.path.display().to_string()),
            ui.cell(entry.kind.as_str()),
            ui.cell(entry.archive_path.clone().unwrap_or_else(|| "-".into())),
        ]);
    }
    ui.println(table.to_string());
    Ok(())
}

pub fn snapshot_create(
    hub: &Hub,
    operation: &str,
    target: &str,
    mode: Option<&str>,
    retention: Option<usize>,
    affected_paths: Vec<PathBuf>,
    ui: &Ui,
) -> Result<()> {
    let request = SnapshotRequest {
        operation: operation.to_string(),
        target: target.to_string(),
        mode: mode.map(str::to_string),
        affected_paths,
        retention: configured_retention(hub, retention)?,
    };
    let created = hub.snapshots().create_snapshot(&request)?;

    ui.ok(format!(
        "Created snapshot {} ({} path(s))",
        created.metadata.id,
        created.metadata.entries.len()
    ));
    if !created.pruned_snapshot_ids.is_empty() {
        ui.info(format!(
            "Pruned {} old snapshot(s) (retention {})",
            created.pruned_snapshot_ids.len(),
            created.retention
        ));
    }
    Ok(())
}

pub fn snapshot_rollback(hub: &Hub, id: &str, yes: bool, ui: &Ui) -> Result<()> {
    let snapshots = hub.snapshots();
    let metadata = snapshots.get_snapshot(id)?;

    if !yes {
        ui.println(format!(
            "Rolling back {} will overwrite {} path(s):",
            metadata.id,
            metadata.entries.len()
        ));
        for entry in &metadata.entries {
            ui.println(format!("  {} {}", ui.icon_info(), entry.path.display()));
        }
        if !ui.confirm("Continue?", false)? {
            ui.warn("Rollback cancelled.");
            return Ok(());
        }
    }

    let spinner = ui.spinner(format!("Rolling back {}...", metadata.id));
    match snapshots.rollback_snapshot(&metadata.id) {
        Ok(report) => {
            ui.spinner_finish_ok(
                &spinner,
                format!(
                    "Rolled back {}: {} restored, {} removed",
                    report.id, report.restored_paths, report.removed_paths
                ),
            );
            Ok(())
        }
        Err(e) => {
            ui.spinner_finish_err(&spinner, format!("Rollback of {} failed", metadata.id));
            Err(e.into())
        }
    }
}

pub fn snapshot_prune(hub: &Hub, retention: Option<usize>, ui: &Ui) -> Result<()> {
    let configured = configured_retention(hub, retention)?;
    let retention = resolve_retention(configured.as_deref());
    let removed = hub.snapshots().prune_snapshots(retention)?;

    if removed.is_empty() {
        ui.ok(format!("Nothing to prune (retention {})", retention));
    } else {
        ui.ok(format!("Removed {} snapshot(s) (retention {})", removed.len(), retention));
        for id in &removed {
            ui.println(format!("  {} {}", ui.icon_info(), id));
        }
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Config and doctor
// -----------------------------------------------------------------------------

pub fn config_show(hub: &Hub, ui: &Ui) -> Result<()> {
    let config = hub.config()?;
    let effective = resolve_retention(config.retention_hint().as_deref());

    ui.section("Configuration");
    ui.newline();
    let table = ui.details_table([
        ("Config file", hub.paths.config_file.display().to_string()),
        ("Database", hub.paths.db_file.display().to_string()),
        ("Snapshots", hub.paths.snapshots_dir.display().to_string()),
        (
            "Retention (configured)",
            config
                .snapshot_retention
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".into()),
        ),
        ("Retention (effective)", effective.to_string()),
    ]);
    ui.println(table.to_string());

    if !config.extra.is_empty() {
        ui.newline();
        ui.println(ui.dim("Other keys (managed elsewhere):"));
        ui.json(&mask_config(&Value::Object(config.extra.clone())));
    }
    Ok(())
}

pub fn config_set_retention(hub: &Hub, retention: usize, ui: &Ui) -> Result<()> {
    if retention == 0 {
        bail!("Retention must be a positive integer");
    }
    let mut config = hub.config()?;
    config.snapshot_retention = Some(retention as i64);
    config.write(&hub.paths.config_file)?;

    ui.ok(format!("Snapshot retention set to {}", retention));
    if let Ok(env_value) = std::env::var(crate::snapshot::RETENTION_ENV_KEY) {
        ui.warn(format!(
            "{}={} overrides this setting.",
            crate::snapshot::RETENTION_ENV_KEY,
            env_value
        ));
    }
    Ok(())
}

pub fn doctor(hub: &Hub, ui: &Ui) -> Result<()> {
    let failed = run_doctor(hub, ui);
    if failed == 0 {
        ui.ok("No problems found.");
    } else {
        ui.warn(format!("{} check(s) reported problems.", failed));
    }
    Ok(())
}
