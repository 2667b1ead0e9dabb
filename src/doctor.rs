//! Diagnostics for `skillhub doctor`.
//!
//! Checks, in order:
//! - The hub directories exist.
//! - config.json parses and the effective snapshot retention.
//! - The provider database opens and no app has more than one current provider.
//! - Every app's live config files parse.
//! - Every snapshot's metadata is readable and its archives are present and
//!   inside the snapshot directory.

use anstyle::AnsiColor;
use std::fs;

use crate::adapters::{Adapter, LiveAdapter};
use crate::app::AppType;
use crate::commands::Hub;
use crate::config::HubConfig;
use crate::fs_utils::PathKind;
use crate::snapshot::resolve_retention;
use crate::store::Store;
use crate::ui::Ui;

/// Run every check; returns the number of checks that found problems
pub fn run_doctor(hub: &Hub, ui: &Ui) -> usize {
    let paths = &hub.paths;
    ui.section("skillhub doctor");
    ui.newline();

    let mut failed = 0;

    failed += check_step(ui, "Directories", || {
        for (label, dir) in [
            ("Hub directory", &paths.base_dir),
            ("Snapshot directory", &paths.snapshots_dir),
        ] {
            if dir.is_dir() {
                ui.println(format!("  {} {}: {}", ui.icon_ok(), label, dir.display()));
            } else {
                // created on first use
                ui.println(format!("  {} {} missing: {}", ui.icon_warn(), label, dir.display()));
            }
        }
        true
    });

    failed += check_step(ui, "Config", || match HubConfig::read(&paths.config_file) {
        Ok(config) => {
            let retention = resolve_retention(config.retention_hint().as_deref());
            ui.println(format!("  {} config.json readable", ui.icon_ok()));
            ui.println(format!("  {} Snapshot retention: {}", ui.icon_info(), retention));
            true
        }
        Err(e) => {
            ui.println(format!("  {} {:#}", ui.icon_err(), e));
            false
        }
    });

    failed += check_step(ui, "Database", || {
        if !paths.db_file.exists() {
            ui.println(format!("  {} No database yet: {}", ui.icon_info(), paths.db_file.display()));
            return true;
        }
        match hub.store() {
            Ok(store) => check_store(store, ui),
            Err(e) => {
                ui.println(format!("  {} Failed to open database: {:#}", ui.icon_err(), e));
                false
            }
        }
    });

    failed += check_step(ui, "Live configs", || {
        let mut ok = true;
        for app in AppType::all() {
            let present: Vec<_> = app.live_files(paths).into_iter().filter(|p| p.exists()).collect();
            if present.is_empty() {
                ui.println(format!("  {} {}: no live files", ui.icon_info(), app.display_name()));
                continue;
            }
            match Adapter::for_app(app, paths).read_live() {
                Ok(_) => ui.println(format!("  {} {}: {} file(s) parse", ui.icon_ok(), app.display_name(), present.len())),
                Err(e) => {
                    ui.println(format!("  {} {}: {}", ui.icon_err(), app.display_name(), e));
                    ok = false;
                }
            }
        }
        ok
    });

    failed += check_step(ui, "Snapshots", || check_snapshots(hub, ui));

    failed
}

fn check_store(store: &Store, ui: &Ui) -> bool {
    let mut ok = true;
    for app in AppType::all() {
        let providers = match store.list_providers(Some(app)) {
            Ok(providers) => providers,
            Err(e) => {
                ui.println(format!("  {} {}: {}", ui.icon_err(), app, e));
                ok = false;
                continue;
            }
        };
        let current = providers.iter().filter(|p| p.is_current).count();
        match current {
            0 | 1 => ui.println(format!(
                "  {} {}: {} provider(s), {} current",
                ui.icon_ok(),
                app,
                providers.len(),
                current
            )),
            n => {
                ui.println(format!("  {} {}: {} providers marked current", ui.icon_err(), app, n));
                ok = false;
            }
        }
    }
    ok
}

fn check_snapshots(hub: &Hub, ui: &Ui) -> bool {
    let snapshots = hub.snapshots();
    let listed = match snapshots.list_snapshots() {
        Ok(listed) => listed,
        Err(e) => {
            ui.println(format!("  {} {}", ui.icon_err(), e));
            return false;
        }
    };

    let dir_count = fs::read_dir(snapshots.root())
        .map(|entries| entries.filter_map(|e| e.ok()).filter(|e| e.path().is_dir()).count())
        .unwrap_or(0);
    let mut ok = true;
    if dir_count > listed.len() {
        ui.println(format!(
            "  {} {} snapshot director(ies) with unreadable metadata",
            ui.icon_warn(),
            dir_count - listed.len()
        ));
    }

    for metadata in &listed {
        let dir = snapshots.snapshot_dir(&metadata.id);
        let broken: Vec<String> = metadata
            .entries
            .iter()
            .filter(|entry| entry.kind != PathKind::Missing)
            .filter_map(|entry| snapshots.archive_location(&dir, entry).err())
            .map(|e| e.to_string())
            .collect();
        if broken.is_empty() {
            continue;
        }
        ok = false;
        ui.println(format!("  {} {}", ui.icon_err(), metadata.id));
        for problem in broken {
            ui.println(format!("      {}", problem));
        }
    }

    if ok {
        ui.println(format!("  {} {} snapshot(s) intact", ui.icon_ok(), listed.len()));
    }
    ok
}

/// Returns 1 when the check found problems
fn check_step<F>(ui: &Ui, name: &str, check_fn: F) -> usize
where
    F: FnOnce() -> bool,
{
    ui.println(ui.bold(format!("Checking {}...", name)));
    let passed = check_fn();
    if !passed {
        ui.println(ui.colored("  Issues detected!", AnsiColor::Red));
    }
    ui.newline();
    usize::from(!passed)
}
