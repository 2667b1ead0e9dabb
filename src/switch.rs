//! Provider switching.
//!
//! This module implements the core mechanism of `skillhub`: making a stored
//! provider the live configuration of a tool. A switch:
//! - Backs up the live config into the ledger before touching anything.
//! - Folds manual edits back into the provider being switched away from.
//! - Merges, validates and atomically writes the new live config.
//! - Flips the current flag in one store transaction.
//!
//! Any failure after the backup is reported with the failing step and the
//! backup id; failures at or after the write step restore that backup first.

use serde::Serialize;
use serde_json::Value;

use crate::adapters::{AdapterTable, LiveAdapter, ensure_object};
use crate::app::AppType;
use crate::error::{HubError, Result, SwitchStep};
use crate::paths::Paths;
use crate::providers::{
    self, LiveBackup, ProfileKind, ProviderProfile, ProviderRecord, attach_profile,
    preserve_profile, sanitize_official_config, universal_provider_config,
};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchResult {
    pub app_type: AppType,
    pub current_provider_id: String,
    pub backup_id: i64,
    pub switched_from: Option<String>,
    pub switched_to: String,
}

/// One app's outcome from applying a universal provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedProvider {
    pub provider: ProviderRecord,
    pub switch: SwitchResult,
}

/// Runs switches and restores against one store and a table of adapters
pub struct ProviderSwitcher<'a> {
    store: &'a Store,
    adapters: AdapterTable,
}

impl<'a> ProviderSwitcher<'a> {
    pub fn new(store: &'a Store, paths: &Paths) -> Self {
        Self {
            store,
            adapters: AdapterTable::for_paths(paths),
        }
    }

    /// Replace the adapter for the app type it reports
    pub fn with_adapter(mut self, adapter: Box<dyn LiveAdapter>) -> Self {
        self.adapters.replace(adapter);
        self
    }

    pub fn store(&self) -> &Store {
        self.store
    }

    pub fn read_live(&self, app: AppType) -> Result<Value> {
        self.adapters.get(app)?.read_live()
    }

    /// Make `provider_id` the live configuration for `app`
    pub fn switch_provider(&self, app: AppType, provider_id: &str) -> Result<SwitchResult> {
        let target = self
            .store
            .get_provider(provider_id)?
            .ok_or_else(|| HubError::not_found("Target provider", provider_id))?;
        if target.app_type != app {
            return Err(HubError::AppMismatch {
                provider_id: provider_id.to_string(),
                app,
            });
        }

        let adapter = self.adapters.get(app)?;
        let current = self.store.current_provider(app)?;

        let live_before = adapter.read_live()?;
        let backup_id = self
            .store
            .add_live_backup(app, &live_before, providers::now_millis())?;
        tracing::info!(app = %app, backup_id, "Backed up live config");

        if let Some(current) = current.as_ref().filter(|c| c.id != target.id) {
            let backfilled = preserve_profile(&live_before, &current.config);
            self.store
                .update_provider_config(&current.id, &backfilled, providers::now_millis())?;
            tracing::debug!(provider_id = %current.id, "Backfilled outgoing provider from live config");
        }

        let next = match adapter.merge(&live_before, &target.config) {
            Ok(next) => next,
            Err(e) => {
                return Err(HubError::Switch {
                    step: SwitchStep::Merge,
                    app,
                    backup_id,
                    rollback: None,
                    source: Box::new(e),
                });
            }
        };

        if let Err(e) = adapter.validate(&next) {
            return Err(HubError::Switch {
                step: SwitchStep::Validate,
                app,
                backup_id,
                rollback: None,
                source: Box::new(e),
            });
        }

        if let Err(e) = adapter.write_live(&next) {
            return Err(self.rolled_back(SwitchStep::WriteLive, app, backup_id, e));
        }

        let flipped = self
            .store
            .set_current_provider(app, &target.id, providers::now_millis())
            .and_then(|found| {
                if found {
                    Ok(())
                } else {
                    Err(HubError::not_found("Provider", target.id.as_str()))
                }
            });
        if let Err(e) = flipped {
            return Err(self.rolled_back(SwitchStep::SetCurrent, app, backup_id, e));
        }

        let switched_from = current.map(|c| c.id);
        tracing::info!(
            app = %app,
            from = switched_from.as_deref().unwrap_or("-"),
            to = %target.id,
            backup_id,
            "Switched provider"
        );

        Ok(SwitchResult {
            app_type: app,
            current_provider_id: target.id.clone(),
            backup_id,
            switched_from,
            switched_to: target.id,
        })
    }

    /// Restore `backup_id`, then wrap `source` as a switch failure at `step`
    fn rolled_back(&self, step: SwitchStep, app: AppType, backup_id: i64, source: HubError) -> HubError {
        let rollback = match self.restore_backup(app, Some(backup_id)) {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(app = %app, backup_id, error = %e, "Rollback after failed switch failed");
                Some(Box::new(e))
            }
        };
        HubError::Switch {
            step,
            app,
            backup_id,
            rollback,
            source: Box::new(source),
        }
    }

    /// Write a backup back to the live files
    ///
    /// With no id, the most recent backup for `app` is used.
    pub fn restore_backup(&self, app: AppType, backup_id: Option<i64>) -> Result<LiveBackup> {
        let backup = match backup_id {
            Some(id) => self
                .store
                .get_backup(id)?
                .ok_or_else(|| HubError::not_found("Backup", id.to_string()))?,
            None => self
                .store
                .latest_backup(app)?
                .ok_or(HubError::NoBackup(app))?,
        };
        if backup.app_type != app {
            return Err(HubError::Validation(format!(
                "Backup {} belongs to app {}, not {}",
                backup.id, backup.app_type, app
            )));
        }

        self.adapters.get(app)?.write_live(&backup.backup)?;
        tracing::info!(app = %app, backup_id = backup.id, "Restored live config from backup");
        Ok(backup)
    }

    /// Store whatever is live for `app` as a new official provider
    pub fn capture_from_live(
        &self,
        app: AppType,
        name: Option<&str>,
        profile: ProviderProfile,
    ) -> Result<ProviderRecord> {
        let live = self.read_live(app)?;
        ensure_object(&live, "Live config")?;

        let captured = sanitize_official_config(app, &live);
        let profile = ProviderProfile {
            kind: ProfileKind::Official,
            ..profile
        };
        providers::add_provider(self.store, app, name, attach_profile(captured, &profile)?)
    }

    /// Upsert one provider per enabled app for a universal provider and
    /// switch each of them live, in app order
    ///
    /// The first failing switch aborts the remaining apps.
    pub fn apply_universal_provider(&self, universal_id: &str) -> Result<Vec<AppliedProvider>> {
        let universal = providers::get_universal_provider(self.store, universal_id)?;

        let mut applied = Vec::new();
        for app in AppType::all() {
            if !universal.apps.is_enabled(app) {
                continue;
            }

            let config = universal_provider_config(&universal, app)?;
            let existing = self
                .store
                .list_providers(Some(app))?
                .into_iter()
                .find(|p| {
                    p.profile()
                        .and_then(|profile| profile.universal_id)
                        .as_deref()
                        == Some(universal.id.as_str())
                });

            let provider = match existing {
                Some(existing) => providers::update_provider(
                    self.store,
                    &existing.id,
                    Some(&universal.name),
                    Some(config),
                )?,
                None => providers::add_provider(self.store, app, Some(&universal.name), config)?,
            };

            let switch = self.switch_provider(app, &provider.id)?;
            applied.push(AppliedProvider {
                provider: providers::get_provider_raw(self.store, &provider.id)?,
                switch,
            });
        }

        tracing::info!(universal_id = %universal.id, apps = applied.len(), "Applied universal provider");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Adapter;
    use crate::fs_utils::write_json_atomic;
    use crate::providers::{UniversalApps, UniversalProviderInput, add_provider};
    use crate::test_utils::{memory_store, setup_test_paths};
    use serde_json::json;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    /// Delegates to a real adapter but fails the first `failures` writes
    struct FlakyWrites {
        inner: Adapter,
        failures: Cell<usize>,
    }

    impl FlakyWrites {
        fn new(app: AppType, paths: &Paths, failures: usize) -> Box<Self> {
            Box::new(Self {
                inner: Adapter::for_app(app, paths),
                failures: Cell::new(failures),
            })
        }
    }

    impl LiveAdapter for FlakyWrites {
        fn app_type(&self) -> AppType {
            self.inner.app_type()
        }

        fn read_live(&self) -> Result<Value> {
            self.inner.read_live()
        }

        fn merge(&self, live: &Value, provider: &Value) -> Result<Value> {
            self.inner.merge(live, provider)
        }

        fn validate(&self, config: &Value) -> Result<()> {
            self.inner.validate(config)
        }

        fn write_live(&self, config: &Value) -> Result<()> {
            let left = self.failures.get();
            if left > 0 {
                self.failures.set(left - 1);
                return Err(HubError::Validation("simulated disk failure".into()));
            }
            self.inner.write_live(config)
        }
    }

    /// Deletes a provider through a second connection while writing, so the
    /// commit step that follows finds nothing to mark current
    struct DeletesTargetOnWrite {
        inner: Adapter,
        store: Store,
        provider_id: String,
    }

    impl LiveAdapter for DeletesTargetOnWrite {
        fn app_type(&self) -> AppType {
            self.inner.app_type()
        }

        fn read_live(&self) -> Result<Value> {
            self.inner.read_live()
        }

        fn merge(&self, live: &Value, provider: &Value) -> Result<Value> {
            self.inner.merge(live, provider)
        }

        fn validate(&self, config: &Value) -> Result<()> {
            self.inner.validate(config)
        }

        fn write_live(&self, config: &Value) -> Result<()> {
            self.store.delete_provider(&self.provider_id)?;
            self.inner.write_live(config)
        }
    }

    fn read_json(path: &std::path::Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_switch_backfills_manual_edits() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        write_json_atomic(
            &paths.claude_settings,
            &json!({"api_key": "live-old", "model": "legacy-model"}),
        )
        .unwrap();

        let p1 = add_provider(&store, AppType::Claude, Some("P1"), json!({"api_key": "p1-key", "model": "p1-model"})).unwrap();
        let p2 = add_provider(&store, AppType::Claude, Some("P2"), json!({"api_key": "p2-key"})).unwrap();

        let first = switcher.switch_provider(AppType::Claude, &p1.id).unwrap();
        assert_eq!(first.switched_from, None);
        assert_eq!(first.switched_to, p1.id);
        assert_eq!(
            read_json(&paths.claude_settings),
            json!({"api_key": "p1-key", "model": "p1-model"})
        );
        // the pre-switch state is in the ledger
        assert_eq!(
            store.get_backup(first.backup_id).unwrap().unwrap().backup,
            json!({"api_key": "live-old", "model": "legacy-model"})
        );

        let manual = json!({"api_key": "manual-key", "model": "p1-model", "theme": "dark"});
        write_json_atomic(&paths.claude_settings, &manual).unwrap();

        let second = switcher.switch_provider(AppType::Claude, &p2.id).unwrap();
        assert_eq!(second.switched_from.as_deref(), Some(p1.id.as_str()));
        assert!(second.backup_id > first.backup_id);
        assert_eq!(store.get_backup(second.backup_id).unwrap().unwrap().backup, manual);

        let p1_after = store.get_provider(&p1.id).unwrap().unwrap();
        assert_eq!(p1_after.config, manual);
        assert!(!p1_after.is_current);
        assert_eq!(
            read_json(&paths.claude_settings),
            json!({"api_key": "p2-key", "model": "p1-model", "theme": "dark"})
        );

        // switching back restores exactly what was live under P1
        switcher.switch_provider(AppType::Claude, &p1.id).unwrap();
        assert_eq!(read_json(&paths.claude_settings), manual);
        assert_eq!(store.count_current(AppType::Claude).unwrap(), 1);
    }

    #[test]
    fn test_backfill_keeps_profile() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        let p1 = add_provider(
            &store,
            AppType::Claude,
            Some("P1"),
            json!({"api_key": "a", "_profile": {"kind": "api", "note": "work"}}),
        )
        .unwrap();
        let p2 = add_provider(&store, AppType::Claude, Some("P2"), json!({"api_key": "b"})).unwrap();

        switcher.switch_provider(AppType::Claude, &p1.id).unwrap();
        // _profile never reaches the live file
        assert_eq!(read_json(&paths.claude_settings), json!({"api_key": "a"}));

        switcher.switch_provider(AppType::Claude, &p2.id).unwrap();
        let p1_after = store.get_provider(&p1.id).unwrap().unwrap();
        assert_eq!(p1_after.config["_profile"]["note"], "work");
        assert_eq!(p1_after.config["api_key"], "a");
    }

    #[test]
    fn test_switch_rejects_unknown_and_mismatched() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        let err = switcher.switch_provider(AppType::Claude, "missing").unwrap_err();
        assert_eq!(err.to_string(), "Target provider not found: missing");

        let gemini = add_provider(&store, AppType::Gemini, None, json!({"env": {}})).unwrap();
        let err = switcher.switch_provider(AppType::Claude, &gemini.id).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Provider {} does not belong to app claude", gemini.id)
        );
        // nothing was backed up
        assert!(store.latest_backup(AppType::Claude).unwrap().is_none());
    }

    #[test]
    fn test_validation_failure_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        let empty = add_provider(&store, AppType::Gemini, None, json!({"note": "no sections"})).unwrap();
        let err = switcher.switch_provider(AppType::Gemini, &empty.id).unwrap_err();

        assert!(matches!(
            err,
            HubError::Switch {
                step: SwitchStep::Validate,
                rollback: None,
                ..
            }
        ));
        assert!(err.backup_id().is_some());
        assert!(!paths.gemini_env.exists());
        assert!(!paths.gemini_settings.exists());
        assert!(store.current_provider(AppType::Gemini).unwrap().is_none());
    }

    #[test]
    fn test_merge_failure_names_step_and_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        let broken = add_provider(&store, AppType::Codex, None, json!({"settingsToml": "model = "})).unwrap();
        let err = switcher.switch_provider(AppType::Codex, &broken.id).unwrap_err();

        assert!(matches!(
            err,
            HubError::Switch {
                step: SwitchStep::Merge,
                rollback: None,
                ..
            }
        ));
        assert!(err.to_string().starts_with("Provider switch failed at merge for codex. Backup id: "));
        assert!(err.backup_id().is_some());
        assert!(!paths.codex_config.exists());
        assert!(store.current_provider(AppType::Codex).unwrap().is_none());
    }

    #[test]
    fn test_write_failure_rolls_back() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();

        let original = json!({"api_key": "live-old", "model": "legacy-model"});
        write_json_atomic(&paths.claude_settings, &original).unwrap();
        let before = fs::read_to_string(&paths.claude_settings).unwrap();

        let p1 = add_provider(&store, AppType::Claude, None, json!({"api_key": "p1"})).unwrap();
        let p2 = add_provider(&store, AppType::Claude, None, json!({"api_key": "p2"})).unwrap();
        ProviderSwitcher::new(&store, &paths)
            .switch_provider(AppType::Claude, &p1.id)
            .unwrap();
        write_json_atomic(&paths.claude_settings, &original).unwrap();

        let switcher = ProviderSwitcher::new(&store, &paths)
            .with_adapter(FlakyWrites::new(AppType::Claude, &paths, 1));
        let err = switcher.switch_provider(AppType::Claude, &p2.id).unwrap_err();

        assert!(matches!(
            err,
            HubError::Switch {
                step: SwitchStep::WriteLive,
                rollback: None,
                ..
            }
        ));
        assert!(err.to_string().contains("Root cause: simulated disk failure"));
        assert_eq!(fs::read_to_string(&paths.claude_settings).unwrap(), before);
        assert_eq!(store.current_provider(AppType::Claude).unwrap().unwrap().id, p1.id);
    }

    #[test]
    fn test_write_failure_reports_failed_rollback() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let p1 = add_provider(&store, AppType::Claude, None, json!({"api_key": "p1"})).unwrap();

        let switcher = ProviderSwitcher::new(&store, &paths)
            .with_adapter(FlakyWrites::new(AppType::Claude, &paths, 2));
        let err = switcher.switch_provider(AppType::Claude, &p1.id).unwrap_err();

        let msg = err.to_string();
        assert!(msg.starts_with("Provider switch failed at writeLive for claude. Backup id: "));
        assert!(msg.contains("Rollback failed: simulated disk failure."));
        assert!(store.current_provider(AppType::Claude).unwrap().is_none());
    }

    #[test]
    fn test_commit_failure_rolls_back() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = Store::open(&paths.db_file).unwrap();

        let original = json!({"env": {"GEMINI_API_KEY": "old"}, "settings": {"model": "gemini-2.0"}});
        Adapter::for_app(AppType::Gemini, &paths)
            .write_live(&original)
            .unwrap();
        let env_before = fs::read_to_string(&paths.gemini_env).unwrap();

        let target = add_provider(&store, AppType::Gemini, None, json!({"env": {"GEMINI_API_KEY": "new"}})).unwrap();
        let switcher = ProviderSwitcher::new(&store, &paths).with_adapter(Box::new(DeletesTargetOnWrite {
            inner: Adapter::for_app(AppType::Gemini, &paths),
            store: Store::open(&paths.db_file).unwrap(),
            provider_id: target.id.clone(),
        }));

        let err = switcher.switch_provider(AppType::Gemini, &target.id).unwrap_err();
        assert!(matches!(
            err,
            HubError::Switch {
                step: SwitchStep::SetCurrent,
                ..
            }
        ));
        // the rollback write goes through the same adapter and deletes nothing new
        assert_eq!(fs::read_to_string(&paths.gemini_env).unwrap(), env_before);
        assert_eq!(store.count_current(AppType::Gemini).unwrap(), 0);
    }

    #[test]
    fn test_codex_switch_leaves_absent_half_untouched() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        fs::create_dir_all(paths.codex_auth.parent().unwrap()).unwrap();
        fs::write(&paths.codex_auth, "{\"OPENAI_API_KEY\": \"sk-live\"}").unwrap();
        fs::write(&paths.codex_config, "model = \"gpt-5\"\napproval_policy = \"never\"\n").unwrap();

        let provider = add_provider(
            &store,
            AppType::Codex,
            None,
            json!({"settingsToml": {"model": "gpt-5.2"}}),
        )
        .unwrap();
        switcher.switch_provider(AppType::Codex, &provider.id).unwrap();

        assert_eq!(
            fs::read_to_string(&paths.codex_auth).unwrap(),
            "{\"OPENAI_API_KEY\": \"sk-live\"}"
        );
        let settings: toml::Table =
            toml::from_str(&fs::read_to_string(&paths.codex_config).unwrap()).unwrap();
        assert_eq!(settings["model"].as_str(), Some("gpt-5.2"));
        assert_eq!(settings["approval_policy"].as_str(), Some("never"));
    }

    #[test]
    fn test_codex_datetimes_survive_switch_and_restore() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        fs::create_dir_all(paths.codex_config.parent().unwrap()).unwrap();
        fs::write(
            &paths.codex_config,
            "model = \"gpt-5\"\ntrusted_since = 1979-05-27T07:32:00Z\n",
        )
        .unwrap();
        let read_settings = || -> toml::Table {
            toml::from_str(&fs::read_to_string(&paths.codex_config).unwrap()).unwrap()
        };

        let provider = add_provider(
            &store,
            AppType::Codex,
            None,
            json!({"settingsToml": {"model": "gpt-5.2"}}),
        )
        .unwrap();
        let result = switcher.switch_provider(AppType::Codex, &provider.id).unwrap();

        let switched = read_settings();
        assert_eq!(switched["model"].as_str(), Some("gpt-5.2"));
        assert_eq!(
            switched["trusted_since"].as_datetime().map(|dt| dt.to_string()),
            Some("1979-05-27T07:32:00Z".to_string())
        );

        switcher.restore_backup(AppType::Codex, Some(result.backup_id)).unwrap();
        let restored = read_settings();
        assert_eq!(restored["model"].as_str(), Some("gpt-5"));
        assert!(restored["trusted_since"].is_datetime());
    }

    #[test]
    fn test_restore_latest_and_by_id() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        let err = switcher.restore_backup(AppType::Claude, None).unwrap_err();
        assert_eq!(err.to_string(), "No backup found for app claude");

        write_json_atomic(&paths.claude_settings, &json!({"v": 1})).unwrap();
        let p1 = add_provider(&store, AppType::Claude, None, json!({"v": 2})).unwrap();
        let p2 = add_provider(&store, AppType::Claude, None, json!({"v": 3})).unwrap();
        let first = switcher.switch_provider(AppType::Claude, &p1.id).unwrap();
        switcher.switch_provider(AppType::Claude, &p2.id).unwrap();

        let latest = switcher.restore_backup(AppType::Claude, None).unwrap();
        assert_eq!(latest.backup, json!({"v": 2}));
        assert_eq!(read_json(&paths.claude_settings), json!({"v": 2}));

        switcher.restore_backup(AppType::Claude, Some(first.backup_id)).unwrap();
        assert_eq!(read_json(&paths.claude_settings), json!({"v": 1}));

        assert!(switcher.restore_backup(AppType::Gemini, Some(first.backup_id)).is_err());
        assert!(switcher.restore_backup(AppType::Claude, Some(9999)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_capture_from_live_official_codex() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        fs::create_dir_all(paths.codex_auth.parent().unwrap()).unwrap();
        fs::write(
            &paths.codex_auth,
            r#"{"OPENAI_API_KEY": "sk-should-drop", "auth_mode": "chatgpt", "tokens": {"id_token": "x"}}"#,
        )
        .unwrap();

        let captured = switcher
            .capture_from_live(
                AppType::Codex,
                Some("work login"),
                ProviderProfile {
                    account_name: Some("me@work".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(captured.name, "work login");
        assert_eq!(captured.config["auth"]["OPENAI_API_KEY"], Value::Null);
        assert_eq!(captured.config["auth"]["auth_mode"], "chatgpt");
        let profile = captured.profile().unwrap();
        assert_eq!(profile.kind, ProfileKind::Official);
        assert_eq!(profile.account_name.as_deref(), Some("me@work"));
    }

    #[test]
    fn test_apply_universal_provider_upserts_and_switches() {
        let temp = TempDir::new().unwrap();
        let paths = setup_test_paths(&temp);
        let store = memory_store();
        let switcher = ProviderSwitcher::new(&store, &paths);

        let universal = providers::add_universal_provider(
            &store,
            UniversalProviderInput {
                name: Some("Team Relay".into()),
                base_url: Some("https://relay.example/v1".into()),
                api_key: Some("sk-relay-abcdef".into()),
                apps: Some(UniversalApps {
                    claude: true,
                    codex: true,
                    gemini: false,
                }),
                ..Default::default()
            },
        )
        .unwrap();

        let applied = switcher.apply_universal_provider(&universal.id).unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].switch.app_type, AppType::Claude);
        assert_eq!(applied[1].switch.app_type, AppType::Codex);
        assert!(applied.iter().all(|a| a.provider.is_current));

        assert_eq!(read_json(&paths.claude_settings)["api_base_url"], "https://relay.example/v1");
        let settings: toml::Table =
            toml::from_str(&fs::read_to_string(&paths.codex_config).unwrap()).unwrap();
        assert_eq!(settings["model_provider"].as_str(), Some("team_relay"));
        assert!(!paths.gemini_env.exists());

        // applying again updates the same records instead of adding new ones
        let again = switcher.apply_universal_provider(&universal.id).unwrap();
        assert_eq!(again[0].provider.id, applied[0].provider.id);
        assert_eq!(store.list_providers(Some(AppType::Claude)).unwrap().len(), 1);
    }
}
