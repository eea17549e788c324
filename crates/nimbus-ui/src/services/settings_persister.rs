//! Writes persisted preferences back to disk whenever one changes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use anyhow::Context;
use parking_lot::Mutex;

use crate::observer::ObserverHandle;
use crate::state::StateKey;
use crate::store::StateStore;

const PERSISTED_KEYS: [StateKey; 5] = [
    StateKey::ThemeMode,
    StateKey::Language,
    StateKey::Unit,
    StateKey::City,
    StateKey::UsingLocation,
];

pub struct SettingsPersister {
    path: PathBuf,
    observer: ObserverHandle,
    store: Weak<StateStore>,
}

impl SettingsPersister {
    pub fn attach(store: &Arc<StateStore>, path: PathBuf) -> Self {
        let weak = Arc::downgrade(store);
        let write_lock = Arc::new(Mutex::new(()));

        let target = path.clone();
        let source = weak.clone();
        let observer = ObserverHandle::new("settings-persister", move |_| {
            let path = target.clone();
            let store = source.clone();
            let write_lock = write_lock.clone();
            async move {
                tokio::task::spawn_blocking(move || save_snapshot(&store, &path, &write_lock))
                    .await
                    .context("settings writer stopped")?
            }
        });

        for key in PERSISTED_KEYS {
            store.register_observer(key, &observer);
        }
        tracing::debug!("Persisting settings to {:?}", path);

        Self {
            path,
            observer,
            store: weak,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn detach(&self) {
        self.observer.retire();
        if let Some(store) = self.store.upgrade() {
            for key in PERSISTED_KEYS {
                store.unregister_observer(key, &self.observer);
            }
        }
    }
}

/// Snapshot under the write lock so the last write always holds the newest state
fn save_snapshot(store: &Weak<StateStore>, path: &Path, write_lock: &Mutex<()>) -> anyhow::Result<()> {
    let _guard = write_lock.lock();
    let Some(store) = store.upgrade() else {
        return Ok(());
    };
    let settings = store.snapshot().to_settings();
    settings
        .save(path)
        .with_context(|| format!("failed to save settings to {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ApplicationState;
    use nimbus_core::Settings;
    use nimbus_weather::{ThemeMode, Units};
    use std::time::Duration;
    use tokio::runtime::Handle;

    async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..50 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        check()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_changes_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = Arc::new(StateStore::new(ApplicationState::default(), Handle::current()));
        let _persister = SettingsPersister::attach(&store, path.clone());

        store.update([
            (StateKey::ThemeMode, ThemeMode::Dark.into()),
            (StateKey::Unit, Units::Imperial.into()),
            (StateKey::City, "Tallinn".into()),
        ]);

        let written = wait_for(|| {
            matches!(
                Settings::load(&path),
                Ok(Some(s)) if s.last_city == "Tallinn"
                    && s.unit == Units::Imperial
                    && s.theme_mode == ThemeMode::Dark
            )
        })
        .await;
        assert!(written);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_coordinates_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = Arc::new(StateStore::new(ApplicationState::default(), Handle::current()));
        let persister = SettingsPersister::attach(&store, path.clone());
        assert_eq!(persister.path(), path);

        store.set(StateKey::CurrentLat, Some(1.5));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!path.exists());

        persister.detach();
        store.set(StateKey::City, "Riga");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!path.exists());
    }
}
