use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, thread};

use notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, DebouncedEvent, DebouncedEventKind, new_debouncer};
use tracing::{debug, info, trace, warn};

use crate::actor::effects::{self, Event};
use crate::common::collections::HashSet;
use crate::common::config::Config;

/// Watches the config file and sends every successfully parsed, changed
/// config to the effects controller.
pub struct ConfigWatcher {
    file: PathBuf,
    real_file: Option<PathBuf>,
    real_file_id: Option<(u64, u64)>,
    current: Config,
    events_tx: effects::Sender,
}

impl ConfigWatcher {
    pub fn spawn(events_tx: effects::Sender, config: Config, config_path: PathBuf) {
        let spawned = thread::Builder::new().name("config-watcher".to_string()).spawn(move || {
            let real_file = fs::canonicalize(&config_path).ok();
            let real_file_id = real_file
                .as_ref()
                .and_then(|p| fs::metadata(p).ok())
                .map(|m| (m.dev(), m.ino()));

            let watcher = ConfigWatcher {
                file: config_path,
                real_file,
                real_file_id,
                current: config,
                events_tx,
            };

            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("config-watcher: failed to start runtime: {e}");
                    return;
                }
            };
            runtime.block_on(async move {
                if let Err(e) = watcher.run().await {
                    warn!("config-watcher: error: {e:?}");
                }
            });
        });
        if let Err(e) = spawned {
            warn!("failed to spawn config-watcher thread: {e}");
        }
    }

    async fn run(mut self) -> notify::Result<()> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<DebouncedEvent>();

        let mut debouncer =
            new_debouncer(Duration::from_millis(250), move |res: DebounceEventResult| {
                if let Ok(events) = res {
                    for e in events {
                        if e.kind == DebouncedEventKind::Any {
                            let _ = tx.send(e);
                        }
                    }
                }
            })?;

        let watcher = debouncer.watcher();

        let mut parents: HashSet<PathBuf> = HashSet::default();
        if let Some(p) = self.file.parent() {
            parents.insert(p.to_path_buf());
        }
        if let Some(real) = &self.real_file
            && let Some(p) = real.parent()
        {
            parents.insert(p.to_path_buf());
        }

        for dir in parents.iter() {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            info!("watching {:?}", dir);
        }

        while let Some(event) = rx.recv().await {
            if !self.is_relevant(&event.path) {
                continue;
            }
            trace!("change detected (debounced): {:?} {:?}", event.kind, event.path);
            self.reload();
        }

        Ok(())
    }

    fn reload(&mut self) {
        let new = match Config::read(&self.file) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to reload config: {e:#}");
                return;
            }
        };
        for issue in new.validate() {
            warn!("config: {issue}");
        }
        if new == self.current {
            debug!("config file touched without changes");
            return;
        }
        info!(changed = ?self.current.changed_keys(&new), "config reloaded");
        self.current = new.clone();
        self.events_tx.send(Event::ConfigChanged(Box::new(new)));
    }

    fn is_relevant(&self, path: &Path) -> bool {
        if path == self.file {
            return true;
        }

        if let Some(real) = &self.real_file {
            if path == real {
                return true;
            }

            if let Ok(ev_real) = fs::canonicalize(path)
                && ev_real == *real
            {
                return true;
            }

            if let Ok(meta) = fs::metadata(path)
                && let Some((dev, ino)) = self.real_file_id
                && meta.dev() == dev
                && meta.ino() == ino
            {
                return true;
            }
        }

        path.file_name().is_some_and(|n| Some(n) == self.file.file_name())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::actor;

    fn watcher(dir: &Path) -> (ConfigWatcher, actor::Receiver<Event>) {
        let (tx, rx) = actor::channel();
        let file = dir.join("config.toml");
        Config::default().save(&file).unwrap();
        let watcher = ConfigWatcher {
            real_file: fs::canonicalize(&file).ok(),
            file,
            real_file_id: None,
            current: Config::default(),
            events_tx: tx,
        };
        (watcher, rx)
    }

    #[test]
    fn unchanged_file_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, mut rx) = watcher(dir.path());
        watcher.reload();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn changed_file_sends_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, mut rx) = watcher(dir.path());
        let mut changed = Config::default();
        changed.blur.enabled = true;
        changed.save(&watcher.file).unwrap();

        watcher.reload();
        match rx.try_recv() {
            Ok((_, Event::ConfigChanged(config))) => assert_eq!(*config, changed),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn broken_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut watcher, mut rx) = watcher(dir.path());
        fs::write(&watcher.file, "blur = 3").unwrap();
        watcher.reload();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn relevance_matches_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let (watcher, _rx) = watcher(dir.path());
        assert!(watcher.is_relevant(&dir.path().join("config.toml")));
        assert!(!watcher.is_relevant(&dir.path().join("other.toml")));
    }
}
