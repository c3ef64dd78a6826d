use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{CoreError, Result};

pub type SaveFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
pub type SaveCallback<R> = Arc<dyn Fn(R) -> SaveFuture + Send + Sync>;

struct PendingSave {
    generation: u64,
    handle: JoinHandle<()>,
}

struct FieldSlot<R> {
    callback: SaveCallback<R>,
    delay: Duration,
    pending: Option<PendingSave>,
}

struct FieldTable<R> {
    slots: HashMap<String, FieldSlot<R>>,
    generation: u64,
}

/// Debounces per-field edits into one delayed persistence call per field.
///
/// Each field holds at most one waiting timer. A new edit for the same field
/// aborts that timer and starts over with the newer record, so only the last
/// edit of a burst is saved. Callbacks that have already started are never
/// aborted.
pub struct AutoSaveManager<R> {
    table: Arc<Mutex<FieldTable<R>>>,
}

impl<R> AutoSaveManager<R> {
    /// Abort every waiting timer without running its callback.
    pub fn cancel_all_saves(&self) {
        let mut table = self.table.lock();
        let mut cancelled = 0usize;
        for slot in table.slots.values_mut() {
            if let Some(pending) = slot.pending.take() {
                pending.handle.abort();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            tracing::debug!(cancelled, "pending auto-saves cancelled");
        }
    }

    pub fn has_pending(&self, field: &str) -> bool {
        self.table
            .lock()
            .slots
            .get(field)
            .is_some_and(|slot| slot.pending.is_some())
    }

    pub fn pending_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .table
            .lock()
            .slots
            .iter()
            .filter(|(_, slot)| slot.pending.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        fields.sort();
        fields
    }
}

impl<R: Send + 'static> AutoSaveManager<R> {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(FieldTable {
                slots: HashMap::new(),
                generation: 0,
            })),
        }
    }

    /// Bind `field` to a persistence callback and debounce delay.
    ///
    /// Re-registering replaces both. A timer already waiting keeps its
    /// original delay but runs the new callback when it fires.
    pub fn register_field<F, Fut>(&self, field: impl Into<String>, callback: F, delay: Duration)
    where
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let callback: SaveCallback<R> =
            Arc::new(move |record: R| -> SaveFuture { Box::pin(callback(record)) });
        let field = field.into();
        let mut table = self.table.lock();
        match table.slots.get_mut(&field) {
            Some(slot) => {
                slot.callback = callback;
                slot.delay = delay;
            }
            None => {
                table.slots.insert(
                    field,
                    FieldSlot {
                        callback,
                        delay,
                        pending: None,
                    },
                );
            }
        }
    }

    /// Schedule `record` as the value to persist for `field`.
    ///
    /// A zero delay still defers the callback to the next scheduler tick.
    pub fn trigger_save(&self, field: &str, record: R) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| CoreError::NoRuntime)?;
        let mut table = self.table.lock();
        table.generation += 1;
        let generation = table.generation;
        let slot = table
            .slots
            .get_mut(field)
            .ok_or_else(|| CoreError::UnknownField(field.to_string()))?;

        if let Some(previous) = slot.pending.take() {
            previous.handle.abort();
            tracing::trace!(field, "superseded pending auto-save");
        }

        let delay = slot.delay;
        let table_ref = Arc::clone(&self.table);
        let field_name = field.to_string();
        let handle = runtime.spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            let callback = {
                let mut table = table_ref.lock();
                let Some(slot) = table.slots.get_mut(&field_name) else {
                    return;
                };
                if slot.pending.as_ref().map(|p| p.generation) != Some(generation) {
                    return;
                }
                slot.pending = None;
                Arc::clone(&slot.callback)
            };

            tracing::debug!(field = %field_name, "running auto-save");
            if let Err(err) = callback(record).await {
                tracing::warn!(field = %field_name, %err, "auto-save failed");
            }
        });

        slot.pending = Some(PendingSave { generation, handle });
        Ok(())
    }
}

impl<R: Send + 'static> Default for AutoSaveManager<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Drop for AutoSaveManager<R> {
    fn drop(&mut self) {
        self.cancel_all_saves();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(
        log: &Log,
        tag: &'static str,
    ) -> impl Fn(String) -> SaveFuture + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |value: String| -> SaveFuture {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().push(format!("{tag}:{value}"));
                Ok(())
            })
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_last_value() {
        let log = Log::default();
        let manager = AutoSaveManager::new();
        manager.register_field("title", recorder(&log, "title"), ms(500));

        for text in ["H", "He", "Hel", "Hell", "Hello"] {
            manager.trigger_save("title", text.to_string()).unwrap();
            tokio::time::sleep(ms(100)).await;
        }
        assert!(log.lock().is_empty());
        assert!(manager.has_pending("title"));

        tokio::time::sleep(ms(1_000)).await;
        assert_eq!(*log.lock(), vec!["title:Hello"]);
        assert!(!manager.has_pending("title"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_prevents_every_callback() {
        let log = Log::default();
        let manager = AutoSaveManager::new();
        manager.register_field("title", recorder(&log, "title"), ms(300));
        manager.register_field("notes", recorder(&log, "notes"), ms(300));
        manager.trigger_save("title", "a".to_string()).unwrap();
        manager.trigger_save("notes", "b".to_string()).unwrap();
        assert_eq!(manager.pending_fields(), vec!["notes", "title"]);

        manager.cancel_all_saves();
        tokio::time::sleep(ms(1_000)).await;
        assert!(log.lock().is_empty());
        assert!(manager.pending_fields().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fields_debounce_independently() {
        let log = Log::default();
        let manager = AutoSaveManager::new();
        manager.register_field("title", recorder(&log, "title"), ms(200));
        manager.register_field("notes", recorder(&log, "notes"), ms(200));
        manager.trigger_save("title", "t".to_string()).unwrap();
        manager.trigger_save("notes", "n".to_string()).unwrap();

        tokio::time::sleep(ms(500)).await;
        let mut saved = log.lock().clone();
        saved.sort();
        assert_eq!(saved, vec!["notes:n", "title:t"]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_is_deferred_not_synchronous() {
        let log = Log::default();
        let manager = AutoSaveManager::new();
        manager.register_field("done", recorder(&log, "done"), Duration::ZERO);
        manager.trigger_save("done", "true".to_string()).unwrap();
        assert!(log.lock().is_empty());

        tokio::time::sleep(ms(1)).await;
        assert_eq!(*log.lock(), vec!["done:true"]);
    }

    #[tokio::test(start_paused = true)]
    async fn re_registering_before_fire_uses_new_callback() {
        let log = Log::default();
        let manager = AutoSaveManager::new();
        manager.register_field("title", recorder(&log, "old"), ms(500));
        manager.trigger_save("title", "x".to_string()).unwrap();
        tokio::time::sleep(ms(100)).await;

        manager.register_field("title", recorder(&log, "new"), ms(500));
        tokio::time::sleep(ms(1_000)).await;
        assert_eq!(*log.lock(), vec!["new:x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_callback_is_not_retried() {
        let calls = Arc::new(Mutex::new(0u32));
        let manager = AutoSaveManager::new();
        let counter = Arc::clone(&calls);
        manager.register_field(
            "title",
            move |_value: String| {
                let counter = Arc::clone(&counter);
                async move {
                    *counter.lock() += 1;
                    Err::<(), _>(CoreError::Store("offline".into()))
                }
            },
            ms(100),
        );
        manager.trigger_save("title", "x".to_string()).unwrap();
        tokio::time::sleep(ms(2_000)).await;
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test]
    async fn unknown_field_is_rejected() {
        let manager: AutoSaveManager<String> = AutoSaveManager::new();
        let err = manager.trigger_save("missing", "x".into()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownField(field) if field == "missing"));
    }

    #[test]
    fn trigger_outside_runtime_fails() {
        let log = Log::default();
        let manager = AutoSaveManager::new();
        manager.register_field("title", recorder(&log, "title"), ms(10));
        assert!(matches!(
            manager.trigger_save("title", "x".into()),
            Err(CoreError::NoRuntime)
        ));
    }
}
