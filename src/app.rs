//! Application context.
//!
//! One value owning everything an export or import touches: the store, the
//! in-memory cache, the translator and the settings. Sync operations borrow
//! it mutably for their whole run, so nothing else can touch the cache while
//! a restore is rebuilding it.

use crate::cache::ApplicationCache;
use crate::config::Settings;
use crate::i18n::{Catalog, Translator};
use crate::store::RemoteStore;

/// Shared state for one running application.
pub struct AppContext<S: RemoteStore> {
    pub store: S,
    pub cache: ApplicationCache,
    pub translator: Box<dyn Translator>,
    pub settings: Settings,
}

impl<S: RemoteStore> AppContext<S> {
    /// Build a context around `store`, using the built-in catalog for the
    /// configured language.
    #[must_use]
    pub fn new(store: S, settings: Settings) -> Self {
        Self {
            cache: ApplicationCache::new(settings.patients_per_page),
            translator: Box::new(Catalog::new(settings.lang)),
            store,
            settings,
        }
    }
}

impl<S: RemoteStore + std::fmt::Debug> std::fmt::Debug for AppContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("store", &self.store)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Asks the user before a destructive action.
pub trait Confirmer {
    /// Show `prompt` and return whether the user agreed.
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl Confirmer for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::{Lang, Message};
    use crate::store::MemoryStore;

    #[test]
    fn test_context_uses_settings() {
        let settings = Settings {
            lang: Lang::En,
            patients_per_page: 25,
            ..Settings::default()
        };
        let ctx = AppContext::new(MemoryStore::new(), settings);

        assert_eq!(ctx.cache.patients_per_page(), 25);
        assert!(ctx.translator.text(Message::ExportSucceeded).starts_with("Backup"));
    }

    #[test]
    fn test_auto_confirm() {
        assert!(AutoConfirm(true).confirm("?"));
        assert!(!AutoConfirm(false).confirm("?"));
    }
}
