//! Default Store
//!
//! Consumers that never construct a store share one process-wide store. It
//! is created on first use behind a `OnceLock` and lives for the rest of
//! the process.

use std::sync::OnceLock;

use tracing::debug;

use super::Store;
use crate::config::StoreConfig;

static DEFAULT_STORE: OnceLock<Store> = OnceLock::new();

/// Get the process-wide default store, creating it on first use.
pub fn default_store() -> &'static Store {
    DEFAULT_STORE.get_or_init(|| {
        debug!("initializing default store");
        Store::with_config(StoreConfig {
            name: "default".to_string(),
            ..StoreConfig::default()
        })
    })
}

/// Create a new, empty store.
pub fn create_store() -> Store {
    Store::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::atom;

    #[test]
    fn default_store_is_a_singleton() {
        let first = default_store();
        let second = default_store();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.config().name, "default");
    }

    #[test]
    fn default_store_keeps_values_between_calls() {
        let a = atom(1);
        default_store().set(&a, 7).unwrap();
        assert_eq!(default_store().get(&a).unwrap(), 7);
    }

    #[test]
    fn created_stores_are_independent() {
        let a = atom(1);
        let one = create_store();
        let two = create_store();

        one.set(&a, 2).unwrap();
        assert_eq!(one.get(&a).unwrap(), 2);
        assert_eq!(two.get(&a).unwrap(), 1);
    }
}
