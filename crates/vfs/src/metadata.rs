use std::any::{Any, TypeId};
use std::fmt;

use rustc_hash::FxHashMap;

/// Per-node typed metadata, keyed by (owning plugin, value type).
///
/// A plugin only ever sees its own entries by default; reading another
/// plugin's value requires naming that plugin explicitly, which keeps
/// accidental cross-plugin coupling out of the tree.
#[derive(Default)]
pub(crate) struct MetadataTable {
    entries: FxHashMap<(String, TypeId), Box<dyn Any + Send>>,
}

impl MetadataTable {
    pub(crate) fn insert<T: Any + Send>(&mut self, plugin: &str, value: T) {
        self.entries
            .insert((plugin.to_owned(), TypeId::of::<T>()), Box::new(value));
    }

    pub(crate) fn get<T: Any + Send>(&self, plugin: &str) -> Option<&T> {
        self.entries
            .get(&(plugin.to_owned(), TypeId::of::<T>()))
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }
}

impl fmt::Debug for MetadataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}
