//! `KeyValueStorage` over the Web Storage API.
use cmmi_game::{KeyValueStorage, StorageError};
use web_sys::Storage;

use crate::dom;

/// A `localStorage` or `sessionStorage` area.
pub struct BrowserStorage {
    area: Storage,
}

impl BrowserStorage {
    /// The origin-wide `localStorage` area.
    ///
    /// # Errors
    ///
    /// Returns an error if storage is disabled or the page has no window.
    pub fn local() -> Result<Self, StorageError> {
        dom::local_storage()
            .map(|area| Self { area })
            .map_err(|err| StorageError::Unavailable(dom::js_error_message(&err)))
    }

    /// The tab-scoped `sessionStorage` area.
    ///
    /// # Errors
    ///
    /// Returns an error if storage is disabled or the page has no window.
    pub fn session() -> Result<Self, StorageError> {
        dom::session_storage()
            .map(|area| Self { area })
            .map_err(|err| StorageError::Unavailable(dom::js_error_message(&err)))
    }
}

impl KeyValueStorage for BrowserStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.area
            .get_item(key)
            .map_err(|err| StorageError::Unavailable(dom::js_error_message(&err)))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.area
            .set_item(key, value)
            .map_err(|err| StorageError::Write {
                key: key.to_string(),
                reason: dom::js_error_message(&err),
            })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.area
            .remove_item(key)
            .map_err(|err| StorageError::Write {
                key: key.to_string(),
                reason: dom::js_error_message(&err),
            })
    }
}
