//! Serializer boundary.
//!
//! The engine does not define a file format of its own. A
//! [`ConfigSerializer`] reads the file at a wrapper's destination and
//! replaces the in-memory value (`load`), or writes the current value to
//! disk (`save`). Implementations of `save` MUST call
//! [`ConfigWrapper::mark_self_write`] immediately before acquiring the file
//! for writing and again immediately after the write completes, so the
//! engine's own writes never trigger its own reload.
//!
//! [`JsonSerializer`] (feature `json`, enabled by default) is the bundled
//! implementation.

use crate::error::WatchError;
use crate::wrapper::ConfigWrapper;

/// Object ↔ file codec for one configuration type.
pub trait ConfigSerializer<T>: Send + Sync {
    /// Read the file at the wrapper's destination and replace the in-memory
    /// value with the freshly parsed contents.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::LoadFailed`] if the file cannot be read or
    /// parsed; the previous in-memory value is retained.
    fn load(&self, wrapper: &ConfigWrapper<T>) -> Result<(), WatchError>;

    /// Write the current in-memory value to the wrapper's destination,
    /// seeding self-write suppression around the write.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::SaveFailed`] if the file cannot be written.
    fn save(&self, wrapper: &ConfigWrapper<T>) -> Result<(), WatchError>;
}

#[cfg(feature = "json")]
mod json {
    use std::fs;

    use serde::Serialize;
    use serde::de::DeserializeOwned;

    use super::ConfigSerializer;
    use crate::error::WatchError;
    use crate::wrapper::ConfigWrapper;

    /// JSON-backed [`ConfigSerializer`] using `serde_json`.
    #[derive(Debug, Clone, Copy)]
    pub struct JsonSerializer {
        pretty: bool,
    }

    impl JsonSerializer {
        /// Create a serializer producing pretty-printed JSON.
        #[must_use]
        pub const fn new() -> Self {
            Self { pretty: true }
        }

        /// Create a serializer producing compact JSON.
        #[must_use]
        pub const fn compact() -> Self {
            Self { pretty: false }
        }

        fn write<T>(&self, wrapper: &ConfigWrapper<T>) -> Result<(), WatchError>
        where
            T: Serialize + Send + Sync + 'static,
        {
            let destination = wrapper.destination();
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    WatchError::save_failed(destination, format!("cannot create parent: {e}"))
                })?;
            }

            let bytes = wrapper.read(|value| {
                if self.pretty {
                    serde_json::to_vec_pretty(value)
                } else {
                    serde_json::to_vec(value)
                }
            })
            .map_err(|e| WatchError::save_failed(destination, e.to_string()))?;

            fs::write(destination, bytes)
                .map_err(|e| WatchError::save_failed(destination, e.to_string()))
        }
    }

    impl Default for JsonSerializer {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> ConfigSerializer<T> for JsonSerializer
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        fn load(&self, wrapper: &ConfigWrapper<T>) -> Result<(), WatchError> {
            let destination = wrapper.destination();
            let bytes = fs::read(destination)
                .map_err(|e| WatchError::load_failed(destination, e.to_string()))?;
            let value: T = serde_json::from_slice(&bytes)
                .map_err(|e| WatchError::load_failed(destination, e.to_string()))?;
            wrapper.replace(value);
            Ok(())
        }

        fn save(&self, wrapper: &ConfigWrapper<T>) -> Result<(), WatchError> {
            wrapper.mark_self_write();
            let result = self.write(wrapper);
            wrapper.mark_self_write();
            result
        }
    }
}

#[cfg(feature = "json")]
pub use json::JsonSerializer;
