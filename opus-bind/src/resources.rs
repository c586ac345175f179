//! Native binaries available for extraction.
//!
//! A binary is found either in the runtime registry or, when the crate was
//! built with `OPUS_JNI_NATIVE_BINARIES` set, in the copy embedded at
//! compile time. Registered binaries take precedence.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

mod bundled {
    include!(concat!(env!("OUT_DIR"), "/bundled_natives.rs"));
}

static REGISTRY: Lazy<Mutex<HashMap<String, &'static [u8]>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Registers the bytes of a native binary under its file name.
///
/// Replaces any earlier registration for the same name.
pub fn register_native_binary(name: &str, data: &'static [u8]) {
    REGISTRY.lock().insert(name.to_string(), data);
}

/// Looks up a native binary by file name.
pub fn native_binary(name: &str) -> Option<&'static [u8]> {
    if let Some(data) = REGISTRY.lock().get(name) {
        return Some(*data);
    }
    bundled::BUNDLED
        .iter()
        .find(|(bundled_name, _)| *bundled_name == name)
        .map(|(_, data)| *data)
}

/// Returns the names of all binaries that can be extracted.
pub fn list_native_binaries() -> Vec<String> {
    let mut names: Vec<String> = REGISTRY.lock().keys().cloned().collect();
    for (name, _) in bundled::BUNDLED {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names.sort();
    names
}
