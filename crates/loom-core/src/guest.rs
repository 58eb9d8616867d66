//! Both sides of the native entry-point contract.
//!
//! The host serializes a [`ModuleParam`] and passes `(ptr, len)` to the
//! component's `InitModule`. A component asked for its listen address via
//! `ListenAddr(buf, cap)` writes UTF-8 into the buffer and returns the full
//! length. Components written in Rust can use [`read_param`] and
//! [`write_listen_addr`] to implement their half.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::NativeError;

/// Initializer entry point: `InitModule(json_ptr, json_len) -> status`.
pub const INIT_SYMBOL: &str = "InitModule";
/// Optional listen-address query: `ListenAddr(buf_ptr, buf_cap) -> len`.
pub const LISTEN_ADDR_SYMBOL: &str = "ListenAddr";
/// Service loop entry point: `RunModuleListen()`.
pub const RUN_SYMBOL: &str = "RunModuleListen";

/// Status returned by a successful `InitModule`.
pub const INIT_OK: usize = 0;

/// Parameters handed to a component's initializer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleParam {
    pub name: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
    #[serde(default)]
    pub extends: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ModuleParam {
    pub fn new(name: impl Into<String>, args: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            args,
            extends: None,
        }
    }

    pub fn to_json(&self) -> Result<String, NativeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, NativeError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Decode the parameter blob an initializer received.
///
/// # Safety
///
/// `ptr` must point at `len` readable bytes for the duration of the call.
pub unsafe fn read_param(ptr: usize, len: usize) -> Result<ModuleParam, NativeError> {
    if ptr == 0 {
        return ModuleParam::from_json("null");
    }
    // SAFETY: guaranteed by the caller.
    let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, len) };
    Ok(serde_json::from_slice(bytes)?)
}

/// Copy `addr` into the host's buffer and return its full length.
///
/// Nothing is written when the buffer is too small; the host retries with a
/// buffer of the returned length.
///
/// # Safety
///
/// `buf` must point at `cap` writable bytes.
pub unsafe fn write_listen_addr(buf: usize, cap: usize, addr: &str) -> usize {
    let bytes = addr.as_bytes();
    if buf != 0 && bytes.len() <= cap {
        // SAFETY: guaranteed by the caller; the ranges cannot overlap because
        // `addr` is owned by the component.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, bytes.len()) };
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_uses_pascal_case_keys() {
        let mut args = BTreeMap::new();
        args.insert("config".to_string(), "etc/orders.toml".to_string());
        let json = ModuleParam::new("orders", args).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"Name":"orders","Args":{"config":"etc/orders.toml"},"Extends":null}"#
        );
    }

    #[test]
    fn param_read_from_raw_parts() {
        let json = r#"{"Name":"billing","Args":{"region":"eu"}}"#;
        let param = unsafe { read_param(json.as_ptr() as usize, json.len()) }.unwrap();
        assert_eq!(param.name, "billing");
        assert_eq!(param.args.get("region").map(String::as_str), Some("eu"));
        assert!(param.extends.is_none());
    }

    #[test]
    fn malformed_param_is_an_error() {
        let json = "{not json";
        let err = unsafe { read_param(json.as_ptr() as usize, json.len()) }.unwrap_err();
        assert!(matches!(err, NativeError::InvalidParam(_)));
    }

    #[test]
    fn listen_addr_fits_in_buffer() {
        let mut buf = [0u8; 32];
        let len =
            unsafe { write_listen_addr(buf.as_mut_ptr() as usize, buf.len(), "0.0.0.0:9100") };
        assert_eq!(&buf[..len], b"0.0.0.0:9100");
    }

    #[test]
    fn short_buffer_reports_required_length_without_writing() {
        let mut buf = [0u8; 4];
        let len =
            unsafe { write_listen_addr(buf.as_mut_ptr() as usize, buf.len(), "127.0.0.1:9100") };
        assert_eq!(len, "127.0.0.1:9100".len());
        assert_eq!(buf, [0u8; 4]);
    }
}
