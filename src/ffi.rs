//! C ABI for native hosts.
//!
//! A host creates one pipeline handle with `lt_pipeline_new`, calls the operations
//! from a worker thread, and frees the handle with `lt_pipeline_free`. Every
//! operation returns a JSON string owned by the caller (release it with
//! `lt_string_free`): the success payload, or `{"status":"error","code",...}`.

use std::ffi::{c_char, CStr, CString};
use std::path::PathBuf;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::assets::DirAssets;
use crate::bridge::{reply_json, TranslatorBridge};
use crate::engine::delegate::NoAccelerator;
use crate::engine::linear::PooledLinearFactory;
use crate::pipeline::{ConfigOverrides, PipelineConfig, TranslationPipeline};
use crate::progress::ConsoleProgress;

static LAST_ERROR: Lazy<Mutex<Option<CString>>> = Lazy::new(|| Mutex::new(None));

/// Opaque pipeline handle passed back and forth across the ABI.
pub struct LtPipeline {
    bridge: TranslatorBridge,
}

fn set_last_error(msg: &str) {
    let c = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    let mut guard = LAST_ERROR.lock().unwrap_or_else(|e| e.into_inner());
    *guard = Some(c);
}

fn take_cstr(ptr: *const c_char, name: &str) -> Result<String, String> {
    if ptr.is_null() {
        return Err(format!("{name} is null"));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(|s| s.to_string())
        .map_err(|_| format!("{name} is not valid UTF-8"))
}

fn opt_cstr(ptr: *const c_char, name: &str) -> Result<Option<String>, String> {
    if ptr.is_null() {
        return Ok(None);
    }
    take_cstr(ptr, name).map(Some)
}

fn into_c_json(json: String) -> *mut c_char {
    CString::new(json.replace('\0', " "))
        .map(CString::into_raw)
        .unwrap_or(std::ptr::null_mut())
}

fn error_json(code: &str, message: &str) -> *mut c_char {
    set_last_error(message);
    let body = serde_json::json!({ "status": "error", "code": code, "message": message });
    into_c_json(body.to_string())
}

fn with_handle<'a>(handle: *const LtPipeline) -> Option<&'a LtPipeline> {
    if handle.is_null() {
        set_last_error("pipeline handle is null");
        return None;
    }
    Some(unsafe { &*handle })
}

/// Builds a pipeline from a config file (null: default config search).
///
/// Returns null on failure (see `lt_last_error_utf8()`).
#[no_mangle]
pub extern "C" fn lt_pipeline_new(config_path: *const c_char) -> *mut LtPipeline {
    let config_path = match opt_cstr(config_path, "config_path") {
        Ok(v) => v.map(PathBuf::from),
        Err(e) => {
            set_last_error(&e);
            return std::ptr::null_mut();
        }
    };
    let cfg = match PipelineConfig::resolve(ConfigOverrides {
        config_path,
        ..Default::default()
    }) {
        Ok(v) => v,
        Err(err) => {
            set_last_error(&format!("{err:#}"));
            return std::ptr::null_mut();
        }
    };

    let progress = ConsoleProgress::new(cfg.verbose);
    let assets = DirAssets::new(cfg.asset_dir.clone());
    let pipeline = TranslationPipeline::new(
        cfg,
        Box::new(assets),
        Box::new(PooledLinearFactory),
        Box::new(NoAccelerator),
        progress,
    );
    Box::into_raw(Box::new(LtPipeline {
        bridge: TranslatorBridge::new(pipeline),
    }))
}

/// Releases the pipeline and everything it loaded. Null is ignored.
#[no_mangle]
pub extern "C" fn lt_pipeline_free(handle: *mut LtPipeline) {
    if handle.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(handle) });
}

#[no_mangle]
pub extern "C" fn lt_initialize_model(handle: *const LtPipeline) -> *mut c_char {
    let Some(h) = with_handle(handle) else {
        return error_json("MODEL_INIT_ERROR", "pipeline handle is null");
    };
    let reply = h.bridge.initialize_model();
    if let Err(e) = &reply {
        set_last_error(&e.message);
    }
    into_c_json(reply_json(&reply))
}

/// `context` may be null (no context prefix).
#[no_mangle]
pub extern "C" fn lt_translate(
    handle: *const LtPipeline,
    input_text: *const c_char,
    from_language: *const c_char,
    to_language: *const c_char,
    context: *const c_char,
) -> *mut c_char {
    let Some(h) = with_handle(handle) else {
        return error_json("MODEL_NOT_LOADED", "pipeline handle is null");
    };
    let args = (|| {
        Ok::<_, String>((
            take_cstr(input_text, "input_text")?,
            take_cstr(from_language, "from_language")?,
            take_cstr(to_language, "to_language")?,
            opt_cstr(context, "context")?,
        ))
    })();
    let (input, from, to, context) = match args {
        Ok(v) => v,
        Err(e) => return error_json("TRANSLATION_ERROR", &e),
    };
    let reply = h.bridge.translate(&input, &from, &to, context.as_deref());
    if let Err(e) = &reply {
        set_last_error(&e.message);
    }
    into_c_json(reply_json(&reply))
}

#[no_mangle]
pub extern "C" fn lt_is_model_ready(handle: *const LtPipeline) -> *mut c_char {
    let Some(h) = with_handle(handle) else {
        return into_c_json(r#"{"isReady":false,"modelVersion":"not_loaded"}"#.to_string());
    };
    into_c_json(reply_json::<_>(&Ok(h.bridge.is_model_ready())))
}

#[no_mangle]
pub extern "C" fn lt_get_model_info(handle: *const LtPipeline) -> *mut c_char {
    let Some(h) = with_handle(handle) else {
        return error_json("MODEL_NOT_LOADED", "pipeline handle is null");
    };
    into_c_json(reply_json::<_>(&Ok(h.bridge.get_model_info())))
}

#[no_mangle]
pub extern "C" fn lt_cleanup(handle: *const LtPipeline) -> *mut c_char {
    let Some(h) = with_handle(handle) else {
        return error_json("CLEANUP_ERROR", "pipeline handle is null");
    };
    let reply = h.bridge.cleanup();
    if let Err(e) = &reply {
        set_last_error(&e.message);
    }
    into_c_json(reply_json(&reply))
}

/// Frees a string returned by any `lt_*` operation. Null is ignored.
#[no_mangle]
pub extern "C" fn lt_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(s) });
}

/// Returns the last error message as a UTF-8 C string pointer (or null if none).
/// The pointer is valid until the next failing `lt_*` call.
#[no_mangle]
pub extern "C" fn lt_last_error_utf8() -> *const c_char {
    let guard = LAST_ERROR.lock().unwrap_or_else(|e| e.into_inner());
    match guard.as_ref() {
        Some(s) => s.as_ptr(),
        None => std::ptr::null(),
    }
}
