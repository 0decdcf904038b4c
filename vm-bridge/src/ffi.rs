//! `extern "C"` ABI (§6): a single process-wide `Bridge`, the way the Bridge
//! is described as a VM-process-scoped service rather than a handle the
//! caller juggles. Kept physically separate from the safe core, mirroring
//! `vm_core::ffi`'s "validate pointers, catch unwinds, forward" shape.
//!
//! Reply payloads are handed back through the shared-memory handle pool:
//! `bridge_submit_task`/`bridge_send_message` write their `ResponseMap`
//! into a freshly created handle and return its id, so the caller maps it
//! exactly the way it would map memory it allocated itself.

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use lazy_static::lazy_static;
use vm_shared::{TaskDescriptor, WireValue};

use crate::bridge::Bridge;
use crate::error::BridgeError;

pub const BRIDGE_SUCCESS: c_int = 0;
pub const BRIDGE_ERR_NOT_INITIALIZED: c_int = 1;
pub const BRIDGE_ERR_ALREADY_INITIALIZED: c_int = 2;
pub const BRIDGE_ERR_INVALID_ARGUMENT: c_int = 3;
pub const BRIDGE_ERR_UNKNOWN_HANDLE: c_int = 4;
pub const BRIDGE_ERR_TRANSPORT: c_int = 5;
pub const BRIDGE_ERR_REPLY_TOO_LARGE: c_int = 6;
pub const BRIDGE_ERR_INTERNAL: c_int = 7;

fn code_for(e: &BridgeError) -> c_int {
    match e {
        BridgeError::NotInitialized => BRIDGE_ERR_NOT_INITIALIZED,
        BridgeError::AlreadyInitialized => BRIDGE_ERR_ALREADY_INITIALIZED,
        BridgeError::InvalidWorkerCount | BridgeError::DuplicateName(_) => BRIDGE_ERR_INVALID_ARGUMENT,
        BridgeError::UnknownHandle(_) | BridgeError::AlreadyDestroyed(_) => BRIDGE_ERR_UNKNOWN_HANDLE,
        BridgeError::ReplyTooLarge { .. } => BRIDGE_ERR_REPLY_TOO_LARGE,
        BridgeError::MalformedResponse(_) | BridgeError::TransportFailure(_) | BridgeError::PayloadTooLarge { .. } => BRIDGE_ERR_TRANSPORT,
        BridgeError::PoolExhausted | BridgeError::LockPoisoned(_) => BRIDGE_ERR_INTERNAL,
    }
}

lazy_static! {
    static ref BRIDGE: Mutex<Option<Bridge>> = Mutex::new(None);
    /// Backs shared-memory handles with addressable storage the ABI can
    /// hand out raw pointers into; keyed by the same id the `Bridge`'s
    /// own handle pool assigns.
    static ref BUFFERS: Mutex<HashMap<u32, Box<[u8]>>> = Mutex::new(HashMap::new());
}

fn guard<F: FnOnce() -> c_int>(f: F) -> c_int {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(code) => code,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("bridge ffi call panicked: {:#}", anyhow::anyhow!(message));
            BRIDGE_ERR_INTERNAL
        }
    }
}

unsafe fn write_c_string(dst: *mut c_char, dst_len: usize, text: &str) -> c_int {
    if dst.is_null() || dst_len == 0 {
        return BRIDGE_ERR_INVALID_ARGUMENT;
    }
    let bytes = text.as_bytes();
    let n = bytes.len().min(dst_len - 1);
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst as *mut u8, n);
    *dst.add(n) = 0;
    BRIDGE_SUCCESS
}

#[no_mangle]
pub extern "C" fn bridge_initialize(workers: u32) -> c_int {
    guard(|| {
        let mut slot = match BRIDGE.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        if slot.is_some() {
            return BRIDGE_ERR_ALREADY_INITIALIZED;
        }
        let mut bridge = Bridge::new();
        match bridge.start(workers) {
            Ok(()) => {
                *slot = Some(bridge);
                BRIDGE_SUCCESS
            }
            Err(e) => code_for(&e),
        }
    })
}

#[no_mangle]
pub extern "C" fn bridge_shutdown() -> c_int {
    guard(|| {
        let mut slot = match BRIDGE.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        *slot = None;
        if let Ok(mut buffers) = BUFFERS.lock() {
            buffers.clear();
        }
        BRIDGE_SUCCESS
    })
}

/// # Safety
/// `buf` must point to at least `buf_len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn bridge_status(buf: *mut c_char, buf_len: usize) -> c_int {
    guard(|| {
        let slot = match BRIDGE.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        let text = match slot.as_ref() {
            Some(bridge) => {
                let status = bridge.status();
                format!(
                    "{{\"initialized\":{},\"worker_count\":{},\"proxy_ids\":[{}]}}",
                    status.initialized,
                    status.worker_count,
                    status.proxy_ids.iter().map(|p| format!("\"{p}\"")).collect::<Vec<_>>().join(",")
                )
            }
            None => "{\"initialized\":false,\"worker_count\":0,\"proxy_ids\":[]}".to_string(),
        };
        write_c_string(buf, buf_len, &text)
    })
}

fn submit_and_store(descriptor: TaskDescriptor, reply_capacity: usize, reply_handle: *mut u32) -> c_int {
    let slot = match BRIDGE.lock() {
        Ok(g) => g,
        Err(_) => return BRIDGE_ERR_INTERNAL,
    };
    let bridge = match slot.as_ref() {
        Some(b) => b,
        None => return BRIDGE_ERR_NOT_INITIALIZED,
    };
    let response = match bridge.submit_task(descriptor, reply_capacity) {
        Ok(r) => r,
        Err(e) => return code_for(&e),
    };
    let bytes = match serde_json::to_vec(&response) {
        Ok(b) => b,
        Err(_) => return BRIDGE_ERR_TRANSPORT,
    };
    let handle = match bridge.create_shared_memory(bytes.len()) {
        Ok(h) => h,
        Err(e) => return code_for(&e),
    };
    if let Ok(mut buffers) = BUFFERS.lock() {
        buffers.insert(handle.id, bytes.into_boxed_slice());
    }
    unsafe {
        if !reply_handle.is_null() {
            *reply_handle = handle.id;
        }
    }
    BRIDGE_SUCCESS
}

/// # Safety
/// `payload` must point to `size` readable bytes; `reply_handle` must be a
/// valid `*mut u32` or null.
#[no_mangle]
pub unsafe extern "C" fn bridge_submit_task(payload: *const u8, size: usize, reply_capacity: usize, reply_handle: *mut u32) -> c_int {
    guard(|| {
        if payload.is_null() {
            return BRIDGE_ERR_INVALID_ARGUMENT;
        }
        let bytes = std::slice::from_raw_parts(payload, size);
        let descriptor: TaskDescriptor = match serde_json::from_slice(bytes) {
            Ok(d) => d,
            Err(_) => return BRIDGE_ERR_INVALID_ARGUMENT,
        };
        submit_and_store(descriptor, reply_capacity, reply_handle)
    })
}

/// # Safety
/// `target`, `name` and `args` must be valid, NUL-terminated C strings.
/// `args` is parsed as a JSON object and becomes the task's `config`.
#[no_mangle]
pub unsafe extern "C" fn bridge_send_message(
    target: *const c_char,
    name: *const c_char,
    args: *const c_char,
    reply_handle: *mut u32,
) -> c_int {
    guard(|| {
        if target.is_null() || name.is_null() {
            return BRIDGE_ERR_INVALID_ARGUMENT;
        }
        let target = CStr::from_ptr(target).to_string_lossy().into_owned();
        let name = CStr::from_ptr(name).to_string_lossy().into_owned();
        let config = if args.is_null() {
            WireValue::Map(WireValue::map())
        } else {
            let args_str = CStr::from_ptr(args).to_string_lossy();
            serde_json::from_str(&args_str).unwrap_or(WireValue::Map(WireValue::map()))
        };
        let descriptor = TaskDescriptor::new(target, name, config);
        submit_and_store(descriptor, 1 << 16, reply_handle)
    })
}

#[no_mangle]
pub extern "C" fn bridge_create_shared_memory(size: usize, handle_out: *mut u32) -> c_int {
    guard(|| {
        let slot = match BRIDGE.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        let bridge = match slot.as_ref() {
            Some(b) => b,
            None => return BRIDGE_ERR_NOT_INITIALIZED,
        };
        let handle = match bridge.create_shared_memory(size) {
            Ok(h) => h,
            Err(e) => return code_for(&e),
        };
        if let Ok(mut buffers) = BUFFERS.lock() {
            buffers.insert(handle.id, vec![0u8; size].into_boxed_slice());
        }
        unsafe {
            if !handle_out.is_null() {
                *handle_out = handle.id;
            }
        }
        BRIDGE_SUCCESS
    })
}

/// # Safety
/// `handle` and `addr_out` must be valid pointers.
#[no_mangle]
pub unsafe extern "C" fn bridge_map_shared_memory(handle: *const u32, addr_out: *mut *mut u8) -> c_int {
    guard(|| {
        if handle.is_null() || addr_out.is_null() {
            return BRIDGE_ERR_INVALID_ARGUMENT;
        }
        let id = *handle;
        let slot = match BRIDGE.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        let bridge = match slot.as_ref() {
            Some(b) => b,
            None => return BRIDGE_ERR_NOT_INITIALIZED,
        };
        if let Err(e) = bridge.map_shared_memory(id) {
            return code_for(&e);
        }
        let mut buffers = match BUFFERS.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        match buffers.get_mut(&id) {
            Some(buf) => {
                *addr_out = buf.as_mut_ptr();
                BRIDGE_SUCCESS
            }
            None => BRIDGE_ERR_UNKNOWN_HANDLE,
        }
    })
}

/// # Safety
/// `handle` must be a valid pointer to a previously returned id.
#[no_mangle]
pub unsafe extern "C" fn bridge_unmap_shared_memory(handle: *const u32, _addr: *mut u8) -> c_int {
    guard(|| {
        if handle.is_null() {
            return BRIDGE_ERR_INVALID_ARGUMENT;
        }
        let id = *handle;
        let slot = match BRIDGE.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        match slot.as_ref() {
            Some(bridge) => match bridge.unmap_shared_memory(id) {
                Ok(()) => BRIDGE_SUCCESS,
                Err(e) => code_for(&e),
            },
            None => BRIDGE_ERR_NOT_INITIALIZED,
        }
    })
}

/// # Safety
/// `handle` must be a valid pointer; it is zeroed after a successful
/// destroy, the way a freed handle should never be reused by the caller.
#[no_mangle]
pub unsafe extern "C" fn bridge_destroy_shared_memory(handle: *mut u32) -> c_int {
    guard(|| {
        if handle.is_null() {
            return BRIDGE_ERR_INVALID_ARGUMENT;
        }
        let id = *handle;
        let slot = match BRIDGE.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        let result = match slot.as_ref() {
            Some(bridge) => bridge.destroy_shared_memory(id),
            None => return BRIDGE_ERR_NOT_INITIALIZED,
        };
        if let Ok(mut buffers) = BUFFERS.lock() {
            buffers.remove(&id);
        }
        match result {
            Ok(()) => {
                *handle = 0;
                BRIDGE_SUCCESS
            }
            Err(e) => code_for(&e),
        }
    })
}

/// # Safety
/// `buf` must point to at least `buf_len` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn bridge_get_last_error(buf: *mut c_char, buf_len: usize) -> c_int {
    guard(|| {
        let slot = match BRIDGE.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        let text = slot.as_ref().and_then(|b| b.get_last_error()).unwrap_or_default();
        write_c_string(buf, buf_len, &text)
    })
}

#[no_mangle]
pub extern "C" fn bridge_clear_error() -> c_int {
    guard(|| {
        let slot = match BRIDGE.lock() {
            Ok(g) => g,
            Err(_) => return BRIDGE_ERR_INTERNAL,
        };
        if let Some(bridge) = slot.as_ref() {
            bridge.clear_error();
        }
        BRIDGE_SUCCESS
    })
}
