//! `extern "C"` shim over `embed.rs` (§6). Kept physically separate from
//! the safe core, mirroring how the teacher keeps FFI-unsafe glue apart
//! from its library logic: every entry point here does nothing but
//! validate pointers, catch unwinds, and forward into `Embedding`.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crate::embed::Embedding;
use crate::sandbox::SandboxConfig;

pub type PrintCallback = extern "C" fn(ctx: *mut c_void, text: *const c_char);
pub type ExceptionCallback = extern "C" fn(ctx: *mut c_void, message: *const c_char);
pub type ExitCallback = extern "C" fn(ctx: *mut c_void, code: c_int);
pub type ActiveCoroCallback = extern "C" fn(ctx: *mut c_void, coro_index: u32);
pub type BindingsInitCallback = extern "C" fn(ctx: *mut c_void);

/// Wraps a raw C context pointer so it can be captured by a `'static`
/// closure. Sound only under the single-threaded usage this whole ABI
/// assumes (§5): the pointer is never dereferenced by us, only handed back
/// to the callback that owns it.
struct RawCtx(*mut c_void);
unsafe impl Send for RawCtx {}

fn guard<F: FnOnce() -> R, R>(default: R, f: F) -> R {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(default)
}

#[no_mangle]
pub extern "C" fn state_new() -> *mut Embedding {
    guard(std::ptr::null_mut(), || Box::into_raw(Box::new(Embedding::new(SandboxConfig::unbounded()))))
}

#[no_mangle]
pub extern "C" fn state_free(state: *mut Embedding) {
    if state.is_null() {
        return;
    }
    let _ = guard((), || unsafe {
        drop(Box::from_raw(state));
    });
}

/// # Safety
/// `argv` must point to `argc` valid, NUL-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn state_argc_argv(state: *mut Embedding, argc: c_int, argv: *const *const c_char) {
    if state.is_null() || argv.is_null() || argc < 0 {
        return;
    }
    guard((), || {
        let embedding = &mut *state;
        let mut args = Vec::with_capacity(argc as usize);
        for i in 0..argc as isize {
            let ptr = *argv.offset(i);
            if ptr.is_null() {
                continue;
            }
            args.push(CStr::from_ptr(ptr).to_string_lossy().into_owned());
        }
        embedding.set_cli_args(&args);
    });
}

/// Returns a packed `ObjectId` FFI token (see `ObjectId::to_ffi_token`), or
/// `u64::MAX` on error (path missing, read failure, raised fault).
///
/// # Safety
/// `path` must be a valid, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn state_do_file(state: *mut Embedding, path: *const c_char) -> u64 {
    if state.is_null() || path.is_null() {
        return u64::MAX;
    }
    guard(u64::MAX, || {
        let embedding = &mut *state;
        let path_str = CStr::from_ptr(path).to_string_lossy().into_owned();
        match embedding.do_file(Path::new(&path_str)) {
            Ok(id) => id.to_ffi_token(),
            Err(_) => u64::MAX,
        }
    })
}

/// # Safety
/// `source` must be a valid, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn state_do_cstring(state: *mut Embedding, source: *const c_char) -> u64 {
    if state.is_null() || source.is_null() {
        return u64::MAX;
    }
    guard(u64::MAX, || {
        let embedding = &mut *state;
        let source_str = CStr::from_ptr(source).to_string_lossy();
        match embedding.do_source(&source_str) {
            Ok(id) => id.to_ffi_token(),
            Err(_) => u64::MAX,
        }
    })
}

/// Runs the main coroutine's cursor to completion, the way a standalone
/// interpreter binary's REPL/script-runner entry point would; errors are
/// already routed through the exception callback by `do_message`.
#[no_mangle]
pub extern "C" fn state_run_cli(state: *mut Embedding) -> c_int {
    if state.is_null() {
        return 1;
    }
    guard(1, || unsafe {
        let embedding = &mut *state;
        let main = embedding.state.main_coroutine;
        match embedding.resume(main) {
            Ok(_) => 0,
            Err(_) => 1,
        }
    })
}

#[no_mangle]
pub extern "C" fn state_exit_result(state: *mut Embedding) -> c_int {
    if state.is_null() {
        return 0;
    }
    guard(0, || unsafe { (&*state).exit_result() })
}

#[no_mangle]
pub extern "C" fn state_set_print_callback(state: *mut Embedding, cb: PrintCallback, ctx: *mut c_void) {
    if state.is_null() {
        return;
    }
    let raw = RawCtx(ctx);
    guard((), || unsafe {
        (&mut *state).set_print_callback(move |text: &str| {
            if let Ok(c_text) = CString::new(text) {
                cb(raw.0, c_text.as_ptr());
            }
        });
    });
}

#[no_mangle]
pub extern "C" fn state_set_exception_callback(state: *mut Embedding, cb: ExceptionCallback, ctx: *mut c_void) {
    if state.is_null() {
        return;
    }
    let raw = RawCtx(ctx);
    guard((), || unsafe {
        (&mut *state).set_exception_callback(move |fault| {
            if let Ok(c_text) = CString::new(fault.to_string()) {
                cb(raw.0, c_text.as_ptr());
            }
        });
    });
}

#[no_mangle]
pub extern "C" fn state_set_exit_callback(state: *mut Embedding, cb: ExitCallback, ctx: *mut c_void) {
    if state.is_null() {
        return;
    }
    let raw = RawCtx(ctx);
    guard((), || unsafe {
        (&mut *state).set_exit_callback(move |code| cb(raw.0, code));
    });
}

#[no_mangle]
pub extern "C" fn state_set_active_coro_callback(state: *mut Embedding, cb: ActiveCoroCallback, ctx: *mut c_void) {
    if state.is_null() {
        return;
    }
    let raw = RawCtx(ctx);
    guard((), || unsafe {
        (&mut *state).set_active_coro_callback(move |idx| cb(raw.0, idx));
    });
}

#[no_mangle]
pub extern "C" fn state_set_bindings_init_callback(state: *mut Embedding, cb: BindingsInitCallback, ctx: *mut c_void) {
    if state.is_null() {
        return;
    }
    let raw = RawCtx(ctx);
    guard((), || unsafe {
        (&mut *state).set_bindings_init_callback(move || cb(raw.0));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop_print(_ctx: *mut c_void, _text: *const c_char) {}

    #[test]
    fn new_free_roundtrip_does_not_panic() {
        let state = state_new();
        assert!(!state.is_null());
        state_set_print_callback(state, noop_print, std::ptr::null_mut());
        state_free(state);
    }

    #[test]
    fn do_cstring_evaluates_and_returns_a_token() {
        let state = state_new();
        let src = CString::new("(clone)").unwrap();
        let token = unsafe { state_do_cstring(state, src.as_ptr()) };
        assert_ne!(token, u64::MAX);
        state_free(state);
    }

    #[test]
    fn null_state_is_handled_without_crashing() {
        assert_eq!(state_exit_result(std::ptr::null_mut()), 0);
        state_free(std::ptr::null_mut());
    }
}
