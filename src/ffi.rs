// C ABI
//
// Flat `extern "C"` surface for foreign runtimes. Every function returns an
// i32 status (`VW_OK`, `VW_RESIZE`, or a negative error kind) and writes
// results through out-pointers. Resource handles are slotmap keys in their
// u64 FFI encoding; a freed or forged handle yields `VW_ERR_STALE_HANDLE`.
//
// The message of the last failure on the calling thread is available from
// `vw_last_error` until the next failure on that thread replaces it.
//
// Safety: pointers must be null or valid for the stated length, and a context
// must only be used from one thread at a time.

use raw_window_handle::{
    RawDisplayHandle, RawWindowHandle, WaylandDisplayHandle, WaylandWindowHandle, Win32WindowHandle,
    WindowsDisplayHandle, XlibDisplayHandle, XlibWindowHandle,
};
use slotmap::{Key, KeyData};
use std::cell::RefCell;
use std::ffi::{c_char, c_ulong, c_void, CStr, CString};
use std::panic::{self, AssertUnwindSafe};

use crate::backend::{ShaderPair, VulkanDevice};
use crate::config::Config;
use crate::context::Context;
use crate::error::{Result, VwError};

/// Opaque context handed to the caller
pub type VwContext = Context<VulkanDevice>;

pub const VW_OK: i32 = 0;
/// `vw_draw_end` succeeded and the swapchain should be resized
pub const VW_RESIZE: i32 = 1;
pub const VW_ERR_VULKAN: i32 = -1;
pub const VW_ERR_ACQUIRE: i32 = -2;
pub const VW_ERR_NO_MEMORY_TYPE: i32 = -3;
pub const VW_ERR_STALE_HANDLE: i32 = -4;
pub const VW_ERR_INVALID_SHADER: i32 = -5;
pub const VW_ERR_INVALID_ARGUMENT: i32 = -6;
pub const VW_ERR_FRAME_STATE: i32 = -7;
pub const VW_ERR_INIT: i32 = -8;
pub const VW_ERR_PANIC: i32 = -9;

/// One shader pair as passed by the caller
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VwShaderPair {
    pub vertex: *const u8,
    pub vertex_len: usize,
    pub fragment: *const u8,
    pub fragment_len: usize,
    pub textures: u32,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(message: &str) {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|last| *last.borrow_mut() = Some(message));
}

/// Status code for an error kind
pub fn status(err: &VwError) -> i32 {
    match err {
        VwError::Vulkan { .. } => VW_ERR_VULKAN,
        VwError::Acquire(_) => VW_ERR_ACQUIRE,
        VwError::NoMemoryType { .. } => VW_ERR_NO_MEMORY_TYPE,
        VwError::StaleHandle(_) => VW_ERR_STALE_HANDLE,
        VwError::InvalidShader(_) => VW_ERR_INVALID_SHADER,
        VwError::InvalidArgument(_) => VW_ERR_INVALID_ARGUMENT,
        VwError::FrameState { .. } => VW_ERR_FRAME_STATE,
        VwError::Init(_) => VW_ERR_INIT,
    }
}

/// Run `f`, turning errors and panics into status codes
fn guard<F: FnOnce() -> Result<i32>>(f: F) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(code)) => code,
        Ok(Err(err)) => {
            log::error!("{}", err);
            set_last_error(&err.to_string());
            status(&err)
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("panic at the C boundary: {}", message);
            set_last_error(&format!("panic: {}", message));
            VW_ERR_PANIC
        }
    }
}

unsafe fn context<'a>(ctx: *mut VwContext) -> Result<&'a mut VwContext> {
    ctx.as_mut().ok_or_else(|| VwError::invalid("null context"))
}

/// Borrow `len` elements at `ptr`; null is fine only when `len` is 0
unsafe fn slice<'a, T>(ptr: *const T, len: usize, what: &str) -> Result<&'a [T]> {
    if len == 0 {
        Ok(&[])
    } else if ptr.is_null() {
        Err(VwError::invalid(format!("null {} pointer", what)))
    } else {
        Ok(std::slice::from_raw_parts(ptr, len))
    }
}

fn check_out<T>(out: *mut T) -> Result<()> {
    if out.is_null() {
        Err(VwError::invalid("null output pointer"))
    } else {
        Ok(())
    }
}

fn handle<K: Key>(key: K) -> u64 {
    key.data().as_ffi()
}

fn key<K: From<KeyData>>(handle: u64) -> K {
    KeyData::from_ffi(handle).into()
}

// ─────────────────────────────────────────────────────────────────────────────
// Context
// ─────────────────────────────────────────────────────────────────────────────

unsafe fn new_context(
    display: RawDisplayHandle,
    window: RawWindowHandle,
    width: u32,
    height: u32,
    config_path: *const c_char,
    out_ctx: *mut *mut VwContext,
) -> Result<i32> {
    check_out(out_ctx)?;

    let config = if config_path.is_null() {
        Config::load()
    } else {
        let path = CStr::from_ptr(config_path)
            .to_str()
            .map_err(|_| VwError::invalid("config path is not UTF-8"))?;
        Config::load_from_path(path)?
    };
    crate::init_logging(&config);

    let ctx = Context::new(display, window, width, height, &config)?;
    *out_ctx = Box::into_raw(Box::new(ctx));
    Ok(VW_OK)
}

/// Create a context for an X11 window
///
/// # Safety
/// `display` must be a live `Display*`, `config_path` null or a C string.
#[no_mangle]
pub unsafe extern "C" fn vw_context_new_xlib(
    display: *mut c_void,
    window: c_ulong,
    width: u32,
    height: u32,
    config_path: *const c_char,
    out_ctx: *mut *mut VwContext,
) -> i32 {
    let mut display_handle = XlibDisplayHandle::empty();
    display_handle.display = display;
    let mut window_handle = XlibWindowHandle::empty();
    window_handle.window = window;

    guard(|| {
        new_context(
            RawDisplayHandle::Xlib(display_handle),
            RawWindowHandle::Xlib(window_handle),
            width,
            height,
            config_path,
            out_ctx,
        )
    })
}

/// Create a context for a Wayland surface
///
/// # Safety
/// `display` must be a live `wl_display*` and `surface` a `wl_surface*`.
#[no_mangle]
pub unsafe extern "C" fn vw_context_new_wayland(
    display: *mut c_void,
    surface: *mut c_void,
    width: u32,
    height: u32,
    config_path: *const c_char,
    out_ctx: *mut *mut VwContext,
) -> i32 {
    let mut display_handle = WaylandDisplayHandle::empty();
    display_handle.display = display;
    let mut window_handle = WaylandWindowHandle::empty();
    window_handle.surface = surface;

    guard(|| {
        new_context(
            RawDisplayHandle::Wayland(display_handle),
            RawWindowHandle::Wayland(window_handle),
            width,
            height,
            config_path,
            out_ctx,
        )
    })
}

/// Create a context for a Win32 window
///
/// # Safety
/// `hinstance` and `hwnd` must identify a live window.
#[no_mangle]
pub unsafe extern "C" fn vw_context_new_win32(
    hinstance: *mut c_void,
    hwnd: *mut c_void,
    width: u32,
    height: u32,
    config_path: *const c_char,
    out_ctx: *mut *mut VwContext,
) -> i32 {
    let mut window_handle = Win32WindowHandle::empty();
    window_handle.hinstance = hinstance;
    window_handle.hwnd = hwnd;

    guard(|| {
        new_context(
            RawDisplayHandle::Windows(WindowsDisplayHandle::empty()),
            RawWindowHandle::Win32(window_handle),
            width,
            height,
            config_path,
            out_ctx,
        )
    })
}

/// Destroy a context and everything it still owns; null is ignored
///
/// # Safety
/// `ctx` must come from a `vw_context_new_*` call and not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn vw_context_free(ctx: *mut VwContext) {
    if !ctx.is_null() {
        let _ = guard(|| {
            drop(Box::from_raw(ctx));
            Ok(VW_OK)
        });
    }
}

/// Rebuild the render targets. A zero width or height is
/// `VW_ERR_INVALID_ARGUMENT`; skip frames until the window has area again.
///
/// # Safety
/// `ctx` must be a live context.
#[no_mangle]
pub unsafe extern "C" fn vw_context_resize(ctx: *mut VwContext, width: u32, height: u32) -> i32 {
    guard(|| {
        context(ctx)?.resize(width, height)?;
        Ok(VW_OK)
    })
}

/// Message of the last failure on this thread, or null
#[no_mangle]
pub extern "C" fn vw_last_error() -> *const c_char {
    LAST_ERROR.with(|last| last.borrow().as_ref().map_or(std::ptr::null(), |m| m.as_ptr()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipelines and draw instances
// ─────────────────────────────────────────────────────────────────────────────

/// Build `count` pipelines; `out_handles` receives `count` handles
///
/// # Safety
/// `shaders` and `out_handles` must hold `count` elements.
#[no_mangle]
pub unsafe extern "C" fn vw_pipelines_new(
    ctx: *mut VwContext,
    shaders: *const VwShaderPair,
    count: usize,
    out_handles: *mut u64,
) -> i32 {
    guard(|| {
        let ctx = context(ctx)?;
        check_out(out_handles)?;

        let pairs = slice(shaders, count, "shader pair")?
            .iter()
            .map(|pair| {
                Ok(ShaderPair {
                    vertex: slice(pair.vertex, pair.vertex_len, "vertex shader")?,
                    fragment: slice(pair.fragment, pair.fragment_len, "fragment shader")?,
                    textures: pair.textures,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let keys = ctx.build_pipelines(&pairs)?;
        for (i, key) in keys.into_iter().enumerate() {
            *out_handles.add(i) = handle(key);
        }
        Ok(VW_OK)
    })
}

/// # Safety
/// `ctx` must be a live context and `out_instance` writable.
#[no_mangle]
pub unsafe extern "C" fn vw_instance_new(
    ctx: *mut VwContext,
    pipeline: u64,
    n_floats: usize,
    out_instance: *mut u64,
) -> i32 {
    guard(|| {
        let ctx = context(ctx)?;
        check_out(out_instance)?;
        *out_instance = handle(ctx.new_instance(key(pipeline), n_floats)?);
        Ok(VW_OK)
    })
}

/// # Safety
/// `textures` must hold `count` handles.
#[no_mangle]
pub unsafe extern "C" fn vw_instance_new_textured(
    ctx: *mut VwContext,
    pipeline: u64,
    textures: *const u64,
    count: usize,
    out_instance: *mut u64,
) -> i32 {
    guard(|| {
        let ctx = context(ctx)?;
        check_out(out_instance)?;
        let textures: Vec<_> = slice(textures, count, "texture")?.iter().map(|&t| key(t)).collect();
        *out_instance = handle(ctx.new_textured_instance(key(pipeline), &textures)?);
        Ok(VW_OK)
    })
}

/// # Safety
/// `textures` must hold `count` handles.
#[no_mangle]
pub unsafe extern "C" fn vw_instance_set_textures(
    ctx: *mut VwContext,
    instance: u64,
    textures: *const u64,
    count: usize,
) -> i32 {
    guard(|| {
        let ctx = context(ctx)?;
        let textures: Vec<_> = slice(textures, count, "texture")?.iter().map(|&t| key(t)).collect();
        ctx.set_instance_textures(key(instance), &textures)?;
        Ok(VW_OK)
    })
}

/// # Safety
/// `floats` must hold `count` values.
#[no_mangle]
pub unsafe extern "C" fn vw_instance_write(
    ctx: *mut VwContext,
    instance: u64,
    floats: *const f32,
    count: usize,
) -> i32 {
    guard(|| {
        let ctx = context(ctx)?;
        ctx.write_uniform(key(instance), slice(floats, count, "uniform")?)?;
        Ok(VW_OK)
    })
}

/// # Safety
/// `ctx` must be a live context.
#[no_mangle]
pub unsafe extern "C" fn vw_instance_free(ctx: *mut VwContext, instance: u64) -> i32 {
    guard(|| {
        context(ctx)?.free_instance(key(instance))?;
        Ok(VW_OK)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Shapes and textures
// ─────────────────────────────────────────────────────────────────────────────

/// # Safety
/// `floats` must hold `count` values.
#[no_mangle]
pub unsafe extern "C" fn vw_shape_new(
    ctx: *mut VwContext,
    floats: *const f32,
    count: usize,
    out_shape: *mut u64,
) -> i32 {
    guard(|| {
        let ctx = context(ctx)?;
        check_out(out_shape)?;
        *out_shape = handle(ctx.new_shape(slice(floats, count, "vertex")?)?);
        Ok(VW_OK)
    })
}

/// # Safety
/// `ctx` must be a live context.
#[no_mangle]
pub unsafe extern "C" fn vw_shape_free(ctx: *mut VwContext, shape: u64) -> i32 {
    guard(|| {
        context(ctx)?.free_shape(key(shape))?;
        Ok(VW_OK)
    })
}

/// # Safety
/// `rgba` must hold `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn vw_texture_new(
    ctx: *mut VwContext,
    width: u32,
    height: u32,
    rgba: *const u8,
    len: usize,
    out_texture: *mut u64,
) -> i32 {
    guard(|| {
        let ctx = context(ctx)?;
        check_out(out_texture)?;
        *out_texture = handle(ctx.new_texture(width, height, slice(rgba, len, "pixel")?)?);
        Ok(VW_OK)
    })
}

/// # Safety
/// `rgba` must hold `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn vw_texture_update(
    ctx: *mut VwContext,
    texture: u64,
    width: u32,
    height: u32,
    rgba: *const u8,
    len: usize,
) -> i32 {
    guard(|| {
        let ctx = context(ctx)?;
        ctx.update_texture(key(texture), width, height, slice(rgba, len, "pixel")?)?;
        Ok(VW_OK)
    })
}

/// # Safety
/// `ctx` must be a live context.
#[no_mangle]
pub unsafe extern "C" fn vw_texture_free(ctx: *mut VwContext, texture: u64) -> i32 {
    guard(|| {
        context(ctx)?.free_texture(key(texture))?;
        Ok(VW_OK)
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame loop
// ─────────────────────────────────────────────────────────────────────────────

/// # Safety
/// `ctx` must be a live context.
#[no_mangle]
pub unsafe extern "C" fn vw_draw_begin(ctx: *mut VwContext, r: f32, g: f32, b: f32) -> i32 {
    guard(|| {
        context(ctx)?.draw_begin(r, g, b)?;
        Ok(VW_OK)
    })
}

/// # Safety
/// `ctx` must be a live context.
#[no_mangle]
pub unsafe extern "C" fn vw_draw_shape(ctx: *mut VwContext, shape: u64, instance: u64) -> i32 {
    guard(|| {
        context(ctx)?.draw_shape(key(shape), key(instance))?;
        Ok(VW_OK)
    })
}

/// `VW_RESIZE` when the swapchain should be rebuilt with `vw_context_resize`
///
/// # Safety
/// `ctx` must be a live context.
#[no_mangle]
pub unsafe extern "C" fn vw_draw_end(ctx: *mut VwContext) -> i32 {
    guard(|| {
        let needs_resize = context(ctx)?.draw_end()?;
        Ok(if needs_resize { VW_RESIZE } else { VW_OK })
    })
}
