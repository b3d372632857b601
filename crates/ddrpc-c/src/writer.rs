// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridges between `DDByteWriter` and [`ByteWriter`].

use std::os::raw::c_void;
use std::ptr;

use ddrpc::{ByteWriter, ResultCode, RpcError, RpcResult};

use crate::DDResult;

/// Called once before any bytes; `total_size` is NULL when unknown.
pub type PfnByteWriterBegin =
    unsafe extern "C" fn(user_data: *mut c_void, total_size: *const usize) -> DDResult;

/// Called for each chunk of data.
pub type PfnByteWriterWriteBytes =
    unsafe extern "C" fn(user_data: *mut c_void, data: *const c_void, size: usize) -> DDResult;

/// Called once with the final status of the stream.
pub type PfnByteWriterEnd = unsafe extern "C" fn(user_data: *mut c_void, result: DDResult);

/// Streaming byte sink implemented by C code.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DDByteWriter {
    pub pfn_begin: Option<PfnByteWriterBegin>,
    pub pfn_write_bytes: Option<PfnByteWriterWriteBytes>,
    pub pfn_end: Option<PfnByteWriterEnd>,
    pub user_data: *mut c_void,
}

impl DDByteWriter {
    pub(crate) fn is_complete(&self) -> bool {
        self.pfn_begin.is_some() && self.pfn_write_bytes.is_some() && self.pfn_end.is_some()
    }
}

fn status(code: DDResult) -> RpcResult<()> {
    ResultCode::from_i32(code).into_result()
}

/// A C writer seen as a [`ByteWriter`] (caller-side response sink).
pub(crate) struct ForeignWriter {
    raw: DDByteWriter,
}

impl ForeignWriter {
    /// Returns `None` when a callback is missing.
    pub(crate) fn new(raw: DDByteWriter) -> Option<Self> {
        raw.is_complete().then_some(Self { raw })
    }
}

impl ByteWriter for ForeignWriter {
    fn begin(&mut self, total_size: Option<usize>) -> RpcResult<()> {
        let size_ptr = total_size
            .as_ref()
            .map_or(ptr::null(), |size| size as *const usize);
        match self.raw.pfn_begin {
            // SAFETY: the C caller guarantees the callbacks accept its user data
            Some(begin) => status(unsafe { begin(self.raw.user_data, size_ptr) }),
            None => Err(RpcError::invalid_parameter()),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> RpcResult<()> {
        match self.raw.pfn_write_bytes {
            // SAFETY: `bytes` is valid for the duration of the callback
            Some(write) => status(unsafe {
                write(self.raw.user_data, bytes.as_ptr().cast(), bytes.len())
            }),
            None => Err(RpcError::invalid_parameter()),
        }
    }

    fn end(&mut self, result: ResultCode) -> RpcResult<()> {
        if let Some(end) = self.raw.pfn_end {
            // SAFETY: see `begin`
            unsafe { end(self.raw.user_data, result.as_i32()) };
        }
        Ok(())
    }
}

/// Expose a Rust [`ByteWriter`] to a C handler.
///
/// The returned struct borrows `slot`; it must not outlive it.
pub(crate) fn borrow_as_c(slot: &mut &mut dyn ByteWriter) -> DDByteWriter {
    let user_data: *mut &mut dyn ByteWriter = slot;
    DDByteWriter {
        pfn_begin: Some(native_begin),
        pfn_write_bytes: Some(native_write_bytes),
        pfn_end: Some(native_end),
        user_data: user_data.cast(),
    }
}

unsafe fn native<'a>(user_data: *mut c_void) -> &'a mut dyn ByteWriter {
    &mut **user_data.cast::<&mut dyn ByteWriter>()
}

unsafe extern "C" fn native_begin(user_data: *mut c_void, total_size: *const usize) -> DDResult {
    let size = if total_size.is_null() {
        None
    } else {
        Some(*total_size)
    };
    match native(user_data).begin(size) {
        Ok(()) => ResultCode::Success.as_i32(),
        Err(e) => e.code().as_i32(),
    }
}

unsafe extern "C" fn native_write_bytes(
    user_data: *mut c_void,
    data: *const c_void,
    size: usize,
) -> DDResult {
    if size == 0 {
        return ResultCode::Success.as_i32();
    }
    if data.is_null() {
        return ResultCode::InvalidParameter.as_i32();
    }
    let bytes = std::slice::from_raw_parts(data.cast::<u8>(), size);
    match native(user_data).write_bytes(bytes) {
        Ok(()) => ResultCode::Success.as_i32(),
        Err(e) => e.code().as_i32(),
    }
}

unsafe extern "C" fn native_end(user_data: *mut c_void, result: DDResult) {
    if let Err(e) = native(user_data).end(ResultCode::from_i32(result)) {
        log::debug!("[ddrpc-c] writer end rejected: {}", e);
    }
}
