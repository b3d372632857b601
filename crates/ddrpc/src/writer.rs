// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Byte writer sinks.
//!
//! Responses are streamed: a writer is begun (optionally with the total
//! size), fed zero or more chunks, and ended exactly once with the final
//! status of the call. Handlers write into a server-side sink; callers hand
//! a sink to [`crate::RpcClient::call`] to receive the bytes.

use crate::error::{ResultCode, RpcError, RpcResult};

/// Streaming sink for response bytes.
pub trait ByteWriter {
    /// Start a response. `total_size` is known when the peer announced it.
    fn begin(&mut self, total_size: Option<usize>) -> RpcResult<()>;

    /// Append a chunk. May be called any number of times between begin and end.
    fn write_bytes(&mut self, bytes: &[u8]) -> RpcResult<()>;

    /// Terminate the response with its final status.
    fn end(&mut self, result: ResultCode) -> RpcResult<()>;
}

impl<W: ByteWriter + ?Sized> ByteWriter for &mut W {
    fn begin(&mut self, total_size: Option<usize>) -> RpcResult<()> {
        (**self).begin(total_size)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> RpcResult<()> {
        (**self).write_bytes(bytes)
    }

    fn end(&mut self, result: ResultCode) -> RpcResult<()> {
        (**self).end(result)
    }
}

/// Collects the response into memory.
#[derive(Debug, Default)]
pub struct BufferWriter {
    data: Vec<u8>,
    announced: Option<usize>,
    result: Option<ResultCode>,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes received so far
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Size announced by the peer, if any
    pub fn announced_size(&self) -> Option<usize> {
        self.announced
    }

    /// Status passed to `end`, `None` until the response completed
    pub fn result(&self) -> Option<ResultCode> {
        self.result
    }

    /// Reset for reuse across calls.
    pub fn clear(&mut self) {
        self.data.clear();
        self.announced = None;
        self.result = None;
    }
}

impl ByteWriter for BufferWriter {
    fn begin(&mut self, total_size: Option<usize>) -> RpcResult<()> {
        if self.result.is_some() {
            return Err(RpcError::invalid_parameter());
        }
        self.announced = total_size;
        if let Some(size) = total_size {
            self.data.reserve(size);
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> RpcResult<()> {
        if self.result.is_some() {
            return Err(RpcError::invalid_parameter());
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    fn end(&mut self, result: ResultCode) -> RpcResult<()> {
        if self.result.is_some() {
            return Err(RpcError::invalid_parameter());
        }
        self.result = Some(result);
        Ok(())
    }
}

/// Accepts begin/end but refuses every byte with a fixed code.
#[derive(Debug, Clone, Copy)]
pub struct RejectingWriter {
    code: ResultCode,
    result: Option<ResultCode>,
}

impl RejectingWriter {
    pub fn new(code: ResultCode) -> Self {
        Self { code, result: None }
    }

    pub fn result(&self) -> Option<ResultCode> {
        self.result
    }
}

impl Default for RejectingWriter {
    fn default() -> Self {
        Self::new(ResultCode::ResponseRejected)
    }
}

impl ByteWriter for RejectingWriter {
    fn begin(&mut self, _total_size: Option<usize>) -> RpcResult<()> {
        Ok(())
    }

    fn write_bytes(&mut self, _bytes: &[u8]) -> RpcResult<()> {
        Err(RpcError::Status(self.code))
    }

    fn end(&mut self, result: ResultCode) -> RpcResult<()> {
        self.result = Some(result);
        Ok(())
    }
}

/// Drives an optional caller writer on the client side.
///
/// Begins lazily on the first chunk when the peer sent no size indicator.
/// The first writer failure is remembered and further bytes are dropped so
/// the response can still be drained.
pub(crate) struct OptionalWriter<'a> {
    inner: Option<&'a mut dyn ByteWriter>,
    began: bool,
    received: usize,
    failure: Option<ResultCode>,
}

impl<'a> OptionalWriter<'a> {
    pub(crate) fn new(inner: Option<&'a mut dyn ByteWriter>) -> Self {
        Self {
            inner,
            began: false,
            received: 0,
            failure: None,
        }
    }

    pub(crate) fn is_present(&self) -> bool {
        self.inner.is_some()
    }

    /// Response bytes seen, whether or not they were forwarded
    pub(crate) fn received(&self) -> usize {
        self.received
    }

    pub(crate) fn begin(&mut self, total_size: Option<usize>) {
        if self.began {
            return;
        }
        self.began = true;
        if let Some(writer) = self.inner.as_mut() {
            if let Err(e) = writer.begin(total_size) {
                self.failure.get_or_insert(e.code());
            }
        }
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        self.begin(None);
        self.received += bytes.len();
        if self.failure.is_some() {
            return;
        }
        if let Some(writer) = self.inner.as_mut() {
            if let Err(e) = writer.write_bytes(bytes) {
                self.failure = Some(e.code());
            }
        }
    }

    /// End the caller writer and return the status the call reports.
    pub(crate) fn end(&mut self, result: ResultCode) -> ResultCode {
        let result = match self.failure {
            Some(code) if result.is_success() => code,
            _ => result,
        };

        match self.inner.as_mut() {
            Some(writer) => match writer.end(result) {
                Err(e) if result.is_success() => e.code(),
                _ => result,
            },
            None => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_writer_collects() {
        let mut writer = BufferWriter::new();
        writer.begin(Some(6)).unwrap();
        writer.write_bytes(b"abc").unwrap();
        writer.write_bytes(b"def").unwrap();
        writer.end(ResultCode::Success).unwrap();

        assert_eq!(writer.bytes(), b"abcdef");
        assert_eq!(writer.announced_size(), Some(6));
        assert_eq!(writer.result(), Some(ResultCode::Success));
    }

    #[test]
    fn buffer_writer_rejects_use_after_end() {
        let mut writer = BufferWriter::new();
        writer.end(ResultCode::Unknown).unwrap();

        assert_eq!(
            writer.write_bytes(b"late").unwrap_err(),
            ResultCode::InvalidParameter
        );
        assert_eq!(
            writer.end(ResultCode::Success).unwrap_err(),
            ResultCode::InvalidParameter
        );

        writer.clear();
        assert!(writer.write_bytes(b"again").is_ok());
    }

    #[test]
    fn rejecting_writer() {
        let mut writer = RejectingWriter::new(ResultCode::UnexpectedReturnData);
        assert!(writer.begin(None).is_ok());
        assert_eq!(
            writer.write_bytes(b"x").unwrap_err(),
            ResultCode::UnexpectedReturnData
        );
        writer.end(ResultCode::Success).unwrap();
        assert_eq!(writer.result(), Some(ResultCode::Success));
    }

    #[test]
    fn optional_writer_without_sink_counts() {
        let mut writer = OptionalWriter::new(None);
        writer.write_bytes(&[1, 2, 3]);
        assert!(!writer.is_present());
        assert_eq!(writer.received(), 3);
        assert_eq!(writer.end(ResultCode::Success), ResultCode::Success);
    }

    #[test]
    fn optional_writer_reports_sink_failure() {
        let mut sink = RejectingWriter::default();
        let mut writer = OptionalWriter::new(Some(&mut sink));
        writer.write_bytes(&[1]);
        writer.write_bytes(&[2]);

        assert_eq!(writer.received(), 2);
        assert_eq!(writer.end(ResultCode::Success), ResultCode::ResponseRejected);
        assert_eq!(sink.result(), Some(ResultCode::ResponseRejected));
    }

    #[test]
    fn optional_writer_keeps_remote_error() {
        let mut sink = BufferWriter::new();
        let mut writer = OptionalWriter::new(Some(&mut sink));
        assert_eq!(
            writer.end(ResultCode::ServiceNotRegistered),
            ResultCode::ServiceNotRegistered
        );
        assert_eq!(sink.result(), Some(ResultCode::ServiceNotRegistered));
    }
}
