//! Byte stream used by volume upload and download.

use libc::c_char;
use std::cell::Cell;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use tracing::warn;

use crate::abi::StorageAbi;
use crate::error::{Result, StorageError};
use crate::marshal::{check, check_handle, released_stream, transfer_len};

/// Owned blocking libvirt stream.
///
/// A stream is created unbound; [`StorageVol::upload`] or
/// [`StorageVol::download`] attach it to a byte range of a volume. Its
/// lifetime is independent of the volume it was bound to.
///
/// [`StorageVol::upload`]: crate::StorageVol::upload
/// [`StorageVol::download`]: crate::StorageVol::download
pub struct Stream<'c, A: StorageAbi> {
    abi: &'c A,
    ptr: Option<A::Stream>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<'c, A: StorageAbi> Stream<'c, A> {
    /// Create a new blocking stream on the session.
    pub fn new(abi: &'c A) -> Result<Self> {
        let st = unsafe { abi.stream_new(0) };
        let st = check_handle(abi, "virStreamNew", st)?;

        Ok(Self {
            abi,
            ptr: Some(st),
            _not_sync: PhantomData,
        })
    }

    /// The raw reference, or `None` once released.
    pub fn as_raw(&self) -> Option<A::Stream> {
        self.ptr
    }

    fn raw(&self, call: &'static str) -> Result<A::Stream> {
        self.ptr.ok_or_else(|| released_stream(call))
    }

    /// Write `data` to the stream, returning how many bytes were accepted.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        const CALL: &str = "virStreamSend";
        let st = self.raw(CALL)?;

        let ret = unsafe {
            self.abi
                .stream_send(st, data.as_ptr() as *const c_char, transfer_len(data.len()))
        };
        Ok(check(self.abi, CALL, ret)? as usize)
    }

    /// Read into `buf`, returning how many bytes arrived; 0 is end of stream.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        const CALL: &str = "virStreamRecv";
        let st = self.raw(CALL)?;

        let ret = unsafe {
            self.abi
                .stream_recv(st, buf.as_mut_ptr() as *mut c_char, transfer_len(buf.len()))
        };
        Ok(check(self.abi, CALL, ret)? as usize)
    }

    /// Complete the transfer successfully.
    pub fn finish(&mut self) -> Result<()> {
        const CALL: &str = "virStreamFinish";
        let st = self.raw(CALL)?;

        let ret = unsafe { self.abi.stream_finish(st) };
        check(self.abi, CALL, ret)?;
        Ok(())
    }

    /// Terminate the transfer, discarding anything in flight.
    pub fn abort(&mut self) -> Result<()> {
        const CALL: &str = "virStreamAbort";
        let st = self.raw(CALL)?;

        let ret = unsafe { self.abi.stream_abort(st) };
        check(self.abi, CALL, ret)?;
        Ok(())
    }

    /// Release this handle's reference to the native stream.
    ///
    /// Calling it again after a successful release does nothing.
    pub fn free(&mut self) -> Result<()> {
        let Some(st) = self.ptr else {
            return Ok(());
        };

        let ret = unsafe { self.abi.stream_free(st) };
        check(self.abi, "virStreamFree", ret)?;

        self.ptr = None;
        Ok(())
    }
}

fn io_error(e: StorageError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

impl<A: StorageAbi> io::Read for Stream<'_, A> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.recv(buf).map_err(io_error)
    }
}

impl<A: StorageAbi> io::Write for Stream<'_, A> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.send(buf).map_err(io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<A: StorageAbi> fmt::Debug for Stream<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").field("ptr", &self.ptr).finish()
    }
}

impl<A: StorageAbi> Drop for Stream<'_, A> {
    fn drop(&mut self) {
        if let Err(e) = self.free() {
            warn!(error = %e, "Failed to release stream handle");
        }
    }
}
