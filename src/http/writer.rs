use std::fs::File;
use std::io::{self, ErrorKind, Write};

use bytes::Bytes;
use mio::net::TcpStream;

use crate::http::response::Response;

/// Result of one write-readiness pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Everything, including any attached file, has reached the socket.
    Done,
    /// The socket stopped accepting bytes; resume on the next readiness.
    Pending,
}

struct FileTransfer {
    file: File,
    offset: u64,
    len: u64,
}

/// Streams a prepared response to a non-blocking socket.
///
/// Keeps a cursor into the serialized head+body and, once that is flushed, a
/// cursor into the attached file, so a transfer can span any number of
/// write-readiness events.
pub struct ResponseWriter {
    buffer: Bytes,
    written: usize,
    file: Option<FileTransfer>,
    keep_alive: bool,
}

impl ResponseWriter {
    /// Takes ownership of a response that has already been `prepare()`d.
    pub fn new(mut response: Response) -> Self {
        let keep_alive = response.is_keep_alive();
        let buffer = response.take_payload();
        let file = response
            .take_file()
            .map(|(file, len)| FileTransfer { file, offset: 0, len });
        Self {
            buffer,
            written: 0,
            file,
            keep_alive,
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Writes as much as the socket accepts right now.
    pub fn write_to(&mut self, stream: &mut TcpStream) -> io::Result<WriteOutcome> {
        while self.written < self.buffer.len() {
            match stream.write(&self.buffer[self.written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::WriteZero,
                        "connection closed while writing response",
                    ));
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(WriteOutcome::Pending),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if let Some(transfer) = self.file.as_mut() {
            while transfer.offset < transfer.len {
                match transfer_file(transfer, stream) {
                    Ok(0) => {
                        return Err(io::Error::new(
                            ErrorKind::UnexpectedEof,
                            "file shrank during response transfer",
                        ));
                    }
                    Ok(n) => transfer.offset += n,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(WriteOutcome::Pending),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            self.file = None;
        }

        Ok(WriteOutcome::Done)
    }
}

/// Hands file bytes to the socket without staging them in userspace.
#[cfg(target_os = "linux")]
fn transfer_file(transfer: &mut FileTransfer, stream: &TcpStream) -> io::Result<u64> {
    use std::os::fd::AsRawFd;

    let mut offset = transfer.offset as libc::off_t;
    let count = (transfer.len - transfer.offset) as usize;
    let sent = unsafe {
        libc::sendfile(
            stream.as_raw_fd(),
            transfer.file.as_raw_fd(),
            &mut offset,
            count,
        )
    };
    if sent < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(sent as u64)
    }
}

#[cfg(not(target_os = "linux"))]
fn transfer_file(transfer: &mut FileTransfer, stream: &mut TcpStream) -> io::Result<u64> {
    use std::io::{Read, Seek, SeekFrom};

    let mut chunk = [0u8; 8192];
    transfer.file.seek(SeekFrom::Start(transfer.offset))?;
    let n = transfer.file.read(&mut chunk)?;
    if n == 0 {
        return Ok(0);
    }
    let written = stream.write(&chunk[..n])?;
    Ok(written as u64)
}
