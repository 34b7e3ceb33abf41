use bytes::{Buf, BytesMut};

use crate::error::ParseError;
use crate::http::request::{Method, Request};

/// Upper bound on the request line + headers; a head that grows past this
/// without completing is rejected rather than buffered forever.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// What a call to [`RequestParser::feed`] produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// More bytes are needed.
    Partial,
    /// Headers carry `Expect` and no body byte has arrived yet; the caller
    /// should answer `100 Continue` before the body shows up. Yielded at
    /// most once per request.
    ExpectContinue,
    /// The message is fully assembled.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    RequestLine,
    Headers,
    Body,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    None,
    Length(usize),
    Chunked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkPhase {
    Size,
    Data(usize),
    DataCrlf,
    Trailer,
}

/// Incremental HTTP/1.1 request assembler.
///
/// One instance lives per connection while a request is in flight; each
/// socket read feeds its bytes in and the parser advances as far as the
/// accumulated input allows. The final request is identical no matter how
/// the input was split across reads.
pub struct RequestParser {
    state: ParseState,
    buf: BytesMut,
    request: Option<Request>,
    framing: BodyFraming,
    chunk: ChunkPhase,
    continue_yielded: bool,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            buf: BytesMut::new(),
            request: None,
            framing: BodyFraming::None,
            chunk: ChunkPhase::Size,
            continue_yielded: false,
        }
    }

    /// Feeds one chunk of input and advances the state machine.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<ParseStatus, ParseError> {
        self.buf.extend_from_slice(bytes);
        self.advance()
    }

    /// Consumes the parser after [`ParseStatus::Complete`], yielding the
    /// finished request.
    pub fn finish(self) -> Option<Request> {
        self.request
    }

    /// A copy of the request as assembled so far, flagged for the
    /// 100-continue early exit. The parser keeps accumulating into its own
    /// instance, so the snapshot never sees later body bytes.
    pub fn snapshot(&self) -> Option<Request> {
        self.request.as_ref().map(|r| {
            let mut snap = r.clone();
            snap.expect_continue = true;
            snap
        })
    }

    fn advance(&mut self) -> Result<ParseStatus, ParseError> {
        loop {
            match self.state {
                ParseState::RequestLine => {
                    let Some(line) = take_line(&mut self.buf)? else {
                        return self.partial();
                    };
                    if line.is_empty() {
                        // tolerate blank lines ahead of the request line
                        continue;
                    }
                    self.request = Some(parse_request_line(&line)?);
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let Some(line) = take_line(&mut self.buf)? else {
                        return self.partial();
                    };
                    if line.is_empty() {
                        self.begin_body()?;
                        if self.state == ParseState::Finished {
                            return self.complete();
                        }
                        if self.should_yield_continue() {
                            self.continue_yielded = true;
                            return Ok(ParseStatus::ExpectContinue);
                        }
                    } else {
                        let (name, value) = line
                            .split_once(':')
                            .ok_or_else(|| ParseError::InvalidHeader(line.clone()))?;
                        if let Some(request) = self.request.as_mut() {
                            request.push_header(name, value);
                        }
                    }
                }
                ParseState::Body => match self.framing {
                    BodyFraming::Length(total) => {
                        let done = match self.request.as_mut() {
                            Some(request) => {
                                let need = total - request.body.len();
                                let take = need.min(self.buf.len());
                                request.body.extend_from_slice(&self.buf[..take]);
                                self.buf.advance(take);
                                request.body.len() == total
                            }
                            None => true,
                        };
                        if done {
                            self.state = ParseState::Finished;
                            return self.complete();
                        }
                        return self.partial();
                    }
                    BodyFraming::Chunked => {
                        if self.advance_chunked()? {
                            self.state = ParseState::Finished;
                            return self.complete();
                        }
                        return self.partial();
                    }
                    BodyFraming::None => {
                        self.state = ParseState::Finished;
                        return self.complete();
                    }
                },
                ParseState::Finished => return Ok(ParseStatus::Complete),
            }
        }
    }

    /// Decides the body framing once the header block ends.
    fn begin_body(&mut self) -> Result<(), ParseError> {
        let Some(request) = self.request.as_mut() else {
            self.state = ParseState::Finished;
            return Ok(());
        };
        if request.is_chunked() {
            self.framing = BodyFraming::Chunked;
            self.chunk = ChunkPhase::Size;
            self.state = ParseState::Body;
        } else if let Some(value) = request.header("content-length") {
            let total: usize = value
                .trim()
                .parse()
                .map_err(|_| ParseError::InvalidContentLength)?;
            if total == 0 {
                self.state = ParseState::Finished;
            } else {
                request.body.reserve(total);
                self.framing = BodyFraming::Length(total);
                self.state = ParseState::Body;
            }
        } else {
            self.state = ParseState::Finished;
        }
        Ok(())
    }

    fn should_yield_continue(&self) -> bool {
        !self.continue_yielded
            && self.buf.is_empty()
            && self
                .request
                .as_ref()
                .map(|r| r.header("expect").is_some())
                .unwrap_or(false)
    }

    /// Runs the chunked decoder as far as the input allows; true once the
    /// terminating chunk and trailer block have been observed.
    fn advance_chunked(&mut self) -> Result<bool, ParseError> {
        loop {
            match self.chunk {
                ChunkPhase::Size => {
                    let Some(line) = take_line(&mut self.buf)? else {
                        return Ok(false);
                    };
                    let size_token = match line.split_once(';') {
                        Some((size, _extensions)) => size,
                        None => line.as_str(),
                    };
                    let size = usize::from_str_radix(size_token.trim(), 16)
                        .map_err(|_| ParseError::InvalidChunk)?;
                    self.chunk = if size == 0 {
                        ChunkPhase::Trailer
                    } else {
                        ChunkPhase::Data(size)
                    };
                }
                ChunkPhase::Data(remaining) => {
                    let take = remaining.min(self.buf.len());
                    if take == 0 {
                        return Ok(false);
                    }
                    if let Some(request) = self.request.as_mut() {
                        request.body.extend_from_slice(&self.buf[..take]);
                    }
                    self.buf.advance(take);
                    if take == remaining {
                        self.chunk = ChunkPhase::DataCrlf;
                    } else {
                        self.chunk = ChunkPhase::Data(remaining - take);
                        return Ok(false);
                    }
                }
                ChunkPhase::DataCrlf => {
                    let Some(line) = take_line(&mut self.buf)? else {
                        return Ok(false);
                    };
                    if !line.is_empty() {
                        return Err(ParseError::InvalidChunk);
                    }
                    self.chunk = ChunkPhase::Size;
                }
                ChunkPhase::Trailer => {
                    let Some(line) = take_line(&mut self.buf)? else {
                        return Ok(false);
                    };
                    if line.is_empty() {
                        return Ok(true);
                    }
                    // trailer headers are read and discarded
                }
            }
        }
    }

    fn partial(&self) -> Result<ParseStatus, ParseError> {
        if self.state != ParseState::Body && self.buf.len() > MAX_HEAD_BYTES {
            return Err(ParseError::HeadTooLarge(MAX_HEAD_BYTES));
        }
        Ok(ParseStatus::Partial)
    }

    fn complete(&mut self) -> Result<ParseStatus, ParseError> {
        if let Some(request) = self.request.as_mut() {
            request.finished = true;
        }
        Ok(ParseStatus::Complete)
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits the next line off the buffer, if a full one is present. Lines are
/// CRLF-terminated; a bare LF is tolerated.
fn take_line(buf: &mut BytesMut) -> Result<Option<String>, ParseError> {
    let Some(idx) = buf.iter().position(|&b| b == b'\n') else {
        return Ok(None);
    };
    let line = buf.split_to(idx + 1);
    let mut end = line.len() - 1;
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    let text = std::str::from_utf8(&line[..end]).map_err(|_| ParseError::InvalidEncoding)?;
    Ok(Some(text.to_string()))
}

fn parse_request_line(line: &str) -> Result<Request, ParseError> {
    let mut parts = line.splitn(3, ' ');
    let method_token = parts.next().ok_or(ParseError::InvalidRequestLine)?;
    let uri = parts.next().ok_or(ParseError::InvalidRequestLine)?;
    let version = parts.next().ok_or(ParseError::InvalidRequestLine)?;
    let method = Method::from_str(method_token)
        .ok_or_else(|| ParseError::UnknownMethod(method_token.to_string()))?;
    Ok(Request::new(method, uri, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let mut parser = RequestParser::new();
        let status = parser.feed(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert_eq!(status, Ok(ParseStatus::Complete));

        let request = parser.finish().expect("request");
        assert_eq!(request.path, "/");
        assert_eq!(request.header("host"), Some("example.com"));
        assert!(request.finished);
    }
}
