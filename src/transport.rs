//! Framed transport: reads and writes `Content-Length`-delimited JSON-RPC messages
//! on a single bidirectional byte stream (stdio, a spawned process, or a TCP socket).
//!
//! A `Transport` is split into a [`TransportReader`] and a [`TransportWriter`] so each
//! half can live on its own thread: one reader thread per stream feeds the event loop,
//! while the writer half stays with the single-threaded router so writes are never
//! interleaved.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::message::{Message, RpcError};

/// Outcome of reading the next message off a transport.
#[derive(Debug)]
pub enum ReadError {
    /// The stream was closed cleanly before any bytes of a new message arrived.
    Eof,
    /// The stream produced a malformed header or body.
    Parse(RpcError),
    Io(io::Error),
}

impl From<io::Error> for ReadError {
    fn from(e: io::Error) -> Self {
        ReadError::Io(e)
    }
}

pub struct TransportReader {
    reader: Box<dyn BufRead + Send>,
}

impl TransportReader {
    /// Reads and parses the next message. Blocking.
    pub fn read_message(&mut self) -> Result<Message, ReadError> {
        let text = read_framed(&mut self.reader)?;
        Message::try_parse(&text).map_err(ReadError::Parse)
    }
}

pub struct TransportWriter {
    writer: Box<dyn Write + Send>,
    /// Held only so the child process (if any) is reaped when the writer is dropped.
    _child: Option<Child>,
}

impl TransportWriter {
    /// Serializes and writes a message, framed with a `Content-Length` header.
    pub fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let body = serde_json::to_string(message).expect("Message always serializes");
        write!(self.writer, "Content-Length: {}\r\n\r\n{}", body.len(), body)?;
        self.writer.flush()
    }
}

/// A framed, bidirectional message stream, before it is split for threaded use.
pub struct Transport {
    reader: Box<dyn BufRead + Send>,
    writer: Box<dyn Write + Send>,
    _child: Option<Child>,
}

impl Transport {
    pub fn new(reader: Box<dyn BufRead + Send>, writer: Box<dyn Write + Send>) -> Self {
        Transport { reader, writer, _child: None }
    }

    /// Spawns `cmd args...` and wires its stdin/stdout as the transport.
    pub fn spawn_process(cmd: &str, args: &[String]) -> io::Result<Self> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin: ChildStdin = child.stdin.take().expect("stdin was piped");
        let stdout: ChildStdout = child.stdout.take().expect("stdout was piped");

        Ok(Transport {
            reader: Box::new(BufReader::new(stdout)),
            writer: Box::new(stdin),
            _child: Some(child),
        })
    }

    /// Connects to `host:port` over TCP. The proxy does not spawn the remote process.
    pub fn connect_tcp(host: &str, port: u16) -> io::Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved"))?;
        let stream = TcpStream::connect(addr)?;
        let writer = stream.try_clone()?;
        Ok(Transport {
            reader: Box::new(BufReader::new(stream)),
            writer: Box::new(writer),
            _child: None,
        })
    }

    /// Splits into an owned reader/writer pair. The child process, if any, is kept
    /// alive by the writer half.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        (
            TransportReader { reader: self.reader },
            TransportWriter { writer: self.writer, _child: self._child },
        )
    }

    /// Reads and parses the next message. Blocking.
    pub fn read_message(&mut self) -> Result<Message, ReadError> {
        let text = read_framed(&mut self.reader)?;
        Message::try_parse(&text).map_err(ReadError::Parse)
    }

    /// Serializes and writes a message, framed with a `Content-Length` header.
    pub fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let body = serde_json::to_string(message).expect("Message always serializes");
        write!(self.writer, "Content-Length: {}\r\n\r\n{}", body.len(), body)?;
        self.writer.flush()
    }
}

/// Reads one `Content-Length`-framed message body off `input`.
///
/// An ASCII header block terminated by a blank `\r\n` line, `Content-Length` mandatory,
/// `Content-Type` accepted but ignored.
fn read_framed<R: BufRead>(input: &mut R) -> Result<String, ReadError> {
    let mut size: Option<usize> = None;
    let mut saw_any_header_line = false;
    loop {
        let mut line = String::new();
        let n = input.read_line(&mut line)?;
        if n == 0 {
            if saw_any_header_line {
                return Err(ReadError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF encountered in the middle of reading LSP headers",
                )));
            }
            return Err(ReadError::Eof);
        }

        if line == "\r\n" || line == "\n" {
            break;
        }
        saw_any_header_line = true;

        let mut parts = line.splitn(2, ':');
        let name = parts.next().unwrap_or("").trim().to_ascii_lowercase();
        let value = match parts.next() {
            Some(v) => v.trim(),
            None => {
                return Err(ReadError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("header '{}' is malformed", line.trim_end()),
                )))
            }
        };

        match name.as_str() {
            "content-length" => {
                size = Some(value.parse().map_err(|_| {
                    ReadError::Io(io::Error::new(io::ErrorKind::InvalidData, "bad content-length"))
                })?);
            }
            // Content-Type (and anything else) is accepted but ignored.
            _ => (),
        }
    }

    let size = size.ok_or_else(|| {
        ReadError::Io(io::Error::new(io::ErrorKind::InvalidData, "missing content-length header"))
    })?;

    let mut content = vec![0u8; size];
    input.read_exact(&mut content)?;
    String::from_utf8(content)
        .map_err(|e| ReadError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}
