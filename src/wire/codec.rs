use super::{SensorReading, RECORD_LEN};
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors while reading or decoding wire records
#[derive(Debug)]
pub enum WireError {
    UnknownCategory(String),
    UnterminatedCategory,
    /// Stream ended part-way through a record
    Truncated { read: usize },
    Io(io::Error),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::UnknownCategory(name) => write!(f, "unknown sensor category '{}'", name),
            WireError::UnterminatedCategory => {
                write!(f, "category field is not NUL-terminated")
            }
            WireError::Truncated { read } => {
                write!(f, "record truncated after {} of {} bytes", read, RECORD_LEN)
            }
            WireError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WireError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        WireError::Io(e)
    }
}

impl WireError {
    /// True when the stream itself is unusable (as opposed to one bad record)
    pub fn is_fatal(&self) -> bool {
        matches!(self, WireError::Truncated { .. } | WireError::Io(_))
    }
}

/// Read exactly one record from a byte stream.
///
/// A single `read` call may return any prefix of a record, so this keeps
/// reading until the full record has arrived. Returns `Ok(None)` when the
/// peer closes the stream on a record boundary.
pub async fn read_record<R>(reader: &mut R) -> Result<Option<SensorReading>, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; RECORD_LEN];
    let mut filled = 0;

    while filled < RECORD_LEN {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(WireError::Truncated { read: filled });
        }
        filled += n;
    }

    SensorReading::decode(&buf).map(Some)
}

/// Write one full record and flush it
pub async fn write_record<W>(writer: &mut W, reading: &SensorReading) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(&reading.encode()).await?;
    writer.flush().await
}
