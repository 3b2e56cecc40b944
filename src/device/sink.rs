//! Event sink
//!
//! Writes one fixed-size `input_event` record per call. A short write is an
//! error: a dropped key or sync record corrupts the host's view of the
//! keyboard, so it is reported and never retried.

use std::io::Write;

use crate::input::{DeviceError, DeviceResult, EventKind, EventRecord};

pub struct EventSink<W: Write> {
    writer: W,
}

impl<W: Write> EventSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn emit(&mut self, kind: EventKind, code: u16, value: i32) -> DeviceResult<()> {
        self.write_record(&EventRecord { kind, code, value })
    }

    pub fn write_record(&mut self, record: &EventRecord) -> DeviceResult<()> {
        let bytes = record.encode();
        let written = self.writer.write(&bytes)?;
        if written != bytes.len() {
            tracing::error!(
                "partial write of {}: {} vs {} bytes",
                record,
                written,
                bytes.len()
            );
            return Err(DeviceError::PartialWrite {
                written,
                expected: bytes.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::EVENT_RECORD_SIZE;
    use std::io;

    /// Accepts at most `limit` bytes per write
    struct Stingy {
        limit: usize,
        data: Vec<u8>,
        calls: usize,
    }

    impl Write for Stingy {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            let n = buf.len().min(self.limit);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_emit_writes_one_record() {
        let mut buf = Vec::new();
        EventSink::new(&mut buf).emit(EventKind::Key, 30, 1).unwrap();
        assert_eq!(buf.len(), EVENT_RECORD_SIZE);
        let record = EventRecord::decode(&buf).unwrap();
        assert_eq!(record.code, 30);
        assert_eq!(record.value, 1);
    }

    #[test]
    fn test_partial_write_is_reported() {
        let mut writer = Stingy {
            limit: 4,
            data: Vec::new(),
            calls: 0,
        };
        let result = EventSink::new(&mut writer).emit(EventKind::Sync, 0, 0);
        match result {
            Err(DeviceError::PartialWrite { written, expected }) => {
                assert_eq!(written, 4);
                assert_eq!(expected, EVENT_RECORD_SIZE);
            }
            other => panic!("Expected PartialWrite, got {:?}", other),
        }
        // No retry.
        assert_eq!(writer.calls, 1);
        assert_eq!(writer.data.len(), 4);
    }
}
