// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum SinkError {
    /// The reader went away. Ends the stream cleanly.
    #[error("sink closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Destination for rendered request lines.
pub trait LineSink {
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError>;
}

/// Writes lines to any async writer, flushing after each one. A broken pipe
/// is reported as [`SinkError::Closed`].
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> LineSink for WriterSink<W>
where
    W: AsyncWrite + Unpin,
{
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let res = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await
        }
        .await;
        match res {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Err(SinkError::Closed),
            Err(e) => Err(SinkError::Io(e)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    use tokio::io::AsyncWrite;

    use super::{LineSink, SinkError, WriterSink};

    struct FailingWriter(io::ErrorKind);

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(self.0.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn writes_lines_verbatim() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_line("a\n").await.unwrap();
        sink.write_line("b\n").await.unwrap();
        assert_eq!(sink.into_inner(), b"a\nb\n");
    }

    #[tokio::test]
    async fn broken_pipe_is_end_of_stream() {
        let mut sink = WriterSink::new(FailingWriter(io::ErrorKind::BrokenPipe));
        assert!(matches!(sink.write_line("x\n").await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn other_errors_propagate() {
        let mut sink = WriterSink::new(FailingWriter(io::ErrorKind::PermissionDenied));
        match sink.write_line("x\n").await {
            Err(SinkError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
