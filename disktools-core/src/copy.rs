//! The block streaming loop shared by every transfer direction.
//!
//! A single [`StreamCopier`] moves fixed-size blocks from a [`Source`] to a
//! [`Sink`] within the bounds of a planned [`ByteRange`]. The source and sink
//! kinds are picked once per invocation; the loop itself does not care which
//! utility is driving it.
use crate::error::{Error, Result, Warning};
use crate::handle::DeviceHandle;
use crate::plan::ByteRange;
use crate::progress::ProgressSample;
use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// 64 KiB is the de facto block size for sequential raw disk I/O.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
/// Emit a progress sample every this many blocks.
pub const DEFAULT_PROGRESS_EVERY: u64 = 25;

/// Tunables for a transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferOptions {
    pub block_size: usize,
    pub progress_every: u64,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

/// Where blocks come from.
pub enum Source<'a> {
    /// A device handle or file, read sequentially from its current position.
    Stream(&'a mut dyn Read),
    /// Synthesized zero blocks, bounded by the planned range.
    Zero,
}

/// Where blocks go.
pub enum Sink<'a> {
    /// An output file. Truncated to the bytes written when a ceiling is set,
    /// then synced.
    File(&'a mut File),
    /// A raw device. Its write buffers are flushed before completion.
    Device(&'a mut DeviceHandle),
    /// Any other writer; only flushed.
    #[doc(hidden)]
    Stream(&'a mut dyn Write),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Copying,
    Done,
    Failed,
}

/// Outcome of a completed transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferReport {
    pub range: ByteRange,
    pub bytes_transferred: u64,
    pub warnings: Vec<Warning>,
}

/// Per-transfer state. The block buffer lives exactly as long as one run.
struct TransferState {
    transferred: u64,
    blocks: u64,
    buffer: Vec<u8>,
}

pub struct StreamCopier {
    options: TransferOptions,
    phase: Phase,
}

impl StreamCopier {
    pub fn new(options: TransferOptions) -> Self {
        Self {
            options,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs the transfer to completion.
    ///
    /// `running` is checked once per block; clearing it stops the transfer
    /// between blocks with [`Error::Cancelled`]. Bytes already written stay
    /// written. `on_progress` is called on the first block and then every
    /// `progress_every` blocks.
    pub fn run<F>(
        &mut self,
        source: Source<'_>,
        sink: Sink<'_>,
        range: &ByteRange,
        running: &AtomicBool,
        on_progress: F,
    ) -> Result<TransferReport>
    where
        F: FnMut(&ProgressSample),
    {
        self.phase = Phase::Copying;
        let result = self.copy(source, sink, range, running, on_progress);
        self.phase = match result {
            Ok(_) => Phase::Done,
            Err(_) => Phase::Failed,
        };
        result
    }

    fn copy<F>(
        &self,
        mut source: Source<'_>,
        mut sink: Sink<'_>,
        range: &ByteRange,
        running: &AtomicBool,
        mut on_progress: F,
    ) -> Result<TransferReport>
    where
        F: FnMut(&ProgressSample),
    {
        let block_size = self.options.block_size.max(1);
        let every = self.options.progress_every.max(1);

        // A zero source has no natural end, so it is always bounded.
        let ceiling = match source {
            Source::Zero => Some(range.limit.unwrap_or(range.length)),
            Source::Stream(_) => range.limit,
        };
        let expected = ceiling.unwrap_or(range.length);

        let mut state = TransferState {
            transferred: 0,
            blocks: 0,
            buffer: vec![0u8; block_size],
        };

        loop {
            let remaining = ceiling.map(|c| c.saturating_sub(state.transferred));
            if remaining == Some(0) {
                break;
            }
            if !running.load(Ordering::SeqCst) {
                // Only the end-of-source read is left; the plan is already met.
                if expected > 0 && state.transferred >= expected {
                    break;
                }
                return Err(Error::Cancelled);
            }
            let want = remaining.map_or(block_size, |r| r.min(block_size as u64) as usize);

            let got = match &mut source {
                Source::Zero => want,
                Source::Stream(reader) => {
                    let tail = (range.length > 0)
                        .then(|| range.length.saturating_sub(state.transferred));
                    read_block(
                        &mut **reader,
                        &mut state.buffer[..want],
                        tail,
                        state.transferred,
                    )?
                }
            };
            if got == 0 {
                break;
            }

            write_block(&mut sink, &state.buffer[..got]).map_err(|source| Error::TransferIo {
                stage: "writing",
                transferred: state.transferred,
                source,
            })?;

            state.transferred += got as u64;
            state.blocks += 1;
            if (state.blocks - 1) % every == 0 {
                on_progress(&ProgressSample {
                    block_bytes: got as u64,
                    transferred: state.transferred,
                    planned: expected,
                });
            }
        }

        finish(&mut sink, ceiling.is_some(), state.transferred).map_err(|source| {
            Error::TransferIo {
                stage: "finalizing",
                transferred: state.transferred,
                source,
            }
        })?;
        debug!(
            bytes = state.transferred,
            blocks = state.blocks,
            "transfer loop finished"
        );

        let mut warnings = Vec::new();
        if expected > 0 && state.transferred != expected {
            let warning = Warning::SizeMismatch {
                expected,
                actual: state.transferred,
            };
            warn!("{warning}");
            warnings.push(warning);
        }

        Ok(TransferReport {
            range: *range,
            bytes_transferred: state.transferred,
            warnings,
        })
    }
}

/// Reads until `buf` is full or the source is exhausted.
///
/// An error after some bytes were read ends the fill early; the error
/// resurfaces on the next call.
fn fill(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if filled > 0 => {
                debug!("short read of {filled} bytes: {e}");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads one block.
///
/// Raw devices reject a read that crosses the end of the media instead of
/// returning a short count. When that happens within the last block of the
/// planned range, the read is retried once, clamped to the bytes left.
fn read_block(
    reader: &mut dyn Read,
    buf: &mut [u8],
    tail: Option<u64>,
    transferred: u64,
) -> Result<usize> {
    let io_err = |source| Error::TransferIo {
        stage: "reading",
        transferred,
        source,
    };

    match fill(reader, buf) {
        Ok(n) => Ok(n),
        Err(e) => match tail {
            Some(0) => {
                debug!("read at end of range failed ({e}); treating as end of source");
                Ok(0)
            }
            Some(left) if left < buf.len() as u64 => {
                debug!("read crossing end of range failed ({e}); retrying with {left} bytes");
                fill(reader, &mut buf[..left as usize]).map_err(io_err)
            }
            _ => Err(io_err(e)),
        },
    }
}

fn write_block(sink: &mut Sink<'_>, block: &[u8]) -> io::Result<()> {
    match sink {
        Sink::File(file) => file.write_all(block),
        Sink::Device(device) => device.write_all(block),
        Sink::Stream(writer) => writer.write_all(block),
    }
}

fn finish(sink: &mut Sink<'_>, has_ceiling: bool, transferred: u64) -> io::Result<()> {
    match sink {
        Sink::File(file) => {
            file.flush()?;
            if has_ceiling {
                file.set_len(transferred)?;
            }
            file.sync_all()
        }
        Sink::Device(device) => device.sync(),
        Sink::Stream(writer) => writer.flush(),
    }
}
