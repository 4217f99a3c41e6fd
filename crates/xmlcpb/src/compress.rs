//! zlib block framing and the background compressor thread.
//!
//! In file mode the payload is cut into blocks of at most
//! [`ZLIB_BLOCK_SIZE`] bytes. Each block is written as
//!
//! ```text
//! u32 compressed_size      or NO_ZLIB_USED when stored raw
//! u32 uncompressed_size
//! u8  data[..]
//! ```
//!
//! Blocks are independent zlib streams and are written strictly in
//! submission order by a single consumer thread.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::thread::{self, JoinHandle};

use byteorder::{LittleEndian, WriteBytesExt};
use crossbeam_channel::{Receiver, Sender};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use md5::{Digest, Md5};
use tracing::{debug, error};
use xmlcpb_common::BinaryReader;

use crate::format::{NO_ZLIB_USED, ZLIB_BLOCK_SIZE};
use crate::{Error, Result};

/// Compress one block, or `None` if zlib fails or does not make it smaller.
pub(crate) fn compress_block(data: &[u8], level: Compression) -> Option<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), level);
    encoder.write_all(data).ok()?;
    let compressed = encoder.finish().ok()?;
    (compressed.len() < data.len()).then_some(compressed)
}

/// Size of the `{compressed, uncompressed}` header in front of each block.
const BLOCK_HEADER_SIZE: usize = 8;

/// Reassemble a framed block stream into the original payload.
///
/// `expected_size` comes from the file header and is not trusted: it must be
/// reachable with the blocks present, and no block may inflate past
/// [`ZLIB_BLOCK_SIZE`] or past what it declares.
pub(crate) fn decompress_blocks(data: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let deliverable = (data.len() / BLOCK_HEADER_SIZE).saturating_mul(ZLIB_BLOCK_SIZE);
    if expected_size > deliverable {
        return Err(Error::Truncated(format!(
            "header declares {expected_size} payload bytes, {} bytes of blocks hold at most {deliverable}",
            data.len()
        )));
    }

    let mut reader = BinaryReader::new(data);
    let mut payload = Vec::with_capacity(expected_size.min(data.len().saturating_mul(4)));

    while !reader.is_empty() {
        let compressed_size = reader.read_u32()?;
        let uncompressed_size = reader.read_u32()? as usize;

        if uncompressed_size > ZLIB_BLOCK_SIZE {
            return Err(Error::Decompression(format!(
                "block declares {uncompressed_size} bytes, limit is {ZLIB_BLOCK_SIZE}"
            )));
        }
        if payload.len() + uncompressed_size > expected_size {
            return Err(Error::Decompression(format!(
                "blocks exceed the declared payload of {expected_size} bytes"
            )));
        }

        if compressed_size == NO_ZLIB_USED {
            payload.extend_from_slice(reader.read_bytes(uncompressed_size)?);
            continue;
        }

        let compressed = reader.read_bytes(compressed_size as usize)?;
        let start = payload.len();
        ZlibDecoder::new(compressed)
            .take(uncompressed_size as u64 + 1)
            .read_to_end(&mut payload)
            .map_err(|e| Error::Decompression(e.to_string()))?;
        if payload.len() - start != uncompressed_size {
            return Err(Error::Decompression(format!(
                "block inflated to {} bytes, header says {uncompressed_size}",
                payload.len() - start
            )));
        }
    }

    if payload.len() != expected_size {
        return Err(Error::Truncated(format!(
            "payload is {} bytes, header declares {expected_size}",
            payload.len()
        )));
    }
    Ok(payload)
}

/// What the compressor thread hands back once the stream is closed.
#[derive(Debug)]
pub(crate) struct CompressorOutput {
    pub file: File,
    pub md5: Option<[u8; 16]>,
    /// Bytes written after the file header.
    pub bytes_written: u64,
    pub blocks: usize,
    pub raw_blocks: usize,
}

/// Handle to the background compressor of one file-mode session.
///
/// The queue is bounded: [`submit`](Self::submit) blocks while
/// `max_in_flight` blocks are waiting, which keeps memory bounded when the
/// writer produces data faster than it can be compressed.
pub(crate) struct BlockCompressor {
    sender: Option<Sender<Vec<u8>>>,
    handle: Option<JoinHandle<Result<CompressorOutput>>>,
}

impl BlockCompressor {
    /// Start the thread. `file` must be positioned where the first block goes.
    pub fn spawn(file: File, level: u32, max_in_flight: usize, with_md5: bool) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(max_in_flight.max(1));
        let level = Compression::new(level.min(9));
        let handle = thread::Builder::new()
            .name("xmlcpb-compressor".into())
            .spawn(move || run(file, receiver, level, with_md5))?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue data for compression. Blocks while the queue is full.
    pub fn submit(&self, data: Vec<u8>) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let sender = self.sender.as_ref().ok_or(Error::AlreadyFinished)?;
        sender
            .send(data)
            .map_err(|_| Error::Compressor("compressor thread stopped".into()))
    }

    /// Close the queue, wait for every block to be written and take the file back.
    pub fn finish(mut self) -> Result<CompressorOutput> {
        drop(self.sender.take());
        let handle = self.handle.take().ok_or(Error::AlreadyFinished)?;
        handle
            .join()
            .map_err(|_| Error::Compressor("compressor thread panicked".into()))?
    }
}

impl Drop for BlockCompressor {
    fn drop(&mut self) {
        // Abandoned session: let the thread drain and exit, leave the file as is
        drop(self.sender.take());
        if let Some(handle) = self.handle.take() {
            if let Ok(Err(e)) = handle.join() {
                debug!(error = %e, "abandoned compressor stopped with an error");
            }
        }
    }
}

struct BlockSink {
    writer: BufWriter<File>,
    md5: Option<Md5>,
    bytes_written: u64,
    blocks: usize,
    raw_blocks: usize,
}

impl BlockSink {
    fn put(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes)?;
        if let Some(md5) = self.md5.as_mut() {
            md5.update(bytes);
        }
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    fn write_block(&mut self, chunk: &[u8], level: Compression) -> std::io::Result<()> {
        let compressed = compress_block(chunk, level);
        let (size_field, body) = match &compressed {
            Some(data) => (data.len() as u32, data.as_slice()),
            None => {
                self.raw_blocks += 1;
                (NO_ZLIB_USED, chunk)
            }
        };

        let mut block_header = Vec::with_capacity(8);
        block_header.write_u32::<LittleEndian>(size_field)?;
        block_header.write_u32::<LittleEndian>(chunk.len() as u32)?;
        self.put(&block_header)?;
        self.put(body)?;
        self.blocks += 1;
        Ok(())
    }
}

fn run(
    file: File,
    receiver: Receiver<Vec<u8>>,
    level: Compression,
    with_md5: bool,
) -> Result<CompressorOutput> {
    let mut sink = BlockSink {
        writer: BufWriter::new(file),
        md5: with_md5.then(Md5::new),
        bytes_written: 0,
        blocks: 0,
        raw_blocks: 0,
    };

    for data in receiver.iter() {
        for chunk in data.chunks(ZLIB_BLOCK_SIZE) {
            if let Err(e) = sink.write_block(chunk, level) {
                error!(error = %e, "compressor failed to write block");
                return Err(e.into());
            }
        }
    }

    let file = sink.writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    debug!(
        blocks = sink.blocks,
        raw_blocks = sink.raw_blocks,
        bytes = sink.bytes_written,
        "compressor finished"
    );
    Ok(CompressorOutput {
        file,
        md5: sink.md5.map(|md5| md5.finalize().into()),
        bytes_written: sink.bytes_written,
        blocks: sink.blocks,
        raw_blocks: sink.raw_blocks,
    })
}
