//! Random access over a single-contig FASTA reference.

use std::io::{BufRead, Read, Seek, SeekFrom};

use memchr::memchr2;

use crate::errors::{Error, Result};

/// Index of a FASTA reference: everything needed for byte-offset reads that
/// skip the embedded newlines.
#[derive(Debug, Clone)]
pub struct FastaIndex {
    pub name: String,
    pub len: usize,
    pub line_width: usize,
    pub seq_start: u64,
}

/// Scan a FASTA stream once, recording the sequence name, total length,
/// line width, and the offset of the first sequence byte.
pub fn index_fasta<R: BufRead + Seek>(reader: &mut R) -> Result<FastaIndex> {
    let mut header = String::new();
    reader
        .read_line(&mut header)
        .map_err(|e| Error::io("<fasta>", e))?;
    if !header.starts_with('>') {
        return Err(Error::format(0, "expected FASTA header line starting with '>'"));
    }
    let name = header[1..]
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string();

    let seq_start = reader
        .stream_position()
        .map_err(|e| Error::io("<fasta>", e))?;

    let mut line = String::new();
    let mut line_width = 0;
    let mut len = 0;
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| Error::io("<fasta>", e))?;
        if n == 0 {
            break;
        }
        let data = line.trim_end();
        if data.is_empty() {
            continue;
        }
        if data.starts_with('>') {
            break;
        }
        if line_width == 0 {
            line_width = data.len();
        }
        len += data.len();
    }
    if line_width == 0 {
        return Err(Error::format(seq_start as usize, "FASTA has no sequence data"));
    }

    Ok(FastaIndex {
        name,
        len,
        line_width,
        seq_start,
    })
}

/// Read `[start, start + len)` of the reference, skipping newlines. Reads
/// past the end of the sequence are clipped.
pub fn read_fasta_region<R: BufRead + Seek>(
    reader: &mut R,
    index: &FastaIndex,
    start: usize,
    len: usize,
) -> Result<String> {
    if start >= index.len {
        return Ok(String::new());
    }
    let len = len.min(index.len - start);
    let offset = index.seq_start + (start + start / index.line_width) as u64;
    reader
        .seek(SeekFrom::Start(offset))
        .map_err(|e| Error::io("<fasta>", e))?;

    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 4096];
    while out.len() < len {
        let n = reader.read(&mut buf).map_err(|e| Error::io("<fasta>", e))?;
        if n == 0 {
            break;
        }
        let mut chunk = &buf[..n];
        while !chunk.is_empty() && out.len() < len {
            let (run, rest) = match memchr2(b'\n', b'\r', chunk) {
                Some(idx) => (&chunk[..idx], &chunk[idx + 1..]),
                None => (chunk, &[][..]),
            };
            let take = run.len().min(len - out.len());
            let text = std::str::from_utf8(&run[..take])
                .map_err(|_| Error::format(0, "reference is not valid UTF-8"))?;
            out.push_str(text);
            chunk = rest;
        }
    }
    Ok(out)
}
