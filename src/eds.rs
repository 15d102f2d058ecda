//! The elastic-degenerate string value type and its textual formats.
//!
//! An EDS is an ordered sequence of symbols, each symbol a non-empty list of
//! alternative strings. Two encodings are accepted on input: the full form
//! `{ACGT}{A,ACA}{CGT}` and the compact form `ACGT{A,ACA}CGT` where
//! non-degenerate symbols are written bare. Whitespace is ignored.
//!
//! Storage comes in two modes: [`StorageMode::Full`] keeps every alternative
//! in memory; [`StorageMode::MetadataOnly`] keeps only the navigation index
//! plus a seekable handle on the backing file, re-parsing symbols on demand.

mod merge;
mod query;

pub(crate) use merge::merge_symbol_pair;

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader, Read as _, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::errors::{Error, Result};
use crate::metadata::{Metadata, Statistics};
use crate::sources::{self, SourceSet};
use crate::types::{SET_CLOSE, SET_OPEN, SET_SEPARATOR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// All alternatives in memory.
    Full,
    /// Navigation index only; alternatives are streamed from the backing
    /// file on demand.
    MetadataOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Brackets on every symbol: `{ACGT}{A,ACA}{CGT}`.
    Full,
    /// Brackets only on degenerate symbols: `ACGT{A,ACA}CGT`.
    #[default]
    Compact,
}

enum Storage {
    Full(Vec<Vec<String>>),
    MetadataOnly {
        path: PathBuf,
        reader: RefCell<BufReader<File>>,
    },
}

/// An elastic-degenerate string with its navigation metadata and optional
/// path-provenance sets.
///
/// Transforms are pure: they leave `self` untouched and return fresh owned
/// values. An `Eds` holding a file handle is movable but not clonable.
pub struct Eds {
    metadata: Metadata,
    storage: Storage,
    sources: Option<Vec<SourceSet>>,
    total_chars: usize,
}

impl Eds {
    // ----- construction -------------------------------------------------

    /// Parse an EDS from text (full storage).
    pub fn from_text(text: &str) -> Result<Self> {
        let parsed = parse_stream(text.as_bytes(), true, "<memory>")?;
        Ok(Eds {
            metadata: parsed.metadata,
            storage: Storage::Full(parsed.sets.unwrap()),
            sources: None,
            total_chars: parsed.total_chars,
        })
    }

    /// Parse an EDS and its flat sources from text (full storage).
    pub fn from_text_with_sources(eds_text: &str, seds_text: &str) -> Result<Self> {
        let mut eds = Self::from_text(eds_text)?;
        eds.attach_sources(seds_text)?;
        Ok(eds)
    }

    /// Load an EDS from a file in the requested storage mode. In
    /// [`StorageMode::MetadataOnly`] the file handle is retained for
    /// on-demand symbol reads.
    pub fn load(path: impl AsRef<Path>, mode: StorageMode) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut reader = BufReader::new(file);

        match mode {
            StorageMode::Full => {
                let mut text = String::new();
                reader
                    .read_to_string(&mut text)
                    .map_err(|e| Error::io(path, e))?;
                Self::from_text(&text)
            }
            StorageMode::MetadataOnly => {
                let label = path.display().to_string();
                let parsed = parse_stream(&mut reader, false, &label)?;
                Ok(Eds {
                    metadata: parsed.metadata,
                    storage: Storage::MetadataOnly {
                        path: path.to_owned(),
                        reader: RefCell::new(reader),
                    },
                    sources: None,
                    total_chars: parsed.total_chars,
                })
            }
        }
    }

    /// Load an EDS together with a sibling sEDS file.
    pub fn load_with_sources(
        eds_path: impl AsRef<Path>,
        seds_path: impl AsRef<Path>,
        mode: StorageMode,
    ) -> Result<Self> {
        let mut eds = Self::load(eds_path, mode)?;
        eds.attach_sources_from_file(seds_path)?;
        Ok(eds)
    }

    /// Build a full-storage EDS directly from its alternative lists.
    pub(crate) fn from_parts(
        sets: Vec<Vec<String>>,
        sources: Option<Vec<SourceSet>>,
    ) -> Result<Self> {
        let mut metadata = Metadata::default();
        let mut total_chars = 0;
        let mut m = 0;

        for set in &sets {
            if set.is_empty() {
                return Err(Error::format(0, "symbol with no alternatives"));
            }
            metadata.symbol_sizes.push(set.len());
            metadata.cum_set_sizes.push(m);
            metadata.is_degenerate.push(set.len() > 1);
            for alt in set {
                metadata.string_lengths.push(alt.len());
                total_chars += alt.len();
            }
            m += set.len();
        }
        metadata.finalize();

        let mut eds = Eds {
            metadata,
            storage: Storage::Full(sets),
            sources: None,
            total_chars,
        };
        if let Some(sets) = sources {
            eds.set_sources(sets)?;
        }
        Ok(eds)
    }

    // ----- sources ------------------------------------------------------

    /// Attach sources parsed from flat sEDS text. Sources attach exactly
    /// once; a second attachment is an error.
    pub fn attach_sources(&mut self, seds_text: &str) -> Result<()> {
        let sets = sources::parse_sources(seds_text, self.cardinality())?;
        self.set_sources(sets)
    }

    /// Attach sources from an sEDS file.
    pub fn attach_sources_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        self.attach_sources(&text)
    }

    fn set_sources(&mut self, sets: Vec<SourceSet>) -> Result<()> {
        if self.sources.is_some() {
            return Err(Error::argument("sources are already attached"));
        }
        if sets.len() != self.cardinality() {
            return Err(Error::CardinalityMismatch {
                found: sets.len(),
                expected: self.cardinality(),
            });
        }
        if let Some(idx) = sets.iter().position(|s| s.is_empty()) {
            return Err(Error::EmptyPathSet { string_id: idx });
        }
        self.sources = Some(sets);
        Ok(())
    }

    // ----- accessors ----------------------------------------------------

    /// Number of symbols `n`.
    pub fn len(&self) -> usize {
        self.metadata.symbol_sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of alternatives `m`.
    pub fn cardinality(&self) -> usize {
        self.metadata.string_lengths.len()
    }

    /// Total number of characters `N`.
    pub fn total_chars(&self) -> usize {
        self.total_chars
    }

    pub fn mode(&self) -> StorageMode {
        match self.storage {
            Storage::Full(_) => StorageMode::Full,
            Storage::MetadataOnly { .. } => StorageMode::MetadataOnly,
        }
    }

    pub fn has_sources(&self) -> bool {
        self.sources.is_some()
    }

    pub fn sources(&self) -> Option<&[SourceSet]> {
        self.sources.as_deref()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_degenerate(&self, pos: usize) -> Result<bool> {
        self.check_symbol_index(pos)?;
        Ok(self.metadata.is_degenerate[pos])
    }

    pub fn symbol_size(&self, pos: usize) -> Result<usize> {
        self.check_symbol_index(pos)?;
        Ok(self.metadata.symbol_sizes[pos])
    }

    /// Length of the `string_id`-th global alternative.
    pub fn string_length(&self, string_id: usize) -> Result<usize> {
        if string_id >= self.cardinality() {
            return Err(Error::OutOfRange {
                what: "string id",
                value: string_id,
                bound: self.cardinality(),
            });
        }
        Ok(self.metadata.string_lengths[string_id])
    }

    /// All alternative lists. Full storage only.
    pub fn sets(&self) -> Result<&[Vec<String>]> {
        match &self.storage {
            Storage::Full(sets) => Ok(sets),
            Storage::MetadataOnly { .. } => Err(Error::ModeUnsupported {
                op: "sets",
                required: "full",
            }),
        }
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::compute(&self.metadata, self.total_chars, self.sources())
    }

    pub(crate) fn check_symbol_index(&self, pos: usize) -> Result<()> {
        if pos >= self.len() {
            return Err(Error::OutOfRange {
                what: "symbol index",
                value: pos,
                bound: self.len(),
            });
        }
        Ok(())
    }

    // ----- symbol access ------------------------------------------------

    /// Read one symbol by value. Works in both storage modes; in
    /// metadata-only mode the symbol is re-parsed from the backing file.
    pub fn read_symbol(&self, pos: usize) -> Result<Vec<String>> {
        self.check_symbol_index(pos)?;
        match &self.storage {
            Storage::Full(sets) => Ok(sets[pos].clone()),
            Storage::MetadataOnly { path, reader } => {
                let mut reader = reader.borrow_mut();
                reader
                    .seek(SeekFrom::Start(self.metadata.base_offsets[pos]))
                    .map_err(|e| Error::io(path, e))?;
                read_one_symbol(&mut *reader, path)
            }
        }
    }

    /// Lazy, restartable iteration over symbols in order. Each item is
    /// produced by [`Eds::read_symbol`], so metadata-only storage re-seeks
    /// per symbol.
    pub fn symbols(&self) -> Symbols<'_> {
        Symbols { eds: self, pos: 0 }
    }

    // ----- serialization ------------------------------------------------

    /// Write the EDS text. Full storage only.
    pub fn save(&self, w: &mut dyn Write, format: OutputFormat) -> Result<()> {
        let sets = match &self.storage {
            Storage::Full(sets) => sets,
            Storage::MetadataOnly { .. } => {
                return Err(Error::ModeUnsupported {
                    op: "save",
                    required: "full",
                })
            }
        };

        let mut write = || -> std::io::Result<()> {
            for (i, set) in sets.iter().enumerate() {
                let brackets = format == OutputFormat::Full || self.metadata.is_degenerate[i];
                if brackets {
                    w.write_all(&[SET_OPEN])?;
                }
                for (j, alt) in set.iter().enumerate() {
                    if j > 0 {
                        w.write_all(&[SET_SEPARATOR])?;
                    }
                    w.write_all(alt.as_bytes())?;
                }
                if brackets {
                    w.write_all(&[SET_CLOSE])?;
                }
            }
            w.write_all(b"\n")
        };
        write().map_err(|e| Error::io("<writer>", e))
    }

    /// Serialize to a `String` in the given format (without the trailing
    /// newline a file save ends with).
    pub fn to_text(&self, format: OutputFormat) -> Result<String> {
        let mut buf = Vec::new();
        self.save(&mut buf, format)?;
        let mut text = String::from_utf8(buf).expect("EDS text is valid UTF-8");
        text.truncate(text.trim_end().len());
        Ok(text)
    }

    /// Save to a file; a `.gz` suffix selects gzip compression.
    pub fn save_to_path(&self, path: impl AsRef<Path>, format: OutputFormat) -> Result<()> {
        let path = path.as_ref();
        let mut w = create_writer(path)?;
        self.save(&mut w, format)?;
        w.flush().map_err(|e| Error::io(path, e))
    }

    /// Write the attached sources in the flat sEDS form.
    pub fn save_sources(&self, w: &mut dyn Write) -> Result<()> {
        let Some(sources) = &self.sources else {
            return Err(Error::argument("no sources attached"));
        };
        w.write_all(sources::format_sources(sources).as_bytes())
            .and_then(|_| w.write_all(b"\n"))
            .map_err(|e| Error::io("<writer>", e))
    }

    pub fn save_sources_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut w = create_writer(path)?;
        self.save_sources(&mut w)?;
        w.flush().map_err(|e| Error::io(path, e))
    }
}

/// Iterator returned by [`Eds::symbols`].
pub struct Symbols<'a> {
    eds: &'a Eds,
    pos: usize,
}

impl Iterator for Symbols<'_> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.eds.len() {
            return None;
        }
        let item = self.eds.read_symbol(self.pos);
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.eds.len() - self.pos;
        (rest, Some(rest))
    }
}

/// Open a buffered writer for `path`; `.gz` selects gzip output.
pub(crate) fn create_writer(path: &Path) -> Result<Box<dyn Write>> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(std::io::BufWriter::new(GzEncoder::new(
            file,
            Compression::default(),
        ))))
    } else {
        Ok(Box::new(std::io::BufWriter::new(file)))
    }
}

// ----- parsing ----------------------------------------------------------

struct ParsedText {
    metadata: Metadata,
    sets: Option<Vec<Vec<String>>>,
    total_chars: usize,
}

struct SymbolBuilder {
    offset: u64,
    braced: bool,
    alts: Vec<String>,
    lens: Vec<usize>,
    cur: Vec<u8>,
    cur_len: usize,
    separators: usize,
    chars: usize,
}

impl SymbolBuilder {
    fn new(offset: u64, braced: bool) -> Self {
        SymbolBuilder {
            offset,
            braced,
            alts: Vec::new(),
            lens: Vec::new(),
            cur: Vec::new(),
            cur_len: 0,
            separators: 0,
            chars: 0,
        }
    }

    fn push_char(&mut self, b: u8, collect: bool) {
        if collect {
            self.cur.push(b);
        }
        self.cur_len += 1;
        self.chars += 1;
    }

    fn end_alternative(&mut self, collect: bool) -> Result<()> {
        self.lens.push(self.cur_len);
        self.cur_len = 0;
        if collect {
            let alt = String::from_utf8(std::mem::take(&mut self.cur))
                .map_err(|_| Error::format(self.offset as usize, "alternative is not valid UTF-8"))?;
            self.alts.push(alt);
        }
        Ok(())
    }
}

/// Streaming parser over raw bytes, shared by the in-memory and the
/// metadata-only paths. Offsets are raw byte positions in the input, so a
/// retained file handle can seek straight back to any symbol, compact or
/// bracketed. Whitespace is ignored everywhere.
fn parse_stream(mut reader: impl BufRead, collect: bool, file: &str) -> Result<ParsedText> {
    let mut metadata = Metadata::default();
    let mut sets = collect.then(Vec::new);
    let mut total_chars = 0usize;
    let mut m = 0usize;
    let mut cur: Option<SymbolBuilder> = None;
    let mut offset = 0u64;

    let mut close_symbol =
        |sym: SymbolBuilder, metadata: &mut Metadata, sets: &mut Option<Vec<Vec<String>>>| {
            if sym.braced && sym.separators == 0 && sym.chars == 0 {
                return Err(Error::format(sym.offset as usize, "empty symbol"));
            }
            metadata.base_offsets.push(sym.offset);
            metadata.symbol_sizes.push(sym.lens.len());
            metadata.cum_set_sizes.push(m);
            metadata.is_degenerate.push(sym.lens.len() > 1);
            m += sym.lens.len();
            total_chars += sym.lens.iter().sum::<usize>();
            metadata.string_lengths.extend_from_slice(&sym.lens);
            if let Some(sets) = sets {
                sets.push(sym.alts);
            }
            Ok(())
        };

    loop {
        let buf = reader.fill_buf().map_err(|e| Error::io(file, e))?;
        if buf.is_empty() {
            break;
        }
        let len = buf.len();
        for i in 0..len {
            let b = buf[i];
            let pos = offset + i as u64;
            if b.is_ascii_whitespace() {
                continue;
            }
            match &mut cur {
                None => match b {
                    SET_OPEN => cur = Some(SymbolBuilder::new(pos, true)),
                    SET_CLOSE => {
                        return Err(Error::format(pos as usize, "unexpected '}'"));
                    }
                    SET_SEPARATOR => {
                        // a bare run may start on a separator: {,A}-style
                        // compact input such as ",A" opens with an empty
                        // alternative
                        let mut sym = SymbolBuilder::new(pos, false);
                        sym.end_alternative(collect)?;
                        sym.separators += 1;
                        cur = Some(sym);
                    }
                    c => {
                        let mut sym = SymbolBuilder::new(pos, false);
                        sym.push_char(c, collect);
                        cur = Some(sym);
                    }
                },
                Some(sym) if sym.braced => match b {
                    SET_OPEN => {
                        return Err(Error::format(pos as usize, "nested '{' inside a symbol"));
                    }
                    SET_CLOSE => {
                        sym.end_alternative(collect)?;
                        let sym = cur.take().unwrap();
                        close_symbol(sym, &mut metadata, &mut sets)?;
                    }
                    SET_SEPARATOR => {
                        sym.separators += 1;
                        sym.end_alternative(collect)?;
                    }
                    c => sym.push_char(c, collect),
                },
                Some(sym) => match b {
                    SET_OPEN => {
                        sym.end_alternative(collect)?;
                        let sym = cur.take().unwrap();
                        close_symbol(sym, &mut metadata, &mut sets)?;
                        cur = Some(SymbolBuilder::new(pos, true));
                    }
                    SET_CLOSE => {
                        return Err(Error::format(pos as usize, "unexpected '}'"));
                    }
                    SET_SEPARATOR => {
                        sym.separators += 1;
                        sym.end_alternative(collect)?;
                    }
                    c => sym.push_char(c, collect),
                },
            }
        }
        offset += len as u64;
        reader.consume(len);
    }

    if let Some(sym) = cur.take() {
        if sym.braced {
            return Err(Error::format(offset as usize, "missing '}'"));
        }
        let mut sym = sym;
        sym.end_alternative(collect)?;
        close_symbol(sym, &mut metadata, &mut sets)?;
    }

    metadata.finalize();
    Ok(ParsedText {
        metadata,
        sets,
        total_chars,
    })
}

/// Parse a single symbol at the reader's current position. Used by
/// metadata-only symbol reads after seeking to a recorded base offset.
fn read_one_symbol(reader: &mut impl BufRead, path: &Path) -> Result<Vec<String>> {
    let mut alts = Vec::new();
    let mut cur: Vec<u8> = Vec::new();
    let mut braced: Option<bool> = None;

    fn finish_alt(cur: &mut Vec<u8>, alts: &mut Vec<String>) -> Result<()> {
        let alt = String::from_utf8(std::mem::take(cur))
            .map_err(|_| Error::format(0, "alternative is not valid UTF-8"))?;
        alts.push(alt);
        Ok(())
    }

    for b in reader.bytes() {
        let b = b.map_err(|e| Error::io(path, e))?;
        if b.is_ascii_whitespace() {
            continue;
        }
        match (braced, b) {
            (None, SET_OPEN) => braced = Some(true),
            (None, SET_SEPARATOR) => {
                braced = Some(false);
                alts.push(String::new());
            }
            (None, _) => {
                braced = Some(false);
                cur.push(b);
            }
            (Some(true), SET_CLOSE) => {
                finish_alt(&mut cur, &mut alts)?;
                return Ok(alts);
            }
            (Some(false), SET_OPEN) | (Some(false), SET_CLOSE) => break,
            (_, SET_SEPARATOR) => finish_alt(&mut cur, &mut alts)?,
            (Some(true), SET_OPEN) => {
                return Err(Error::format(0, "nested '{' inside a symbol"));
            }
            (_, c) => cur.push(c),
        }
    }

    // bare run terminated by '{', '}', or end of file
    finish_alt(&mut cur, &mut alts)?;
    Ok(alts)
}
