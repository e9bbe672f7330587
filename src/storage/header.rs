//! File header - tree-wide metadata at offset 0.
//!
//! # Layout
//! ```text
//! FILE_TYPE=blocked sequence set with index
//! VERSION=2.0
//! HEADER_RECORD_SIZE=512
//! ...
//! STALE=false
//! END
//! <spaces up to HEADER_RECORD_SIZE - 1>\n
//! ```
//!
//! Keys are always written in the same order. An unknown key or a line
//! without `=` is a hard parse failure.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};

use crate::common::config::{FILE_TYPE, FORMAT_VERSION, RECORD_SIZE_DIGITS};
use crate::common::{BlockLayout, Error, Rbn, Result, TreeConfig};

const TERMINATOR: &str = "END";
const DEFAULT_SIZE_FORMAT: &str = "ASCII";
const DEFAULT_FIELDS_TYPE: &str = "STRING";

/// Parsed header of a tree file.
///
/// The tree driver is the only owner of the mutable fields (counts, list
/// heads, staleness); everything else is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub file_type: String,
    pub version: String,
    /// Bytes reserved for the header; block data starts here.
    pub header_size: usize,
    pub size_digits: usize,
    pub size_format: String,
    pub block_size: usize,
    pub minimum_block_capacity: usize,
    /// Live records in the tree.
    pub record_count: u64,
    /// Highest RBN ever allocated.
    pub block_count: u32,
    pub field_count: usize,
    pub fields_type: String,
    pub record_format: String,
    /// 1-based index of the key field.
    pub primary_key: usize,
    /// Head of the free list (`RBN_AVAIL`).
    pub free_list_head: Option<Rbn>,
    /// Leftmost leaf of the sequence set (`RBN_ACTIVE`).
    pub sequence_head: Rbn,
    /// `true` while an operation is in flight.
    pub stale: bool,
}

impl FileHeader {
    /// Header for a freshly created file: one empty root leaf, no records.
    pub fn new(config: &TreeConfig) -> Self {
        Self {
            file_type: FILE_TYPE.to_string(),
            version: FORMAT_VERSION.to_string(),
            header_size: config.header_size,
            size_digits: RECORD_SIZE_DIGITS,
            size_format: DEFAULT_SIZE_FORMAT.to_string(),
            block_size: config.block_size,
            minimum_block_capacity: config.minimum_block_capacity,
            record_count: 0,
            block_count: 1,
            field_count: config.field_count(),
            fields_type: DEFAULT_FIELDS_TYPE.to_string(),
            record_format: config.record_format.clone(),
            primary_key: config.primary_key,
            free_list_head: None,
            sequence_head: Rbn::ROOT,
            stale: false,
        }
    }

    /// Geometry for the codecs; `order` is not stored in the header.
    pub fn layout(&self, order: usize) -> BlockLayout {
        BlockLayout {
            header_size: self.header_size as u64,
            block_size: self.block_size,
            minimum_capacity: self.minimum_block_capacity,
            order,
            key_field: self.primary_key.saturating_sub(1),
            size_digits: self.size_digits,
        }
    }

    /// First never-used RBN.
    #[inline]
    pub fn next_new_rbn(&self) -> Rbn {
        Rbn::new(self.block_count.saturating_add(1))
    }

    fn text(&self) -> String {
        let mut text = String::new();
        let mut line = |key: &str, value: &dyn std::fmt::Display| {
            text.push_str(key);
            text.push('=');
            text.push_str(&value.to_string());
            text.push('\n');
        };
        line("FILE_TYPE", &self.file_type);
        line("VERSION", &self.version);
        line("HEADER_RECORD_SIZE", &self.header_size);
        line("RECORD_SIZE_DIGITS", &self.size_digits);
        line("RECORD_SIZE_FORMAT", &self.size_format);
        line("BLOCK_SIZE", &self.block_size);
        line("MINIMUM_BLOCK_CAPACITY", &self.minimum_block_capacity);
        line("RECORD_COUNT", &self.record_count);
        line("BLOCK_COUNT", &self.block_count);
        line("RECORD_FIELD_COUNT", &self.field_count);
        line("RECORD_FIELDS_TYPE", &self.fields_type);
        line("RECORD_FORMAT", &self.record_format);
        line("RECORD_PRIMARY_KEY", &self.primary_key);
        line("RBN_AVAIL", &Rbn::to_raw(self.free_list_head));
        line("RBN_ACTIVE", &self.sequence_head.get());
        line("STALE", &self.stale);
        text.push_str(TERMINATOR);
        text.push('\n');
        text
    }

    /// Bytes the header text needs, including the final padded line.
    pub fn encoded_len(&self) -> usize {
        self.text().len() + 1
    }

    /// Bytes this header could ever need: [`encoded_len`](Self::encoded_len)
    /// with every counter and link at its widest.
    pub fn max_encoded_len(&self) -> usize {
        let widest = Self {
            record_count: u64::MAX,
            block_count: u32::MAX,
            free_list_head: Some(Rbn::new(u32::MAX)),
            sequence_head: Rbn::new(u32::MAX),
            stale: false,
            ..self.clone()
        };
        widest.encoded_len()
    }

    /// Serialize and pad to exactly `header_size` bytes.
    ///
    /// # Errors
    /// Returns `Error::Capacity` if the text does not fit.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut text = self.text();
        let needed = text.len() + 1;
        if needed > self.header_size {
            return Err(Error::Capacity {
                size: needed,
                max: self.header_size,
            });
        }
        text.push_str(&" ".repeat(self.header_size - needed));
        text.push('\n');
        Ok(text.into_bytes())
    }

    /// Write the padded header at offset 0.
    pub fn write_to<W: Write + Seek>(&self, out: &mut W) -> Result<usize> {
        let bytes = self.encode()?;
        out.seek(SeekFrom::Start(0))?;
        out.write_all(&bytes)?;
        Ok(self.header_size)
    }

    /// Parse `KEY=VALUE` lines from offset 0 up to the `END` line.
    ///
    /// # Errors
    /// - `Error::Format` for an unknown key, a line without `=`, an
    ///   unparsable value, or a missing terminator
    /// - `Error::Io` if the stream cannot be read
    pub fn read_from<R: Read + Seek>(input: &mut R) -> Result<Self> {
        input.seek(SeekFrom::Start(0))?;
        let reader = BufReader::new(input);

        let mut header = Self::new(&TreeConfig::default());
        let mut terminated = false;

        for line in reader.lines() {
            let line = line?;
            if line == TERMINATOR {
                terminated = true;
                break;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| Error::format(format!("header line {:?} has no '='", line)))?;

            match key {
                "FILE_TYPE" => header.file_type = value.to_string(),
                "VERSION" => header.version = value.to_string(),
                "HEADER_RECORD_SIZE" => header.header_size = parse(key, value)?,
                "RECORD_SIZE_DIGITS" => header.size_digits = parse(key, value)?,
                "RECORD_SIZE_FORMAT" => header.size_format = value.to_string(),
                "BLOCK_SIZE" => header.block_size = parse(key, value)?,
                "MINIMUM_BLOCK_CAPACITY" => header.minimum_block_capacity = parse(key, value)?,
                "RECORD_COUNT" => header.record_count = parse_count(key, value)?,
                "BLOCK_COUNT" => {
                    header.block_count = u32::try_from(parse_count(key, value)?)
                        .map_err(|_| Error::format("BLOCK_COUNT out of range"))?
                }
                "RECORD_FIELD_COUNT" => header.field_count = parse(key, value)?,
                "RECORD_FIELDS_TYPE" => header.fields_type = value.to_string(),
                "RECORD_FORMAT" => header.record_format = value.to_string(),
                "RECORD_PRIMARY_KEY" => header.primary_key = parse(key, value)?,
                "RBN_AVAIL" => header.free_list_head = Rbn::from_raw(parse(key, value)?),
                "RBN_ACTIVE" => {
                    header.sequence_head = Rbn::from_raw(parse(key, value)?).unwrap_or(Rbn::ROOT)
                }
                "STALE" => header.stale = parse(key, value)?,
                other => {
                    return Err(Error::format(format!("unknown header key {:?}", other)));
                }
            }
        }

        if !terminated {
            return Err(Error::format("header is missing its END line"));
        }
        header.check()?;
        Ok(header)
    }

    fn check(&self) -> Result<()> {
        if self.block_size == 0 || self.header_size == 0 {
            return Err(Error::format("header declares a zero block or header size"));
        }
        if !(1..=9).contains(&self.size_digits) {
            return Err(Error::format(format!(
                "unsupported RECORD_SIZE_DIGITS {}",
                self.size_digits
            )));
        }
        // The root always exists.
        if self.block_count == 0 {
            return Err(Error::format("BLOCK_COUNT is zero"));
        }
        let fields = self.record_format.split(',').count();
        if self.primary_key == 0 || self.primary_key > fields {
            return Err(Error::format(format!(
                "RECORD_PRIMARY_KEY {} outside 1..={}",
                self.primary_key, fields
            )));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::format(format!("invalid value {:?} for {}", value, key)))
}

/// Counts written by older files may be `-1`; treat them as zero.
fn parse_count(key: &str, value: &str) -> Result<u64> {
    let n: i64 = parse(key, value)?;
    Ok(n.max(0) as u64)
}
