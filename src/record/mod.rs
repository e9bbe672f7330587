//! Record codec.
//!
//! A [`Record`] is one logical row: an ordered list of text fields, one of
//! which is the integer primary key. On disk a record is length-indicated:
//!
//! ```text
//! <2-digit body length><field>,<field>,...,
//! e.g. 3955414,Holtsville,NY,Suffolk,40.8,-73.0,
//! ```
//!
//! The length prefix counts the body bytes only (fields plus one trailing
//! delimiter per field) and is zero-padded to the configured digit count.

use std::fmt;

use crate::common::config::max_record_body;
use crate::common::{Error, Result};

/// Primary key type. Keys compare as integers.
pub type Key = i64;

/// Separator between fields (and after the last field).
pub const FIELD_DELIMITER: char = ',';

/// One logical row, keyed by its primary-key field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    key: Key,
    fields: Vec<String>,
}

impl Record {
    /// Pack a list of fields into a record.
    ///
    /// # Errors
    /// - `Error::Format` if a field contains the delimiter, the key field is
    ///   missing, or the key field is not an integer
    pub fn from_fields<I, S>(fields: I, key_field: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();

        if let Some(bad) = fields.iter().find(|f| f.contains(FIELD_DELIMITER)) {
            return Err(Error::format(format!(
                "field {:?} contains the delimiter",
                bad
            )));
        }

        let key = parse_key(&fields, key_field)?;
        Ok(Self { key, fields })
    }

    /// Build a record from one comma-separated row (no quoting).
    pub fn parse_csv(line: &str, key_field: usize) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        Self::from_fields(line.split(FIELD_DELIMITER), key_field)
    }

    #[inline]
    pub fn key(&self) -> Key {
        self.key
    }

    /// All fields in stored order.
    #[inline]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// One field by 0-based position.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Bytes of the body: every field followed by one delimiter.
    pub fn body_len(&self) -> usize {
        self.fields.iter().map(|f| f.len() + 1).sum()
    }

    /// Bytes this record occupies in a block, including the length prefix.
    #[inline]
    pub fn encoded_len(&self, size_digits: usize) -> usize {
        size_digits + self.body_len()
    }

    /// Check the body fits a length prefix of `size_digits` digits.
    ///
    /// # Errors
    /// Returns `Error::Capacity` if the body is too long.
    pub fn check_size(&self, size_digits: usize) -> Result<()> {
        let max = max_record_body(size_digits);
        let size = self.body_len();
        if size > max {
            return Err(Error::Capacity { size, max });
        }
        Ok(())
    }

    /// Append the length-indicated form of this record to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>, size_digits: usize) -> Result<()> {
        self.check_size(size_digits)?;

        let prefix = format!("{:0width$}", self.body_len(), width = size_digits);
        out.extend_from_slice(prefix.as_bytes());
        for field in &self.fields {
            out.extend_from_slice(field.as_bytes());
            out.push(FIELD_DELIMITER as u8);
        }
        Ok(())
    }

    /// Decode one record from the start of `bytes`.
    ///
    /// Returns the record and the number of bytes consumed.
    ///
    /// # Errors
    /// - `Error::Format` for a corrupt length prefix, a truncated body, a
    ///   body without its trailing delimiter, or an invalid key field
    pub fn decode(bytes: &[u8], size_digits: usize, key_field: usize) -> Result<(Self, usize)> {
        if bytes.len() < size_digits {
            return Err(Error::format("truncated record length prefix"));
        }

        let prefix = &bytes[..size_digits];
        if !prefix.iter().all(u8::is_ascii_digit) {
            return Err(Error::format(format!(
                "corrupt record length prefix {:?}",
                String::from_utf8_lossy(prefix)
            )));
        }
        // All ASCII digits, so both conversions succeed.
        let len: usize = std::str::from_utf8(prefix)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::format("corrupt record length prefix"))?;

        let end = size_digits + len;
        if len == 0 || bytes.len() < end {
            return Err(Error::format(format!(
                "record body of {} bytes is truncated or empty",
                len
            )));
        }

        let body = std::str::from_utf8(&bytes[size_digits..end])
            .map_err(|_| Error::format("record body is not valid UTF-8"))?;
        let body = body
            .strip_suffix(FIELD_DELIMITER)
            .ok_or_else(|| Error::format("record body missing trailing delimiter"))?;

        let record = Self::from_fields(body.split(FIELD_DELIMITER), key_field)?;
        Ok((record, end))
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", FIELD_DELIMITER)?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}

fn parse_key(fields: &[String], key_field: usize) -> Result<Key> {
    let raw = fields.get(key_field).ok_or_else(|| {
        Error::format(format!(
            "record has {} fields, key field is {}",
            fields.len(),
            key_field
        ))
    })?;
    raw.trim()
        .parse()
        .map_err(|_| Error::format(format!("key field {:?} is not an integer", raw)))
}
