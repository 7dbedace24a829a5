//! ZIP codec for EPUB containers
//!
//! [`ZipWriter`] appends entries in a single sequential pass, which is what
//! the OCF layout needs: `mimetype` first and stored, everything else after.
//! [`StreamingZip`] reads the central directory back so a freshly written
//! archive can be checked before it replaces anything on disk.
//! DEFLATE is provided by miniz_oxide, checksums by crc32fast.

use std::collections::BTreeSet;
use std::io::{Read, Seek, SeekFrom, Write};

// Re-export the crate's public ZIP error alias for module consumers.
pub use crate::error::ZipError;

/// Local file header signature (little-endian)
const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;

/// Central directory entry signature (little-endian)
const SIG_CD_ENTRY: u32 = 0x02014b50;

/// End of central directory signature (little-endian)
const SIG_EOCD: u32 = 0x06054b50;
/// Minimum EOCD record size in bytes
const EOCD_MIN_SIZE: usize = 22;
/// Maximum EOCD search window (EOCD + max comment length)
const MAX_EOCD_SCAN: usize = EOCD_MIN_SIZE + u16::MAX as usize;

/// Compression methods
const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

/// "Version needed to extract": 2.0 covers DEFLATE
const VERSION_NEEDED: u16 = 20;
/// General purpose flag bit 11: file name is UTF-8
const FLAG_UTF8_NAME: u16 = 0x0800;

/// Maximum entry name length we write or read
const MAX_FILENAME_LEN: usize = 256;

/// Default reader limit for a single decompressed entry.
const DEFAULT_MAX_FILE_READ_SIZE: usize = 64 * 1024 * 1024;

/// How an entry's bytes are stored in the archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// No compression (method 0)
    Stored,
    /// Raw DEFLATE (method 8)
    Deflated,
}

impl Compression {
    fn method(self) -> u16 {
        match self {
            Compression::Stored => METHOD_STORED,
            Compression::Deflated => METHOD_DEFLATED,
        }
    }
}

/// MS-DOS date/time pair used in ZIP headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DosDateTime {
    /// Packed date: `(year - 1980) << 9 | month << 5 | day`
    pub date: u16,
    /// Packed time: `hour << 11 | minute << 5 | second / 2`
    pub time: u16,
}

impl DosDateTime {
    /// Pack calendar fields. Years before 1980 clamp to 1980-01-01.
    pub fn from_parts(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        if year < 1980 {
            return Self::default();
        }
        let year = (year - 1980).min(127);
        Self {
            date: (year << 9) | ((month as u16 & 0x0f) << 5) | (day as u16 & 0x1f),
            time: ((hour as u16 & 0x1f) << 11)
                | ((minute as u16 & 0x3f) << 5)
                | ((second as u16 / 2) & 0x1f),
        }
    }
}

impl Default for DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    fn default() -> Self {
        Self {
            date: (1 << 5) | 1,
            time: 0,
        }
    }
}

/// Central directory entry metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdEntry {
    /// Compression method (0=stored, 8=deflated)
    pub method: u16,
    /// Compressed size in bytes
    pub compressed_size: u32,
    /// Uncompressed size in bytes
    pub uncompressed_size: u32,
    /// Offset to local file header
    pub local_header_offset: u32,
    /// CRC32 checksum
    pub crc32: u32,
    /// Filename
    pub filename: String,
}

impl CdEntry {
    /// Whether the entry is stored without compression.
    pub fn is_stored(&self) -> bool {
        self.method == METHOD_STORED
    }
}

/// Sequential ZIP writer.
///
/// Entries land in the archive in exactly the order they are added.
pub struct ZipWriter<W: Write> {
    out: W,
    offset: u64,
    entries: Vec<(CdEntry, u16)>,
    names: BTreeSet<String>,
    timestamp: DosDateTime,
    level: u8,
}

impl<W: Write> ZipWriter<W> {
    /// Start a new archive on `out`.
    pub fn new(out: W) -> Self {
        Self {
            out,
            offset: 0,
            entries: Vec::new(),
            names: BTreeSet::new(),
            timestamp: DosDateTime::default(),
            level: 6,
        }
    }

    /// Set the modification timestamp written for every entry.
    pub fn with_timestamp(mut self, timestamp: DosDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the DEFLATE level (0..=10, miniz_oxide scale).
    pub fn with_deflate_level(mut self, level: u8) -> Self {
        self.level = level.min(10);
        self
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry has been written yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one entry: local header followed by (possibly compressed) data.
    pub fn add_entry(
        &mut self,
        name: &str,
        data: &[u8],
        compression: Compression,
    ) -> Result<(), ZipError> {
        if name.is_empty() || name.starts_with('/') || name.len() > MAX_FILENAME_LEN {
            return Err(ZipError::InvalidEntryName(name.to_string()));
        }
        if self.names.contains(name) {
            return Err(ZipError::DuplicateEntry(name.to_string()));
        }
        if self.entries.len() >= u16::MAX as usize {
            return Err(ZipError::TooManyEntries);
        }

        let crc32 = crc32fast::hash(data);
        let compressed;
        let payload: &[u8] = match compression {
            Compression::Stored => data,
            Compression::Deflated => {
                compressed = miniz_oxide::deflate::compress_to_vec(data, self.level);
                &compressed
            }
        };

        let uncompressed_size = u32::try_from(data.len()).map_err(|_| ZipError::FileTooLarge)?;
        let compressed_size = u32::try_from(payload.len()).map_err(|_| ZipError::FileTooLarge)?;
        let local_header_offset =
            u32::try_from(self.offset).map_err(|_| ZipError::FileTooLarge)?;
        let flags = if name.is_ascii() { 0 } else { FLAG_UTF8_NAME };

        let mut header = Vec::with_capacity(30 + name.len());
        header.extend_from_slice(&SIG_LOCAL_FILE_HEADER.to_le_bytes());
        header.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        header.extend_from_slice(&flags.to_le_bytes());
        header.extend_from_slice(&compression.method().to_le_bytes());
        header.extend_from_slice(&self.timestamp.time.to_le_bytes());
        header.extend_from_slice(&self.timestamp.date.to_le_bytes());
        header.extend_from_slice(&crc32.to_le_bytes());
        header.extend_from_slice(&compressed_size.to_le_bytes());
        header.extend_from_slice(&uncompressed_size.to_le_bytes());
        header.extend_from_slice(&(name.len() as u16).to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // no extra field
        header.extend_from_slice(name.as_bytes());

        self.write_all(&header)?;
        self.write_all(payload)?;

        log::debug!(
            "[ZIP] Wrote '{}' (method={}, compressed={}, uncompressed={})",
            name,
            compression.method(),
            compressed_size,
            uncompressed_size
        );

        self.names.insert(name.to_string());
        self.entries.push((
            CdEntry {
                method: compression.method(),
                compressed_size,
                uncompressed_size,
                local_header_offset,
                crc32,
                filename: name.to_string(),
            },
            flags,
        ));
        Ok(())
    }

    /// Write the central directory and end record, returning the sink.
    pub fn finish(mut self) -> Result<W, ZipError> {
        let cd_offset = u32::try_from(self.offset).map_err(|_| ZipError::FileTooLarge)?;
        let mut cd = Vec::new();
        for (entry, flags) in &self.entries {
            cd.extend_from_slice(&SIG_CD_ENTRY.to_le_bytes());
            cd.extend_from_slice(&VERSION_NEEDED.to_le_bytes()); // version made by
            cd.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
            cd.extend_from_slice(&flags.to_le_bytes());
            cd.extend_from_slice(&entry.method.to_le_bytes());
            cd.extend_from_slice(&self.timestamp.time.to_le_bytes());
            cd.extend_from_slice(&self.timestamp.date.to_le_bytes());
            cd.extend_from_slice(&entry.crc32.to_le_bytes());
            cd.extend_from_slice(&entry.compressed_size.to_le_bytes());
            cd.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
            cd.extend_from_slice(&(entry.filename.len() as u16).to_le_bytes());
            cd.extend_from_slice(&0u16.to_le_bytes()); // extra
            cd.extend_from_slice(&0u16.to_le_bytes()); // comment
            cd.extend_from_slice(&0u16.to_le_bytes()); // disk number start
            cd.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
            cd.extend_from_slice(&0u32.to_le_bytes()); // external attributes
            cd.extend_from_slice(&entry.local_header_offset.to_le_bytes());
            cd.extend_from_slice(entry.filename.as_bytes());
        }
        let cd_size = u32::try_from(cd.len()).map_err(|_| ZipError::FileTooLarge)?;
        let count = self.entries.len() as u16;

        let mut eocd = Vec::with_capacity(EOCD_MIN_SIZE);
        eocd.extend_from_slice(&SIG_EOCD.to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes());
        eocd.extend_from_slice(&count.to_le_bytes());
        eocd.extend_from_slice(&count.to_le_bytes());
        eocd.extend_from_slice(&cd_size.to_le_bytes());
        eocd.extend_from_slice(&cd_offset.to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes());

        self.write_all(&cd)?;
        self.write_all(&eocd)?;
        self.out.flush().map_err(|_| ZipError::IoError)?;

        log::debug!(
            "[ZIP] Finished archive with {} entries ({} bytes)",
            count,
            self.offset
        );
        Ok(self.out)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), ZipError> {
        self.out.write_all(bytes).map_err(|e| {
            log::error!("[ZIP] Write failed at offset {}: {}", self.offset, e);
            ZipError::IoError
        })?;
        self.offset += bytes.len() as u64;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct EocdInfo {
    cd_offset: u64,
    cd_size: u32,
    num_entries: u16,
}

/// Streaming ZIP file reader
pub struct StreamingZip<F: Read + Seek> {
    /// File handle
    file: F,
    /// Central directory entries, in directory order
    entries: Vec<CdEntry>,
    /// Largest entry `read_file` will inflate
    max_file_read_size: usize,
}

impl<F: Read + Seek> StreamingZip<F> {
    /// Open a ZIP file and parse the central directory
    pub fn new(mut file: F) -> Result<Self, ZipError> {
        let eocd = Self::find_eocd(&mut file)?;

        file.seek(SeekFrom::Start(eocd.cd_offset))
            .map_err(|_| ZipError::IoError)?;
        let cd_end = eocd.cd_offset + eocd.cd_size as u64;

        let mut entries = Vec::with_capacity(eocd.num_entries as usize);
        for _ in 0..eocd.num_entries {
            let pos = file.stream_position().map_err(|_| ZipError::IoError)?;
            if pos >= cd_end {
                return Err(ZipError::InvalidFormat);
            }
            match Self::read_cd_entry(&mut file)? {
                Some(entry) => entries.push(entry),
                None => return Err(ZipError::InvalidFormat),
            }
        }

        log::debug!(
            "[ZIP] Parsed {} central directory entries (offset {})",
            entries.len(),
            eocd.cd_offset
        );

        Ok(Self {
            file,
            entries,
            max_file_read_size: DEFAULT_MAX_FILE_READ_SIZE,
        })
    }

    /// Cap the decompressed size accepted by [`read_file`](Self::read_file).
    pub fn with_max_file_read_size(mut self, max: usize) -> Self {
        self.max_file_read_size = max;
        self
    }

    /// Find EOCD and extract central directory info
    fn find_eocd(file: &mut F) -> Result<EocdInfo, ZipError> {
        let file_size = file.seek(SeekFrom::End(0)).map_err(|_| ZipError::IoError)?;
        if file_size < EOCD_MIN_SIZE as u64 {
            return Err(ZipError::InvalidFormat);
        }

        // Scan last (EOCD + max comment) bytes for EOCD signature.
        let scan_range = file_size.min(MAX_EOCD_SCAN as u64) as usize;
        let mut buffer = vec![0u8; scan_range];
        file.seek(SeekFrom::Start(file_size - scan_range as u64))
            .map_err(|_| ZipError::IoError)?;
        file.read_exact(&mut buffer)
            .map_err(|_| ZipError::IoError)?;
        let scan_base = file_size - scan_range as u64;

        for i in (0..=scan_range - EOCD_MIN_SIZE).rev() {
            if read_u32_le(&buffer, i) != SIG_EOCD {
                continue;
            }
            let num_entries = read_u16_le(&buffer, i + 10);
            let cd_size = read_u32_le(&buffer, i + 12);
            let cd_offset = read_u32_le(&buffer, i + 16) as u64;
            let comment_len = read_u16_le(&buffer, i + 20) as u64;
            let eocd_pos = scan_base + i as u64;
            if eocd_pos + EOCD_MIN_SIZE as u64 + comment_len != file_size {
                continue;
            }
            if num_entries == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX as u64 {
                return Err(ZipError::UnsupportedZip64);
            }
            if cd_offset + cd_size as u64 > eocd_pos {
                return Err(ZipError::InvalidFormat);
            }
            return Ok(EocdInfo {
                cd_offset,
                cd_size,
                num_entries,
            });
        }

        Err(ZipError::InvalidFormat)
    }

    /// Read a central directory entry from file
    fn read_cd_entry(file: &mut F) -> Result<Option<CdEntry>, ZipError> {
        let mut sig_buf = [0u8; 4];
        if file.read_exact(&mut sig_buf).is_err() {
            return Ok(None);
        }
        if u32::from_le_bytes(sig_buf) != SIG_CD_ENTRY {
            return Ok(None);
        }

        // Fixed portion after the signature; buf[N] is CD offset N + 4
        let mut buf = [0u8; 42];
        file.read_exact(&mut buf).map_err(|_| ZipError::IoError)?;

        let name_len = read_u16_le(&buf, 24) as usize;
        let extra_len = read_u16_le(&buf, 26) as usize;
        let comment_len = read_u16_le(&buf, 28) as usize;
        if name_len > MAX_FILENAME_LEN {
            return Err(ZipError::InvalidFormat);
        }

        let mut name_buf = vec![0u8; name_len];
        file.read_exact(&mut name_buf)
            .map_err(|_| ZipError::IoError)?;

        let skip_bytes = extra_len + comment_len;
        if skip_bytes > 0 {
            file.seek(SeekFrom::Current(skip_bytes as i64))
                .map_err(|_| ZipError::IoError)?;
        }

        Ok(Some(CdEntry {
            method: read_u16_le(&buf, 6),
            crc32: read_u32_le(&buf, 12),
            compressed_size: read_u32_le(&buf, 16),
            uncompressed_size: read_u32_le(&buf, 20),
            local_header_offset: read_u32_le(&buf, 38),
            filename: String::from_utf8_lossy(&name_buf).into_owned(),
        }))
    }

    /// Get entry by exact filename
    pub fn get_entry(&self, name: &str) -> Option<&CdEntry> {
        self.entries.iter().find(|e| e.filename == name)
    }

    /// Iterate over all entries in central directory order
    pub fn entries(&self) -> impl Iterator<Item = &CdEntry> {
        self.entries.iter()
    }

    /// Number of entries in the central directory
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Read and decompress one entry, verifying its CRC32.
    pub fn read_file(&mut self, entry: &CdEntry) -> Result<Vec<u8>, ZipError> {
        if entry.uncompressed_size as usize > self.max_file_read_size
            || entry.compressed_size as usize > self.max_file_read_size
        {
            return Err(ZipError::FileTooLarge);
        }

        let data_offset = self.calc_data_offset(entry)?;
        self.file
            .seek(SeekFrom::Start(data_offset))
            .map_err(|_| ZipError::IoError)?;
        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.file
            .read_exact(&mut raw)
            .map_err(|_| ZipError::IoError)?;

        let data = match entry.method {
            METHOD_STORED => raw,
            METHOD_DEFLATED => miniz_oxide::inflate::decompress_to_vec_with_limit(
                &raw,
                self.max_file_read_size,
            )
            .map_err(|_| ZipError::DecompressError)?,
            _ => return Err(ZipError::UnsupportedCompression),
        };

        if crc32fast::hash(&data) != entry.crc32 {
            return Err(ZipError::CrcMismatch);
        }
        Ok(data)
    }

    /// Read an entry by name.
    pub fn read_by_name(&mut self, name: &str) -> Result<Vec<u8>, ZipError> {
        let entry = self.get_entry(name).ok_or(ZipError::FileNotFound)?.clone();
        self.read_file(&entry)
    }

    /// Calculate the offset to the actual file data (past local header)
    fn calc_data_offset(&mut self, entry: &CdEntry) -> Result<u64, ZipError> {
        let offset = entry.local_header_offset as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|_| ZipError::IoError)?;

        let mut header = [0u8; 30];
        self.file
            .read_exact(&mut header)
            .map_err(|_| ZipError::IoError)?;
        if read_u32_le(&header, 0) != SIG_LOCAL_FILE_HEADER {
            return Err(ZipError::InvalidFormat);
        }

        let name_len = read_u16_le(&header, 26) as u64;
        let extra_len = read_u16_le(&header, 28) as u64;
        Ok(offset + 30 + name_len + extra_len)
    }

    /// Validate the OCF `mimetype` rules.
    ///
    /// The first entry must be named `mimetype`, start at offset 0, be stored
    /// uncompressed, and contain exactly `application/epub+zip`.
    pub fn validate_mimetype(&mut self) -> Result<(), ZipError> {
        let first = self
            .entries
            .first()
            .cloned()
            .ok_or_else(|| ZipError::InvalidMimetype("archive is empty".to_string()))?;
        if first.filename != "mimetype" {
            return Err(ZipError::InvalidMimetype(format!(
                "first entry is '{}'",
                first.filename
            )));
        }
        if first.local_header_offset != 0 || !first.is_stored() {
            return Err(ZipError::InvalidMimetype(
                "mimetype must be stored at offset 0".to_string(),
            ));
        }

        let content = self.read_file(&first)?;
        if content != crate::metadata::EPUB_MIMETYPE.as_bytes() {
            return Err(ZipError::InvalidMimetype(format!(
                "expected '{}', got '{}'",
                crate::metadata::EPUB_MIMETYPE,
                String::from_utf8_lossy(&content)
            )));
        }
        Ok(())
    }
}

/// Read u16 from buffer at offset (little-endian)
fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

/// Read u32 from buffer at offset (little-endian)
fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
