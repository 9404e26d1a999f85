//! On-disk amplification dictionaries and the multi-dictionary loader.
//!
//! A dictionary file is a gzip stream containing `mask_size`, `offset`, the
//! low-resolution atom table, the x2 and x4 high-resolution tables, and an
//! optional x8 table. Only the table matching the requested amplification
//! factor is kept in memory.

use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::matrix::{read_i32, read_u8, DenseMatrix};

/// Fatal pipeline errors. All of these terminate the CLI with a non-zero
/// status; none are recoverable.
#[derive(Debug)]
pub enum AmplifyError {
    Io(io::Error),
    Image(image::ImageError),
    /// The requested factor is not 2, 4, or 8, or is 8 for a dictionary
    /// without a stored x8 table.
    InvalidFactor(u32),
    /// Loaded dictionaries disagree on `mask_size` or `offset`.
    IncompatibleDictionaries,
    /// The dictionary path list was empty.
    NoDictionaries,
}

impl fmt::Display for AmplifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmplifyError::Io(e) => write!(f, "i/o error: {}", e),
            AmplifyError::Image(e) => write!(f, "image error: {}", e),
            AmplifyError::InvalidFactor(factor) => {
                write!(f, "invalid factor for dictionary: {}", factor)
            }
            AmplifyError::IncompatibleDictionaries => {
                write!(f, "input dictionaries are not compatible")
            }
            AmplifyError::NoDictionaries => {
                write!(f, "must specify one or more dictionary files")
            }
        }
    }
}

impl Error for AmplifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AmplifyError::Io(e) => Some(e),
            AmplifyError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for AmplifyError {
    fn from(e: io::Error) -> Self {
        AmplifyError::Io(e)
    }
}

impl From<image::ImageError> for AmplifyError {
    fn from(e: image::ImageError) -> Self {
        AmplifyError::Image(e)
    }
}

/// A dictionary file as stored on disk, with every resolution variant.
#[derive(Clone, Debug, PartialEq)]
pub struct AmplificationDictionary {
    pub mask_size: usize,
    pub offset: usize,
    pub low: DenseMatrix,
    pub high2: DenseMatrix,
    pub high4: DenseMatrix,
    pub high8: Option<DenseMatrix>,
}

impl AmplificationDictionary {
    pub fn read(path: &Path) -> io::Result<Self> {
        let file = BufReader::new(File::open(path)?);
        let mut input = BufReader::new(GzDecoder::new(file));
        Self::read_from(&mut input)
    }

    pub fn read_from<R: Read>(input: &mut R) -> io::Result<Self> {
        let mask_size = read_i32(input)? as usize;
        let offset = read_i32(input)? as usize;
        let low = DenseMatrix::read_from(input)?;
        let high2 = DenseMatrix::read_from(input)?;
        let high4 = DenseMatrix::read_from(input)?;
        let high8 = if read_u8(input)? != 0 {
            Some(DenseMatrix::read_from(input)?)
        } else {
            None
        };
        Ok(Self {
            mask_size,
            offset,
            low,
            high2,
            high4,
            high8,
        })
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        let file = BufWriter::new(File::create(path)?);
        let mut encoder = GzEncoder::new(file, Compression::default());
        self.write_to(&mut encoder)?;
        encoder.finish()?.flush()
    }

    pub fn write_to<W: Write>(&self, output: &mut W) -> io::Result<()> {
        output.write_all(&(self.mask_size as i32).to_be_bytes())?;
        output.write_all(&(self.offset as i32).to_be_bytes())?;
        self.low.write_to(output)?;
        self.high2.write_to(output)?;
        self.high4.write_to(output)?;
        output.write_all(&[self.high8.is_some() as u8])?;
        if let Some(high8) = &self.high8 {
            high8.write_to(output)?;
        }
        Ok(())
    }

    /// Consume the stored variants, keeping the table for `factor`.
    pub fn select(self, factor: u32) -> Result<Dictionary, AmplifyError> {
        let high = match factor {
            2 => self.high2,
            4 => self.high4,
            8 => self.high8.ok_or(AmplifyError::InvalidFactor(factor))?,
            _ => return Err(AmplifyError::InvalidFactor(factor)),
        };
        Ok(Dictionary {
            low: self.low,
            high,
        })
    }
}

/// One loaded dictionary: the low-res matching basis and the high-res table
/// for the requested factor.
///
/// `low` holds atoms as columns, shape `(patch_area, atom_count)`; `high`
/// holds atoms as rows, shape `(atom_count, high_patch_area)`, as stored
/// on disk. Synthesis indexes `high` by `(atom, local_index)`.
#[derive(Clone, Debug)]
pub struct Dictionary {
    pub low: DenseMatrix,
    pub high: DenseMatrix,
}

/// All dictionaries for one amplification run, sharing patch geometry.
#[derive(Debug)]
pub struct DictionarySet {
    pub mask_size: usize,
    pub offset: usize,
    pub dictionaries: Vec<Dictionary>,
}

/// Load every dictionary file, selecting the high-res table for `factor`.
///
/// The first file establishes the reference `mask_size`/`offset`; any later
/// file that disagrees fails the whole load.
pub fn load_dictionaries(factor: u32, paths: &[PathBuf]) -> Result<DictionarySet, AmplifyError> {
    if paths.is_empty() {
        return Err(AmplifyError::NoDictionaries);
    }
    let mut mask_size = 0;
    let mut offset = 0;
    let mut dictionaries = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        let dictionary = AmplificationDictionary::read(path)?;
        if i == 0 {
            mask_size = dictionary.mask_size;
            offset = dictionary.offset;
        } else if mask_size != dictionary.mask_size || offset != dictionary.offset {
            return Err(AmplifyError::IncompatibleDictionaries);
        }
        dictionaries.push(dictionary.select(factor)?);
    }
    Ok(DictionarySet {
        mask_size,
        offset,
        dictionaries,
    })
}
