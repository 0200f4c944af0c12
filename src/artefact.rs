//! Save-directory layout and checksum verification for converted artefacts.

use std::{
    fs::{self, File},
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{mode::ClassificationMode, record::REFERENCE_FILE};

/// Name of the tokenizer file copied next to the graphs.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

const FULL_PRECISION_SUFFIX: &str = "model.onnx";
const QUANTIZED_SUFFIX: &str = "quantized.onnx";

/// Errors raised while locating or verifying artefacts.
#[derive(Debug, Error)]
pub enum ArtefactError {
    #[error("failed to read artefact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no {kind} graph found in {dir}")]
    Missing { dir: PathBuf, kind: &'static str },
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

/// File names a conversion writes into its save directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtefactLayout {
    dir: PathBuf,
    mode: ClassificationMode,
}

impl ArtefactLayout {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, mode: ClassificationMode) -> Self {
        Self {
            dir: dir.into(),
            mode,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{mode}-model.onnx`
    #[must_use]
    pub fn full_precision(&self) -> PathBuf {
        self.dir.join(format!("{}-model.onnx", self.mode))
    }

    /// `{mode}-model-quantized.onnx`
    #[must_use]
    pub fn quantized(&self) -> PathBuf {
        self.dir.join(format!("{}-model-quantized.onnx", self.mode))
    }

    #[must_use]
    pub fn tokenizer(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    #[must_use]
    pub fn record(&self) -> PathBuf {
        self.dir.join(REFERENCE_FILE)
    }
}

/// Locate the graph to validate inside `dir`.
///
/// Picks the first file, by name, ending in `quantized.onnx` when `quantized`
/// is set and in `model.onnx` otherwise.
///
/// # Errors
///
/// Returns [`ArtefactError::Missing`] when no file matches and
/// [`ArtefactError::Io`] when the directory cannot be listed.
pub fn discover_graph(dir: &Path, quantized: bool) -> Result<PathBuf, ArtefactError> {
    let (suffix, kind) = if quantized {
        (QUANTIZED_SUFFIX, "quantized")
    } else {
        (FULL_PRECISION_SUFFIX, "full-precision")
    };
    let entries = fs::read_dir(dir).map_err(|source| ArtefactError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut names = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(suffix))
        .collect::<Vec<_>>();
    names.sort();
    names
        .into_iter()
        .next()
        .map(|name| dir.join(name))
        .ok_or_else(|| ArtefactError::Missing {
            dir: dir.to_path_buf(),
            kind,
        })
}

/// Check the file at `path` against an expected SHA-256 digest.
///
/// # Errors
///
/// Returns [`ArtefactError::ChecksumMismatch`] when the digests differ and
/// propagates I/O errors while reading the file.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), ArtefactError> {
    let actual = compute_sha256(path)?;
    let expected = normalise_hex(expected);
    if actual == expected {
        Ok(())
    } else {
        Err(ArtefactError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        })
    }
}

/// Computes the SHA-256 digest of the file at `path`.
///
/// # Errors
///
/// Returns I/O errors from opening or reading the file.
pub fn compute_sha256(path: &Path) -> Result<String, ArtefactError> {
    let io = |source| ArtefactError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0_u8; 8192];
    loop {
        let read = reader.read(&mut buffer).map_err(io)?;
        if read == 0 {
            break;
        }
        let chunk = buffer.get(..read).ok_or_else(|| {
            io(std::io::Error::other(
                "read reported bytes beyond buffer length",
            ))
        })?;
        hasher.update(chunk);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[must_use]
pub fn normalise_hex(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}
