// library.rs — Header files on disk
//
// A generated library lives in one directory; each function's header is
// `{dir}/{base_name}.h`, a `#pragma once` line followed by the printed header.
//
// Preconditions: the directory exists; it is never created here.
// Postconditions: `read_header(loc)` returns what `write_header(h, loc)` wrote.
// Failure modes: relative directory or invalid base name, I/O errors, and
//                any codec error from the file contents.
// Side effects: reads and writes header files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{HeaderError, Result};
use crate::header::Header;
use crate::ident::is_valid_identifier;

pub const HEADER_PREAMBLE: &str = "#pragma once";
pub const HEADER_EXTENSION: &str = "h";

/// Where one header lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryLocation {
    dir: PathBuf,
    base_name: String,
}

impl LibraryLocation {
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        let base_name = base_name.into();
        if !dir.is_absolute() {
            return Err(HeaderError::InvalidLocation(format!(
                "directory {} is not absolute",
                dir.display()
            )));
        }
        if !is_valid_identifier(&base_name) {
            return Err(HeaderError::InvalidLocation(format!(
                "base name '{}' is not an identifier",
                base_name
            )));
        }
        Ok(LibraryLocation { dir, base_name })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn header_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.base_name, HEADER_EXTENSION))
    }
}

/// Write `header` to its file, replacing any previous contents.
pub fn write_header(header: &Header, location: &LibraryLocation) -> Result<PathBuf> {
    let path = location.header_path();
    let contents = format!("{}\n\n{}", HEADER_PREAMBLE, header.print()?);
    fs::write(&path, contents).map_err(|source| HeaderError::Io {
        path: path.clone(),
        source,
    })?;
    log::debug!("wrote {}", path.display());
    Ok(path)
}

pub fn read_header(location: &LibraryLocation) -> Result<Header> {
    let path = location.header_path();
    let text = fs::read_to_string(&path).map_err(|source| HeaderError::Io {
        path: path.clone(),
        source,
    })?;
    log::debug!("read {} ({} bytes)", path.display(), text.len());
    Header::parse(&text)
}
