use std::fs::File;
use std::io;
use std::path::Path;

use log::debug;
use memmap2::Mmap;

use crate::{Error, Result};

/// A read-only view of the input file, memory-mapped for the lifetime of the
/// pipeline.
///
/// Every borrowed string downstream (frame names, comm names, fold keys)
/// points into this buffer, so it must outlive parsing, folding, and tree
/// construction. The mapping is released when the buffer is dropped.
#[derive(Debug)]
pub struct InputBuffer {
    repr: Repr,
}

#[derive(Debug)]
enum Repr {
    Mapped(Mmap),
    // Mapping a zero-length file fails with EINVAL on Linux, so empty inputs
    // get their own representation and still flow through the pipeline far
    // enough to produce the parse-empty error.
    Empty,
}

impl InputBuffer {
    /// Opens `path` read-only and maps it into the address space.
    ///
    /// The mapping is advised for sequential whole-file access on unix.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(InputBuffer { repr: Repr::Empty });
        }

        // Safety: the map is created over a file we opened read-only and is
        // never exposed mutably. A concurrent writer truncating the file
        // under us is the usual mmap caveat and out of our hands.
        let map = unsafe { Mmap::map(&file)? };

        #[cfg(unix)]
        {
            let _ = map.advise(memmap2::Advice::Sequential);
            let _ = map.advise(memmap2::Advice::WillNeed);
        }

        debug!("mapped {} ({} bytes)", path.display(), len);
        Ok(InputBuffer {
            repr: Repr::Mapped(map),
        })
    }

    /// The mapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match &self.repr {
            Repr::Mapped(map) => &map[..],
            Repr::Empty => &[],
        }
    }

    /// Length of the mapped region in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the input file was empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_file_is_file_not_found() {
        let err = InputBuffer::open(Path::new("/definitely/not/here.perf")).unwrap_err();
        match err {
            Error::FileNotFound(p) => assert_eq!(p, Path::new("/definitely/not/here.perf")),
            other => panic!("expected FileNotFound, got {:?}", other),
        }
    }

    #[test]
    fn empty_file_maps_to_empty_slice() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let buf = InputBuffer::open(f.path()).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.as_bytes(), b"");
    }

    #[test]
    fn contents_are_visible() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"main\nworker\n").unwrap();
        f.flush().unwrap();
        let buf = InputBuffer::open(f.path()).unwrap();
        assert_eq!(buf.as_bytes(), b"main\nworker\n");
        assert_eq!(buf.len(), 12);
    }
}
