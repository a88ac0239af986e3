// Boundaries to document storage: where pages come from and where the
// assembled output goes.

pub mod atomic;
pub mod raster;

use std::path::Path;

use crate::mrc::{Page, PageOutput};

pub use atomic::{AtomicWriter, StagedFileWriter};

/// Fallible, random-access page provider.
pub trait PageSource {
    fn page_count(&self) -> crate::error::Result<usize>;

    /// Decode page `index` (0-based).
    fn page(&self, index: usize) -> crate::error::Result<Page>;

    /// Acquire access to the underlying storage before reading.
    fn begin_access(&self) -> crate::error::Result<()> {
        Ok(())
    }

    /// Release access acquired by [`begin_access`](Self::begin_access).
    fn end_access(&self) {}
}

/// Holds source access for its lifetime.
pub struct AccessScope<'a> {
    source: &'a dyn PageSource,
}

impl<'a> AccessScope<'a> {
    pub fn begin(source: &'a dyn PageSource) -> crate::error::Result<Self> {
        source.begin_access()?;
        Ok(Self { source })
    }
}

impl Drop for AccessScope<'_> {
    fn drop(&mut self) {
        self.source.end_access();
    }
}

/// Receives pages in order and produces the finished document.
pub trait DocumentSink {
    /// Append the next page. Pages must arrive in source order.
    fn append_page(&mut self, output: PageOutput) -> crate::error::Result<()>;

    fn pages_appended(&self) -> usize;

    /// Serialize the assembled document.
    fn finish(&mut self) -> crate::error::Result<Vec<u8>>;

    /// Serialize and hand the bytes to `writer` for `destination`.
    fn write(&mut self, destination: &Path, writer: &dyn AtomicWriter) -> crate::error::Result<()> {
        let bytes = self.finish()?;
        writer.write_atomic(&bytes, destination)
    }
}
