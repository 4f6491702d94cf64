//! Precomputed line metadata.
//!
//! For every `(size class, line index)` pair the table records where the
//! first object beginning in that line starts and how many objects begin
//! there. The bump path carves whole runs of free lines using only these
//! entries, never recomputing object boundaries at allocation time.
//!
//! Objects are packed back to back from offset zero of the page; an object
//! may straddle line boundaries, in which case the lines it merely passes
//! through carry an `object_count` of zero.

use crate::sizes::{object_size, SIZE_CLASS_COUNT, SMALL_LINE_SIZE};

/// Metadata of one line for one size class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LineMetadata {
    /// Offset within the line of the first object beginning there.
    pub start_offset: u16,
    /// Number of objects beginning in this line. Zero for lines that only
    /// contain the interior of an object begun earlier.
    pub object_count: u16,
}

/// Table of line metadata for every size class, computed once at heap
/// construction for the physical page size in use.
pub(crate) struct LineMetadataTable {
    entries: Vec<LineMetadata>,
    lines_per_page: usize,
}

impl LineMetadataTable {
    pub fn new(physical_page_size: usize) -> Self {
        debug_assert!(physical_page_size % SMALL_LINE_SIZE == 0);
        let lines_per_page = physical_page_size / SMALL_LINE_SIZE;
        let mut entries = vec![
            LineMetadata {
                start_offset: 0,
                object_count: 0,
            };
            SIZE_CLASS_COUNT * lines_per_page
        ];

        for class in 0..SIZE_CLASS_COUNT {
            let size = object_size(class);
            let page = &mut entries[class * lines_per_page..][..lines_per_page];

            let mut object = 0usize;
            let mut line = 0usize;
            while object < physical_page_size {
                line = object / SMALL_LINE_SIZE;
                let leftover = object % SMALL_LINE_SIZE;
                let object_count = (SMALL_LINE_SIZE - leftover).div_ceil(size);
                page[line] = LineMetadata {
                    start_offset: leftover as u16,
                    object_count: object_count as u16,
                };
                object += object_count * size;
            }

            // Don't let the last object escape the page.
            if object > physical_page_size {
                debug_assert!(page[line].object_count > 0);
                page[line].object_count -= 1;
            }
        }

        Self {
            entries,
            lines_per_page,
        }
    }

    #[inline]
    pub fn get(&self, class: usize, line: usize) -> LineMetadata {
        self.entries[class * self.lines_per_page + line]
    }

    #[inline]
    pub const fn lines_per_page(&self) -> usize {
        self.lines_per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizes::SIZE_CLASSES;

    const PAGE: usize = 4096;

    fn object_begins(table: &LineMetadataTable, class: usize) -> Vec<usize> {
        let size = object_size(class);
        let mut begins = Vec::new();
        for line in 0..table.lines_per_page() {
            let meta = table.get(class, line);
            for k in 0..meta.object_count as usize {
                begins.push(line * SMALL_LINE_SIZE + meta.start_offset as usize + k * size);
            }
        }
        begins
    }

    #[test]
    fn objects_are_contiguous_from_page_start() {
        let table = LineMetadataTable::new(PAGE);
        for class in 0..SIZE_CLASS_COUNT {
            let size = object_size(class);
            let begins = object_begins(&table, class);
            assert_eq!(begins.len(), PAGE / size, "class {class}");
            for (i, begin) in begins.iter().enumerate() {
                assert_eq!(*begin, i * size, "class {class} object {i}");
            }
        }
    }

    #[test]
    fn no_object_escapes_the_page() {
        let table = LineMetadataTable::new(PAGE);
        for class in 0..SIZE_CLASS_COUNT {
            let size = object_size(class);
            if let Some(last) = object_begins(&table, class).last() {
                assert!(last + size <= PAGE, "class {class}");
            }
        }
    }

    #[test]
    fn interior_lines_of_straddling_objects_are_empty() {
        let table = LineMetadataTable::new(PAGE);
        // The 1KiB class spans four lines per object; only every fourth line
        // starts one.
        let class = SIZE_CLASSES.len() - 1;
        assert_eq!(object_size(class), 1024);
        for line in 0..table.lines_per_page() {
            let meta = table.get(class, line);
            if line % 4 == 0 {
                assert_eq!(meta.object_count, 1);
                assert_eq!(meta.start_offset, 0);
            } else {
                assert_eq!(meta.object_count, 0);
            }
        }
    }
}
