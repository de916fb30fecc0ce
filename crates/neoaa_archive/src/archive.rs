//! In-memory list of archive items

use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::error::{Error, FileNotFoundError, Result};
use crate::item::Item;

/// Number of items an archive makes room for on its first push
pub const INITIAL_CAPACITY: usize = 100;

/// How a query path is compared to the `PAT` field of an item
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// The stored path starts with the query, so `a` matches `abc`
    #[default]
    Prefix,
    /// The stored path equals the query
    Exact,
}

impl MatchMode {
    fn matches(&self, path: &[u8], query: &[u8]) -> bool {
        match self {
            MatchMode::Prefix => path.starts_with(query),
            MatchMode::Exact => path == query,
        }
    }
}

/// Decoded, ordered list of items
///
/// Items are kept in traversal order and are never deduplicated, two items sharing a path are
/// both retained. The archive owns every item pushed into it.
///
/// ```
/// # fn doit() -> neoaa_archive::error::Result<()>
/// # {
/// use neoaa_archive::{item::EntryMetadata, Item, PlainArchive};
///
/// let mut archive = PlainArchive::new();
/// archive.push(Item::directory("docs", &EntryMetadata::default())?)?;
/// archive.push(Item::file("docs/readme.txt", b"hello".to_vec(), &EntryMetadata::default())?)?;
///
/// assert_eq!(archive.paths().collect::<Vec<_>>(), vec!["docs", "docs/readme.txt"]);
/// # Ok(())
/// # }
/// # doit().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlainArchive {
    items: Vec<Item>,
}

impl PlainArchive {
    /// Create an empty archive
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an archive owning `items`
    pub fn with_items(items: Vec<Item>) -> Self {
        PlainArchive { items }
    }

    /// Append an item, taking ownership of it
    ///
    /// When the list is full its capacity doubles, starting from [`INITIAL_CAPACITY`]. A failed
    /// allocation is reported as [`Error::OutOfMemory`] and leaves the archive untouched.
    pub fn push(&mut self, item: Item) -> Result<()> {
        if self.items.len() == self.items.capacity() {
            let additional = self.items.capacity().max(INITIAL_CAPACITY);
            debug!(
                from = self.items.capacity(),
                to = self.items.capacity() + additional,
                "growing item list"
            );
            self.items.try_reserve_exact(additional)?;
        }
        self.items.push(item);
        Ok(())
    }

    /// Number of items in this archive
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this archive contains no items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items the archive can hold before growing
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Items in archive order
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Iterate over the items in archive order
    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    /// Give up the archive, returning its items
    pub fn into_items(self) -> Vec<Item> {
        self.items
    }

    /// Get an item by index
    pub fn by_index(&self, index: usize) -> Result<&Item> {
        self.items
            .get(index)
            .ok_or(Error::FileNotFound(FileNotFoundError::Index(index)))
    }

    /// Paths of every item carrying a `PAT` field, in archive order
    pub fn paths(&self) -> impl Iterator<Item = String> + '_ {
        self.items.iter().filter_map(|item| item.path())
    }

    /// First item whose path matches `query`
    pub fn find(&self, query: &str, mode: MatchMode) -> Option<&Item> {
        self.items.iter().find(|item| {
            item.path_bytes()
                .is_some_and(|path| mode.matches(path, query.as_bytes()))
        })
    }

    /// Write the contents of the first item matching `query` to `destination`
    ///
    /// The destination is only created once a match is found, a missing entry leaves the
    /// filesystem untouched and returns [`FileNotFoundError::Path`].
    #[instrument(skip(self, destination), err, fields(destination = %destination.as_ref().display()))]
    pub fn unwrap_to_path(
        &self,
        query: &str,
        mode: MatchMode,
        destination: impl AsRef<Path>,
    ) -> Result<&Item> {
        let item = self
            .find(query, mode)
            .ok_or_else(|| FileNotFoundError::Path(query.to_owned()))?;

        info!(path = ?item.path(), "unwrapping");

        let mut out = File::create(destination.as_ref())?;
        out.write_all(item.data().unwrap_or_default())?;
        out.flush()?;

        Ok(item)
    }
}

impl IntoIterator for PlainArchive {
    type Item = Item;
    type IntoIter = std::vec::IntoIter<Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a PlainArchive {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
