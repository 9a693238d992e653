//! Table identity and component file naming.
//!
//! Every component of one table lives in the same directory and shares a
//! base name:
//!
//! ```text
//! <dir>/<table>-[tmp-]<version>-<generation>-<Component>.db
//!
//! users-tmp-e-7-Data.db       (being written)
//! users-e-7-Data.db           (published)
//! ```
//!
//! The keyspace is not part of the file name; it is the name of the
//! directory holding the table.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, SSTableError};

/// Format version written by this crate.
pub const CURRENT_VERSION: &str = "e";

/// First version that stores row lengths as 8-byte longs.
const LONG_ROW_SIZE_VERSION: &str = "b";

const TEMPORARY_MARKER: &str = "tmp";
const SEPARATOR: char = '-';
const EXTENSION: &str = ".db";

/// One file role within a table.
///
/// Ordering matches the order components are listed and checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    /// Row bytes.
    Data,
    /// Key → data offset pairs.
    PrimaryIndex,
    /// Serialized membership filter.
    Filter,
    /// Serialized row-size and column-count histograms.
    Stats,
}

impl Component {
    /// All components a complete table consists of.
    pub const ALL: [Component; 4] = [
        Component::Data,
        Component::PrimaryIndex,
        Component::Filter,
        Component::Stats,
    ];

    /// File name suffix of this component (without the leading separator).
    #[must_use]
    pub fn file_suffix(self) -> &'static str {
        match self {
            Component::Data => "Data.db",
            Component::PrimaryIndex => "Index.db",
            Component::Filter => "Filter.db",
            Component::Stats => "Statistics.db",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.file_suffix() == suffix)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.file_suffix();
        f.write_str(&name[..name.len() - EXTENSION.len()])
    }
}

/// Identity of one table instance on disk.
///
/// Two descriptors that differ only in [`temporary`](Descriptor::temporary)
/// refer to the same table at different lifecycle stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub directory: PathBuf,
    pub keyspace: String,
    pub table: String,
    pub generation: u64,
    pub version: String,
    pub temporary: bool,
}

impl Descriptor {
    /// Describes a table in the current format version.
    pub fn new<P: Into<PathBuf>>(
        directory: P,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        generation: u64,
        temporary: bool,
    ) -> Self {
        Self {
            directory: directory.into(),
            keyspace: keyspace.into(),
            table: table.into(),
            generation,
            version: CURRENT_VERSION.to_string(),
            temporary,
        }
    }

    /// Checks that the table name survives the trip through
    /// [`filename_for`](Descriptor::filename_for) and back through
    /// [`from_filename`](Descriptor::from_filename).
    ///
    /// # Errors
    ///
    /// [`SSTableError::InvalidTableName`] if the name is empty or contains
    /// `-` or a path separator.
    pub fn validate(&self) -> Result<()> {
        let table = &self.table;
        if table.is_empty() || table.chars().any(|c| c == SEPARATOR || std::path::is_separator(c)) {
            return Err(SSTableError::InvalidTableName(table.clone()));
        }
        Ok(())
    }

    /// Returns the same table with a different temporary flag.
    #[must_use]
    pub fn as_temporary(&self, temporary: bool) -> Descriptor {
        Descriptor {
            temporary,
            ..self.clone()
        }
    }

    /// `true` if this table was written in [`CURRENT_VERSION`].
    #[must_use]
    pub fn is_latest_version(&self) -> bool {
        self.version == CURRENT_VERSION
    }

    /// `true` if rows in this version carry an 8-byte length (4 bytes before `"b"`).
    #[must_use]
    pub fn has_long_row_size(&self) -> bool {
        self.version.as_str() >= LONG_ROW_SIZE_VERSION
    }

    /// Base name shared by every component, e.g. `users-tmp-e-7`.
    #[must_use]
    pub fn base_name(&self) -> String {
        let mut name = String::with_capacity(self.table.len() + 16);
        name.push_str(&self.table);
        name.push(SEPARATOR);
        if self.temporary {
            name.push_str(TEMPORARY_MARKER);
            name.push(SEPARATOR);
        }
        name.push_str(&self.version);
        name.push(SEPARATOR);
        name.push_str(&self.generation.to_string());
        name
    }

    /// Path of the file holding `component` for this table.
    #[must_use]
    pub fn filename_for(&self, component: Component) -> PathBuf {
        self.directory
            .join(format!("{}{}{}", self.base_name(), SEPARATOR, component.file_suffix()))
    }

    /// Parses a component path back into its descriptor and component.
    ///
    /// # Errors
    ///
    /// Returns [`SSTableError::InvalidFilename`] if the name does not follow
    /// `<table>-[tmp-]<version>-<generation>-<Component>.db`.
    pub fn from_filename(path: &Path) -> Result<(Descriptor, Component)> {
        let invalid = || SSTableError::InvalidFilename(path.display().to_string());

        let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
        let parts: Vec<&str> = name.split(SEPARATOR).collect();
        let (table, temporary, version, generation, suffix) = match parts.as_slice() {
            [table, TEMPORARY_MARKER, version, generation, suffix] => {
                (*table, true, *version, *generation, *suffix)
            }
            [table, version, generation, suffix] => (*table, false, *version, *generation, *suffix),
            _ => return Err(invalid()),
        };

        if table.is_empty()
            || version.is_empty()
            || version == TEMPORARY_MARKER
            || !version.chars().all(|c| c.is_ascii_lowercase())
        {
            return Err(invalid());
        }
        let generation: u64 = generation.parse().map_err(|_| invalid())?;
        let component = Component::from_suffix(suffix).ok_or_else(invalid)?;

        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let keyspace = directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok((
            Descriptor {
                directory,
                keyspace,
                table: table.to_string(),
                generation,
                version: version.to_string(),
                temporary,
            },
            component,
        ))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.directory.join(self.base_name()).display())
    }
}

/// Returns the components of `desc` that currently exist on disk.
#[must_use]
pub fn components_for(desc: &Descriptor) -> BTreeSet<Component> {
    Component::ALL
        .into_iter()
        .filter(|c| desc.filename_for(*c).exists())
        .collect()
}
