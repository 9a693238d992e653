use crate::descriptor::Descriptor;

/// Schema information a table is written for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub keyspace: String,
    pub name: String,
    /// Free-form description shown by tooling.
    pub comment: String,
}

impl TableMetadata {
    pub fn new(keyspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            name: name.into(),
            comment: String::new(),
        }
    }

    /// Metadata naming the keyspace and table `desc` belongs to.
    pub fn for_descriptor(desc: &Descriptor) -> Self {
        Self::new(desc.keyspace.clone(), desc.table.clone())
    }
}
