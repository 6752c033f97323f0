/// Runtime configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Allow a value column to be stored in more than one column group.
    pub allow_overlapping_colgroups: bool,
    pub max_identifier_len: usize,
    /// Default for the `overwrite` cursor flag.
    pub overwrite_by_default: bool,
    /// Write schema metadata records into the store on create/drop.
    pub persist_metadata: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allow_overlapping_colgroups: true,
            max_identifier_len: 128,
            overwrite_by_default: true,
            persist_metadata: true,
        }
    }
}

impl SessionConfig {
    /// Disjoint column groups and insert-only cursors.
    pub fn strict() -> Self {
        Self {
            allow_overlapping_colgroups: false,
            overwrite_by_default: false,
            ..Self::default()
        }
    }

    /// Scratch sessions that never touch the metadata namespace.
    pub fn development() -> Self {
        Self {
            persist_metadata: false,
            ..Self::default()
        }
    }
}
