use crate::catalog::options::parse_list;
use crate::error::SchemaError;
use std::fmt;

/// A parsed object name such as `table:T`, `colgroup:T:G` or
/// `index:T:I(colA,colB)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUri {
    Table {
        table: String,
        projection: Option<Vec<String>>,
    },
    ColumnGroup {
        table: String,
        /// `None` names the implicit group of a simple table.
        group: Option<String>,
        projection: Option<Vec<String>>,
    },
    Index {
        table: String,
        index: String,
        projection: Option<Vec<String>>,
    },
}

impl SourceUri {
    pub fn parse(uri: &str) -> Result<Self, SchemaError> {
        let invalid = |reason: &str| SchemaError::InvalidConfig {
            reason: format!("invalid uri '{uri}': {reason}"),
        };
        let (path, projection) = match uri.find('(') {
            None => (uri, None),
            Some(open) => {
                let inner = uri[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("projection is not closed"))?;
                (&uri[..open], Some(parse_list(inner)?))
            }
        };
        let (scheme, rest) = path
            .split_once(':')
            .ok_or_else(|| invalid("missing scheme"))?;
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty name"));
        }
        let parsed = match (scheme, parts.as_slice()) {
            ("table", [table]) => SourceUri::Table {
                table: (*table).to_string(),
                projection,
            },
            ("colgroup", [table]) => SourceUri::ColumnGroup {
                table: (*table).to_string(),
                group: None,
                projection,
            },
            ("colgroup", [table, group]) => SourceUri::ColumnGroup {
                table: (*table).to_string(),
                group: Some((*group).to_string()),
                projection,
            },
            ("index", [table, index]) => SourceUri::Index {
                table: (*table).to_string(),
                index: (*index).to_string(),
                projection,
            },
            _ => return Err(invalid("expected table:T, colgroup:T[:G] or index:T:I")),
        };
        Ok(parsed)
    }

    pub fn table(&self) -> &str {
        match self {
            SourceUri::Table { table, .. }
            | SourceUri::ColumnGroup { table, .. }
            | SourceUri::Index { table, .. } => table,
        }
    }

    pub fn projection(&self) -> Option<&[String]> {
        match self {
            SourceUri::Table { projection, .. }
            | SourceUri::ColumnGroup { projection, .. }
            | SourceUri::Index { projection, .. } => projection.as_deref(),
        }
    }
}

impl fmt::Display for SourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceUri::Table { table, .. } => write!(f, "table:{table}")?,
            SourceUri::ColumnGroup {
                table,
                group: None,
                ..
            } => write!(f, "colgroup:{table}")?,
            SourceUri::ColumnGroup {
                table,
                group: Some(group),
                ..
            } => write!(f, "colgroup:{table}:{group}")?,
            SourceUri::Index { table, index, .. } => write!(f, "index:{table}:{index}")?,
        }
        if let Some(cols) = self.projection() {
            write!(f, "({})", cols.join(","))?;
        }
        Ok(())
    }
}
