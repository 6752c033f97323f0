//! Configuration strings: `key=value`, `key=(a,b,c)` and bare flags separated
//! by commas, e.g. `key_format=r,value_format=5sHQ,columns=(id,country)`.

use crate::error::SchemaError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Flag,
    Str(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigString {
    entries: Vec<(String, ConfigValue)>,
}

fn invalid(reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidConfig {
        reason: reason.into(),
    }
}

impl ConfigString {
    pub fn parse(input: &str) -> Result<Self, SchemaError> {
        let mut entries: Vec<(String, ConfigValue)> = Vec::new();
        for item in split_top_level(input)? {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let (key, value) = match item.split_once('=') {
                None => (item, ConfigValue::Flag),
                Some((key, raw)) => (key.trim(), parse_value(raw.trim())?),
            };
            if key.is_empty() {
                return Err(invalid(format!("missing key in '{item}'")));
            }
            if entries.iter().any(|(k, _)| k == key) {
                return Err(invalid(format!("duplicate key '{key}'")));
            }
            entries.push((key.to_string(), value));
        }
        Ok(Self { entries })
    }

    fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, SchemaError> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Str(s)) => Ok(Some(s)),
            Some(_) => Err(invalid(format!("'{key}' expects a single value"))),
        }
    }

    pub fn get_list(&self, key: &str) -> Result<Option<&[String]>, SchemaError> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::List(items)) => Ok(Some(items)),
            Some(_) => Err(invalid(format!("'{key}' expects a list like {key}=(a,b)"))),
        }
    }

    /// Bare `key` and `key=true` are true, `key=false` is false.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, SchemaError> {
        match self.get(key) {
            None => Ok(None),
            Some(ConfigValue::Flag) => Ok(Some(true)),
            Some(ConfigValue::Str(s)) => match s.as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                other => Err(invalid(format!("'{key}' expects a boolean, got '{other}'"))),
            },
            Some(ConfigValue::List(_)) => Err(invalid(format!("'{key}' expects a boolean"))),
        }
    }

    pub fn ensure_known(&self, known: &[&str]) -> Result<(), SchemaError> {
        for (key, _) in &self.entries {
            if !known.contains(&key.as_str()) {
                return Err(invalid(format!("unknown configuration key '{key}'")));
            }
        }
        Ok(())
    }
}

fn split_top_level(input: &str) -> Result<Vec<&str>, SchemaError> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(format!("unbalanced ')' at offset {i}")))?;
            }
            ',' if depth == 0 => {
                out.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid("unbalanced '('"));
    }
    out.push(&input[start..]);
    Ok(out)
}

fn parse_value(raw: &str) -> Result<ConfigValue, SchemaError> {
    let Some(inner) = raw.strip_prefix('(') else {
        if raw.is_empty() {
            return Err(invalid("empty value"));
        }
        return Ok(ConfigValue::Str(raw.to_string()));
    };
    let inner = inner
        .strip_suffix(')')
        .ok_or_else(|| invalid(format!("list '{raw}' is not closed")))?;
    Ok(ConfigValue::List(parse_list(inner)?))
}

/// Comma separated names; `""` is the empty list.
pub fn parse_list(inner: &str) -> Result<Vec<String>, SchemaError> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|item| {
            let item = item.trim();
            if item.is_empty() || item.contains('(') || item.contains(')') {
                Err(invalid(format!("malformed list '({inner})'")))
            } else {
                Ok(item.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ConfigString, ConfigValue, parse_list};

    #[test]
    fn parses_table_config() {
        let cfg = ConfigString::parse(
            "key_format=r,value_format=5sHQ,columns=(id,country,year,population),colgroups=(main,population)",
        )
        .expect("parse");
        assert_eq!(cfg.get_str("key_format").expect("str"), Some("r"));
        assert_eq!(cfg.get_str("value_format").expect("str"), Some("5sHQ"));
        assert_eq!(
            cfg.get_list("columns").expect("list").map(|l| l.len()),
            Some(4)
        );
        assert_eq!(
            cfg.get_list("colgroups").expect("list"),
            Some(&["main".to_string(), "population".to_string()][..])
        );
        cfg.ensure_known(&["key_format", "value_format", "columns", "colgroups"])
            .expect("known");
        assert!(cfg.ensure_known(&["columns"]).is_err());
    }

    #[test]
    fn flags_and_booleans() {
        let cfg = ConfigString::parse("append, overwrite=false").expect("parse");
        assert_eq!(cfg.get_bool("append").expect("bool"), Some(true));
        assert_eq!(cfg.get_bool("overwrite").expect("bool"), Some(false));
        assert_eq!(cfg.get_bool("missing").expect("bool"), None);
        assert!(ConfigString::parse("").expect("empty").get("x").is_none());
    }

    #[test]
    fn rejects_malformed_config() {
        for bad in ["columns=(a,b", "columns=a)", "a=1,a=2", "=x", "columns=(a,,b)", "k="] {
            assert!(ConfigString::parse(bad).is_err(), "{bad}");
        }
        let cfg = ConfigString::parse("columns=(a)").expect("parse");
        assert!(cfg.get_str("columns").is_err());
        assert_eq!(
            ConfigString::parse("columns=()")
                .expect("parse")
                .get("columns"),
            Some(&ConfigValue::List(Vec::new()))
        );
        assert_eq!(parse_list(" a , b ").expect("list"), vec!["a", "b"]);
    }
}
