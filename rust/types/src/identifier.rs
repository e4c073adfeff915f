use regex::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;

/// PostgreSQL truncates identifiers to NAMEDATALEN - 1 bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("The identifier regex should be valid")
});

/// A role, database, schema or extension name that is safe to interpolate
/// into DDL as a quoted identifier.
///
/// DDL statements cannot bind identifiers as parameters, so every name that
/// ends up in a statement goes through this type. Names are case-sensitive:
/// `Alice` and `alice` are different roles.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, serde::Serialize)]
pub struct Identifier(String);

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Identifier::new(s).map_err(serde::de::Error::custom)
    }
}

pub fn validate_identifier(name: impl AsRef<str>) -> Result<(), String> {
    let name = name.as_ref();
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(format!(
            "Expected a name of at most {MAX_IDENTIFIER_LENGTH} bytes. Got {} bytes",
            name.len()
        ));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(format!(
            "Expected a name matching [A-Za-z_][A-Za-z0-9_$]*. Got: {name:?}"
        ));
    }
    Ok(())
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Identifier(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The name as a double-quoted SQL identifier, so the server keeps its
    /// case. The allow-list excludes `"`, so no escaping is needed.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<String> for Identifier {
    fn eq(&self, other: &String) -> bool {
        self.0 == *other
    }
}
