//! Validated identifiers used at every crate boundary.
//!
//! Three kinds of names travel through the workspace:
//!
//! - [`VariableId`] -- a dotted automation tag such as
//!   `PROSPER.SIN.IPR.SINGLE.PRES`. The leading segment names the host
//!   application and must be one of [`AppName`].
//! - [`EntityName`] -- the name of one tracked object (a well or a model),
//!   used as a table name in the history store.
//! - [`SnapshotLabel`] -- the name of one snapshot, used as a column name.
//!
//! All three are constructed once through a parse-or-fail function and are
//! immutable afterwards, so code deeper in the call chain never re-validates.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest entity name or snapshot label accepted.
const MAX_NAME_LEN: usize = 128;

/// Minimum byte offset of the first `.` in a variable identifier.
///
/// Application names are at least two characters long, so a separator at
/// offset 0 or 1 can never follow a valid prefix.
const MIN_PREFIX_LEN: usize = 2;

/// Host applications reachable through the automation interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppName {
    /// Single-well nodal analysis.
    Prosper,
    /// Material balance.
    Mbal,
    /// Surface network.
    Gap,
    /// Fluid properties.
    Pvt,
}

impl AppName {
    /// All recognised applications.
    pub const ALL: [Self; 4] = [Self::Prosper, Self::Mbal, Self::Gap, Self::Pvt];

    /// The upper-case tag prefix for this application.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prosper => "PROSPER",
            Self::Mbal => "MBAL",
            Self::Gap => "GAP",
            Self::Pvt => "PVT",
        }
    }
}

impl fmt::Display for AppName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|app| app.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownApplication {
                input: s.to_owned(),
                app: s.to_owned(),
            })
    }
}

/// A validated, upper-cased automation variable identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VariableId {
    tag: String,
    app: AppName,
}

impl VariableId {
    /// Parse a dotted identifier, normalising it to upper case.
    ///
    /// Surrounding whitespace is trimmed. The identifier must contain a `.`
    /// at offset 2 or later, the text before it must name a known
    /// [`AppName`], and the remainder must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::MalformedVariable`] for structural problems and
    /// [`TypeError::UnknownApplication`] for an unrecognised prefix.
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        let tag = input.trim().to_uppercase();
        let malformed = |reason| TypeError::MalformedVariable {
            input: input.to_owned(),
            reason,
        };

        if tag.is_empty() {
            return Err(malformed("identifier is empty"));
        }
        if tag
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '"')
        {
            return Err(malformed("identifier contains whitespace, quotes or control characters"));
        }

        let Some(dot) = tag.find('.') else {
            return Err(malformed("missing application prefix"));
        };
        if dot < MIN_PREFIX_LEN {
            return Err(malformed("application prefix too short"));
        }

        let (prefix, rest) = tag.split_at(dot);
        if rest.len() <= 1 {
            return Err(malformed("nothing follows the application prefix"));
        }

        let app = prefix
            .parse::<AppName>()
            .map_err(|_unknown| TypeError::UnknownApplication {
                input: input.to_owned(),
                app: prefix.to_owned(),
            })?;

        Ok(Self { tag, app })
    }

    /// The application this identifier addresses.
    pub const fn app(&self) -> AppName {
        self.app
    }

    /// The normalised identifier text.
    pub fn as_str(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

impl FromStr for VariableId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VariableId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VariableId> for String {
    fn from(id: VariableId) -> Self {
        id.tag
    }
}

impl AsRef<str> for VariableId {
    fn as_ref(&self) -> &str {
        &self.tag
    }
}

/// Column names that would shadow the implicit `rowid` of a table.
const ROWID_ALIASES: [&str; 3] = ["rowid", "oid", "_rowid_"];

/// Check that `input` is usable as a quoted `SQLite` identifier.
fn validate_name(kind: &'static str, input: &str) -> Result<String, TypeError> {
    let name = input.trim();
    let invalid = |reason| TypeError::InvalidName {
        kind,
        input: input.to_owned(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 128 bytes"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("only ASCII letters, digits, '_' and '-' are allowed"));
    }
    if name
        .get(..7)
        .is_some_and(|head| head.eq_ignore_ascii_case("sqlite_"))
    {
        return Err(invalid("names starting with 'sqlite_' are reserved"));
    }
    if ROWID_ALIASES
        .iter()
        .any(|alias| name.eq_ignore_ascii_case(alias))
    {
        return Err(invalid("SQLite rowid aliases are reserved"));
    }
    Ok(name.to_owned())
}

/// Generates a validated name newtype with standard derives.
macro_rules! define_name {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a name.
            ///
            /// # Errors
            ///
            /// Returns [`TypeError::InvalidName`] if the name is empty, too
            /// long, reserved, or contains characters outside
            /// `[A-Za-z0-9_-]`.
            pub fn parse(input: &str) -> Result<Self, TypeError> {
                validate_name($kind, input).map(Self)
            }

            /// The validated name.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> Self {
                name.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name! {
    /// Name of one tracked entity (well or model); one history table each.
    EntityName, "entity"
}

define_name! {
    /// Name of one snapshot; one history column each.
    ///
    /// Labels produced by [`crate::LabelGenerator`] sort lexically in the
    /// order they were generated.
    SnapshotLabel, "snapshot label"
}
