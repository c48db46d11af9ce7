//! POSIX permission strings as printed by `ls -l`
//!
//! Accepted forms are nine mode characters (`rwxr-xr--`) optionally
//! preceded by one file-type character (`drwxr-xr-x`). Setuid, setgid and
//! sticky letters are understood in the execute positions.

use std::fmt;
use std::str::FromStr;

use crate::error::FormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
    Symlink,
    /// Block/char devices, pipes, sockets
    Special(char),
}

impl EntryType {
    fn from_flag(flag: char) -> Option<Self> {
        match flag {
            '-' => Some(EntryType::File),
            'd' => Some(EntryType::Directory),
            'l' => Some(EntryType::Symlink),
            'b' | 'c' | 'p' | 's' => Some(EntryType::Special(flag)),
            _ => None,
        }
    }

    fn flag(self) -> char {
        match self {
            EntryType::File => '-',
            EntryType::Directory => 'd',
            EntryType::Symlink => 'l',
            EntryType::Special(flag) => flag,
        }
    }
}

/// Who a permission triple applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    User,
    Group,
    Other,
}

impl FromStr for Accessor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "owner" | "u" => Ok(Accessor::User),
            "group" | "g" => Ok(Accessor::Group),
            "other" | "others" | "o" => Ok(Accessor::Other),
            _ => Err(format!("Unknown accessor: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionTriple {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl PermissionTriple {
    fn parse(chars: &[char]) -> Option<Self> {
        let read = match chars[0] {
            'r' => true,
            '-' => false,
            _ => return None,
        };
        let write = match chars[1] {
            'w' => true,
            '-' => false,
            _ => return None,
        };
        let execute = match chars[2] {
            'x' | 's' | 't' => true,
            '-' | 'S' | 'T' => false,
            _ => return None,
        };
        Some(Self {
            read,
            write,
            execute,
        })
    }

    /// `"Read, Write, Execute"`, or `"None"` when nothing is granted.
    pub fn describe(&self) -> String {
        let granted: Vec<&str> = [
            (self.read, "Read"),
            (self.write, "Write"),
            (self.execute, "Execute"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect();

        if granted.is_empty() {
            "None".to_string()
        } else {
            granted.join(", ")
        }
    }
}

impl fmt::Display for PermissionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' },
            if self.execute { 'x' } else { '-' }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    /// Present only when the string carried a type flag
    pub entry_type: Option<EntryType>,
    pub user: PermissionTriple,
    pub group: PermissionTriple,
    pub other: PermissionTriple,
}

impl Permissions {
    pub fn parse(s: &str) -> Result<Self, FormatError> {
        let invalid = || FormatError(s.to_string());
        let chars: Vec<char> = s.chars().collect();

        let (entry_type, mode) = match chars.len() {
            9 => (None, &chars[..]),
            10 => (Some(EntryType::from_flag(chars[0]).ok_or_else(invalid)?), &chars[1..]),
            _ => return Err(invalid()),
        };

        Ok(Self {
            entry_type,
            user: PermissionTriple::parse(&mode[0..3]).ok_or_else(invalid)?,
            group: PermissionTriple::parse(&mode[3..6]).ok_or_else(invalid)?,
            other: PermissionTriple::parse(&mode[6..9]).ok_or_else(invalid)?,
        })
    }

    pub fn triple(&self, accessor: Accessor) -> PermissionTriple {
        match accessor {
            Accessor::User => self.user,
            Accessor::Group => self.group,
            Accessor::Other => self.other,
        }
    }

    pub fn describe(&self, accessor: Accessor) -> String {
        self.triple(accessor).describe()
    }

    /// `None` when the string had no type flag, or for a symlink whose
    /// target type is unknown.
    pub fn is_directory(&self) -> Option<bool> {
        match self.entry_type? {
            EntryType::Symlink => None,
            entry_type => Some(entry_type == EntryType::Directory),
        }
    }
}

impl FromStr for Permissions {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(entry_type) = self.entry_type {
            write!(f, "{}", entry_type.flag())?;
        }
        write!(f, "{}{}{}", self.user, self.group, self.other)
    }
}
