//! Identifier types shared by every splitter crate.
//!
//! `SliceRef` is validated on construction; `ReleaseId` is a plain string
//! newtype. Both serialize as plain strings.

use crate::manifest::ManifestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Separator between the package part and the slice part of a reference.
pub const SLICE_SEPARATOR: char = '_';

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Fully qualified release branch name in the slice repository, e.g. `openEuler-24.03-LTS`.
    ReleaseId
);

/// A `{package}_{slice}` reference addressing one slice across manifests.
///
/// The split happens on the *last* separator so package names may contain
/// underscores: `foo_bar_baz` is package `foo_bar`, slice `baz`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SliceRef {
    raw: String,
    split: usize,
}

impl SliceRef {
    pub fn parse(input: &str) -> Result<Self, ManifestError> {
        let Some(split) = input.rfind(SLICE_SEPARATOR) else {
            return Err(ManifestError::InvalidSliceRef(input.to_owned()));
        };
        if split == 0 || split + 1 == input.len() {
            return Err(ManifestError::InvalidSliceRef(input.to_owned()));
        }
        Ok(Self {
            raw: input.to_owned(),
            split,
        })
    }

    /// Name of the slice definition file (without extension) that owns this slice.
    pub fn package(&self) -> &str {
        &self.raw[..self.split]
    }

    pub fn slice(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for SliceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl AsRef<str> for SliceRef {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}

impl TryFrom<String> for SliceRef {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SliceRef> for String {
    fn from(value: SliceRef) -> Self {
        value.raw
    }
}

impl std::str::FromStr for SliceRef {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Target architectures slices can be cut for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub const ALIASES: &'static [(&'static str, Arch)] = &[
        ("x86_64", Arch::X86_64),
        ("amd64", Arch::X86_64),
        ("linux/amd64", Arch::X86_64),
        ("aarch64", Arch::Aarch64),
        ("arm64", Arch::Aarch64),
        ("linux/arm64", Arch::Aarch64),
    ];

    /// Normalize a user-supplied architecture name to its canonical form.
    pub fn from_alias(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, arch)| *arch)
    }

    /// Canonical (RPM basearch) name.
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
