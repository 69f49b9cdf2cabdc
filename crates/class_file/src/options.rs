use std::ops::RangeInclusive;

/// Oldest major version the decoder accepts by default (JDK 1.0.2).
pub const MIN_MAJOR_VERSION: u16 = 45;
/// Newest major version the decoder accepts by default (Java SE 25).
pub const MAX_MAJOR_VERSION: u16 = 69;

/// Settings for a [`Parser`](crate::Parser).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Major versions accepted in the class file header.
    pub versions: RangeInclusive<u16>,
}
impl ParseOptions {
    /// Options that accept any version number.
    pub fn any_version() -> Self {
        Self {
            versions: 0..=u16::MAX,
        }
    }

    pub fn accepts(&self, major: u16) -> bool {
        self.versions.contains(&major)
    }
}
impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            versions: MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION,
        }
    }
}
