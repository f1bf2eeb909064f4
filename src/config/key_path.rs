//! Dotted key paths into the merged document

use core::fmt;

/// Path from the document root to a value, e.g. `network.bonds.bond0.parameters.mode`
///
/// Sequence elements are addressed by their decimal index.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    /// The empty path addressing the document root
    #[must_use]
    #[inline]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from its components
    #[inline]
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Path of a mapping key below this one
    #[must_use]
    #[inline]
    pub fn child<S: Into<String>>(&self, part: S) -> Self {
        let mut parts = self.0.clone();
        parts.push(part.into());
        Self(parts)
    }

    /// Path of a sequence element below this one
    #[must_use]
    #[inline]
    pub fn index(&self, index: usize) -> Self {
        self.child(index.to_string())
    }

    /// Append a component in place
    #[inline]
    pub fn push<S: Into<String>>(&mut self, part: S) {
        self.0.push(part.into());
    }

    /// Remove the last component in place
    #[inline]
    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    /// Path components, root first
    #[must_use]
    #[inline]
    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Number of components
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the root path
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The path made of the first `len` components
    #[must_use]
    #[inline]
    pub fn truncated(&self, len: usize) -> Self {
        Self(self.0.iter().take(len).cloned().collect())
    }

    /// Parse a JSON pointer (`/network/vlans/v/id`) as produced by the schema validator
    #[must_use]
    pub fn from_json_pointer(pointer: &str) -> Self {
        Self(
            pointer
                .split('/')
                .skip(1)
                .map(|part| part.replace("~1", "/").replace("~0", "~"))
                .collect(),
        )
    }
}

impl fmt::Display for KeyPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        f.write_str(&self.0.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pointer_is_unescaped() {
        let path = KeyPath::from_json_pointer("/network/nm-devices/a~1b/networkmanager");
        assert_eq!(path.to_string(), "network.nm-devices.a/b.networkmanager");
    }

    #[test]
    fn root_pointer_is_empty() {
        assert!(KeyPath::from_json_pointer("").is_empty());
        assert_eq!(KeyPath::root().to_string(), "<root>");
    }

    #[test]
    fn child_and_index_compose() {
        let path = KeyPath::new(["network", "ethernets"]).child("eth0").child("routes").index(1);
        assert_eq!(path.to_string(), "network.ethernets.eth0.routes.1");
        assert_eq!(path.truncated(3).to_string(), "network.ethernets.eth0");
    }
}
