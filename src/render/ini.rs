//! INI-style writer for systemd units, networkd files and NetworkManager keyfiles

/// One `[Section]` with its entries in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append an entry; repeated keys are kept
    pub fn push<K: Into<String>, V: ToString>(&mut self, key: K, value: V) -> &mut Self {
        self.entries.push((key.into(), value.to_string()));
        self
    }

    /// Append an entry if there is a value
    pub fn push_opt<K: Into<String>, V: ToString>(&mut self, key: K, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    /// Set a key, replacing the value of an existing entry in place
    pub fn set<K: Into<String>, V: ToString>(&mut self, key: K, value: V) -> &mut Self {
        let key = key.into();
        let value = value.to_string();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A whole file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniFile {
    sections: Vec<Section>,
}

impl IniFile {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new section, even if one with the same name exists
    pub fn section<S: Into<String>>(&mut self, name: S) -> &mut Section {
        let index = self.sections.len();
        self.sections.push(Section {
            name: name.into(),
            entries: Vec::new(),
        });
        &mut self.sections[index]
    }

    /// The first section called `name`, created at the end if missing
    pub fn unique_section(&mut self, name: &str) -> &mut Section {
        match self.sections.iter().position(|s| s.name == name) {
            Some(index) => &mut self.sections[index],
            None => self.section(name),
        }
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Render as text; sections without entries are left out
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = String::new();
        for section in self.sections.iter().filter(|s| !s.is_empty()) {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push('[');
            text.push_str(&section.name);
            text.push_str("]\n");
            for (key, value) in &section.entries {
                text.push_str(key);
                text.push('=');
                text.push_str(value);
                text.push('\n');
            }
        }
        text
    }
}

/// Join values into a keyfile list: every item followed by `;`
#[must_use]
pub fn keyfile_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().fold(String::new(), |mut list, item| {
        list.push_str(item.as_ref());
        list.push(';');
        list
    })
}

/// Escape a string for a shell command line
///
/// Words made of safe characters are returned as-is, anything else is
/// wrapped in double quotes with special characters escaped.
#[must_use]
pub fn shell_escape(s: &str) -> String {
    if !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.' | ':' | '=' | ',' | '+')
        })
    {
        return s.to_owned();
    }

    let mut result = String::from('"');
    for ch in s.chars() {
        match ch {
            '"' => result.push_str(r#"\""#),
            '\\' => result.push_str(r"\\"),
            '$' => result.push_str(r"\$"),
            '`' => result.push_str(r"\`"),
            '%' => result.push_str("%%"),
            _ => result.push(ch),
        }
    }
    result.push('"');
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_render_in_order_and_skip_empty() {
        let mut file = IniFile::new();
        file.section("Match").push("Name", "eth0");
        file.section("Link");
        file.section("Route").push("Gateway", "10.0.0.1");
        file.section("Route").push("Gateway", "10.0.0.2");
        assert_eq!(
            file.render(),
            "[Match]\nName=eth0\n\n[Route]\nGateway=10.0.0.1\n\n[Route]\nGateway=10.0.0.2\n"
        );
    }

    #[test]
    fn set_overrides_existing_key() {
        let mut file = IniFile::new();
        file.unique_section("ipv4").set("method", "auto").set("dns", "1.1.1.1;");
        file.unique_section("ipv4").set("method", "manual");
        let rendered = file.render();
        assert_eq!(rendered, "[ipv4]\nmethod=manual\ndns=1.1.1.1;\n");
    }

    #[test]
    fn keyfile_lists() {
        assert_eq!(keyfile_list(["a", "b"]), "a;b;");
        assert_eq!(keyfile_list(Vec::<String>::new()), "");
    }

    #[test]
    fn shell_escape_simple() {
        assert_eq!(shell_escape("br0"), "br0");
        assert_eq!(shell_escape("external-ids:iface-id=x"), "external-ids:iface-id=x");
    }

    #[test]
    fn shell_escape_special_chars() {
        assert_eq!(shell_escape("has space"), r#""has space""#);
        assert_eq!(shell_escape("has$dollar"), r#""has\$dollar""#);
        assert_eq!(shell_escape(r#"has"quote"#), r#""has\"quote""#);
        assert_eq!(shell_escape("50%"), r#""50%%""#);
        assert_eq!(shell_escape(""), r#""""#);
    }
}
