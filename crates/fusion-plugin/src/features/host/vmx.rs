//! Minimal editor for `.vmx` definition files.
//!
//! A `.vmx` file is a list of `key = "value"` lines. Keys compare
//! case-insensitively. Special characters in values use VMware's `|XX` hex
//! escaping. Lines this editor does not touch are written back unchanged.

use super::{HostError, HostResult};
use std::path::Path;

pub const DISPLAY_NAME_KEY: &str = "displayName";
pub const MEMORY_SIZE_KEY: &str = "memsize";
pub const NUM_VCPUS_KEY: &str = "numvcpus";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmxFile {
    lines: Vec<String>,
}

impl VmxFile {
    pub fn parse(contents: &str) -> Self {
        Self {
            lines: contents.lines().map(ToString::to_string).collect(),
        }
    }

    pub async fn load(path: &Path) -> HostResult<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HostError::io(path, e))?;
        Ok(Self::parse(&contents))
    }

    pub async fn save(&self, path: &Path) -> HostResult<()> {
        tokio::fs::write(path, self.render())
            .await
            .map_err(|e| HostError::io(path, e))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lines
            .iter()
            .filter_map(|line| split_entry(line))
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| decode_value(v))
    }

    /// Replace the first entry for `key`, or append one.
    pub fn set(&mut self, key: &str, value: &str) {
        let rendered = format!("{key} = \"{}\"", encode_value(value));
        let existing = self.lines.iter().position(|line| {
            split_entry(line).is_some_and(|(k, _)| k.eq_ignore_ascii_case(key))
        });

        match existing {
            Some(index) => self.lines[index] = rendered,
            None => self.lines.push(rendered),
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Load, set a single key, and write back.
pub async fn update(path: &Path, key: &str, value: &str) -> HostResult<()> {
    let mut vmx = VmxFile::load(path).await?;
    vmx.set(key, value);
    vmx.save(path).await
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let (key, value) = trimmed.split_once('=')?;
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);
    Some((key.trim(), value))
}

fn encode_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '|' | '#' => out.push_str(&format!("|{:02X}", c as u32)),
            c if (c as u32) < 0x20 => out.push_str(&format!("|{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn decode_value(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'|'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = &value[i + 1..i + 3];
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    // Escapes encode raw bytes; multi-byte characters may span several.
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#".encoding = "UTF-8"
config.version = "8"
# comment line
displayName = "ubuntu-base"
memsize = "1024"
"#;

    #[test]
    fn test_get_existing_keys() {
        let vmx = VmxFile::parse(SAMPLE);
        assert_eq!(vmx.get("displayName").as_deref(), Some("ubuntu-base"));
        assert_eq!(vmx.get("MEMSIZE").as_deref(), Some("1024"));
        assert_eq!(vmx.get("numvcpus"), None);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut vmx = VmxFile::parse(SAMPLE);
        vmx.set(DISPLAY_NAME_KEY, "instance-1");
        let rendered = vmx.render();
        assert!(rendered.contains("displayName = \"instance-1\""));
        assert!(!rendered.contains("ubuntu-base"));
        assert!(rendered.contains("# comment line"));
        assert!(rendered.starts_with(".encoding = \"UTF-8\""));
    }

    #[test]
    fn test_set_appends_missing_key() {
        let mut vmx = VmxFile::parse(SAMPLE);
        vmx.set(NUM_VCPUS_KEY, "2");
        assert!(vmx.render().ends_with("numvcpus = \"2\"\n"));
        assert_eq!(vmx.get(NUM_VCPUS_KEY).as_deref(), Some("2"));
    }

    #[test]
    fn test_escaped_utf8_bytes_decode_as_one_character() {
        let vmx = VmxFile::parse("displayName = \"caf|C3|A9 |7C ok|\"\n");
        assert_eq!(vmx.get(DISPLAY_NAME_KEY).as_deref(), Some("café | ok|"));
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let mut vmx = VmxFile::default();
        vmx.set(DISPLAY_NAME_KEY, "say \"hi\" | #1");
        let rendered = vmx.render();
        assert!(rendered.contains("|22hi|22"));
        assert!(rendered.contains("|7C"));
        assert!(rendered.contains("|23"));
        assert_eq!(
            vmx.get(DISPLAY_NAME_KEY).as_deref(),
            Some("say \"hi\" | #1")
        );
    }

    #[tokio::test]
    async fn test_update_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vm.vmx");
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        update(&path, MEMORY_SIZE_KEY, "512").await.unwrap();

        let reloaded = VmxFile::load(&path).await.unwrap();
        assert_eq!(reloaded.get(MEMORY_SIZE_KEY).as_deref(), Some("512"));
        assert_eq!(reloaded.get(DISPLAY_NAME_KEY).as_deref(), Some("ubuntu-base"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = VmxFile::load(&dir.path().join("missing.vmx")).await;
        assert!(matches!(result, Err(HostError::Io { .. })));
    }
}
