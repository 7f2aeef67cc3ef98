use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sectioned `key=value` file edited in place.
///
/// Lookups are case-insensitive and every call goes back to disk, so edits made
/// by the game between calls are never clobbered. Lines that are not touched by
/// a write (comments, unknown sections, ordering) are preserved verbatim.
#[derive(Debug, Clone)]
pub struct IniFile {
    path: PathBuf,
}

impl IniFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when the file, the section or the key is missing.
    pub fn read(&self, section: &str, key: &str) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;
        let lines: Vec<&str> = content.lines().collect();
        let (start, end) = section_bounds(&lines, section)?;

        lines[start..end].iter().find_map(|line| {
            let (name, value) = split_entry(line)?;
            name.eq_ignore_ascii_case(key).then(|| value.to_string())
        })
    }

    pub fn write(&self, section: &str, key: &str, value: &str) -> io::Result<()> {
        let content = self.read_raw()?;
        let newline = line_ending(&content);
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
        let entry = format!("{key}={value}");

        let borrowed: Vec<&str> = lines.iter().map(String::as_str).collect();
        match section_bounds(&borrowed, section) {
            Some((start, end)) => {
                let existing = (start..end).find(|&idx| {
                    split_entry(&lines[idx])
                        .map(|(name, _)| name.eq_ignore_ascii_case(key))
                        .unwrap_or(false)
                });

                match existing {
                    Some(idx) => lines[idx] = entry,
                    None => {
                        // Keep trailing blank lines between this section and the next
                        let mut insert_at = end;
                        while insert_at > start && lines[insert_at - 1].trim().is_empty() {
                            insert_at -= 1;
                        }
                        lines.insert(insert_at, entry);
                    }
                }
            }
            None => {
                if lines.last().map(|l| !l.trim().is_empty()).unwrap_or(false) {
                    lines.push(String::new());
                }
                lines.push(format!("[{section}]"));
                lines.push(entry);
            }
        }

        self.write_lines(&lines, newline)
    }

    pub fn delete_key(&self, section: &str, key: &str) -> io::Result<()> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let newline = line_ending(&content);
        let mut lines: Vec<String> = content.lines().map(str::to_string).collect();

        let borrowed: Vec<&str> = lines.iter().map(String::as_str).collect();
        let Some((start, end)) = section_bounds(&borrowed, section) else {
            return Ok(());
        };

        let target = (start..end).find(|&idx| {
            split_entry(&lines[idx])
                .map(|(name, _)| name.eq_ignore_ascii_case(key))
                .unwrap_or(false)
        });

        match target {
            Some(idx) => {
                lines.remove(idx);
                self.write_lines(&lines, newline)
            }
            None => Ok(()),
        }
    }

    fn read_raw(&self) -> io::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    fn write_lines(&self, lines: &[String], newline: &str) -> io::Result<()> {
        let mut out = lines.join(newline);
        out.push_str(newline);
        fs::write(&self.path, out)
    }
}

/// Line range `[start, end)` holding the entries of `section`.
fn section_bounds(lines: &[&str], section: &str) -> Option<(usize, usize)> {
    let header = lines.iter().position(|line| {
        section_name(line)
            .map(|name| name.eq_ignore_ascii_case(section))
            .unwrap_or(false)
    })?;

    let start = header + 1;
    let end = lines[start..]
        .iter()
        .position(|line| section_name(line).is_some())
        .map(|offset| start + offset)
        .unwrap_or(lines.len());

    Some((start, end))
}

/// Windows tools like to start the file with a byte order mark.
const BOM: char = '\u{feff}';

fn section_name(line: &str) -> Option<&str> {
    let trimmed = line.trim_start_matches(BOM).trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() >= 2 {
        Some(trimmed[1..trimmed.len() - 1].trim())
    } else {
        None
    }
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start_matches(BOM).trim();
    if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
        return None;
    }

    let (key, value) = trimmed.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn line_ending(content: &str) -> &'static str {
    if content.contains("\r\n") { "\r\n" } else { "\n" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn ini_with(content: &str) -> (TempDir, IniFile) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Game.ini");
        fs::write(&path, content).unwrap();
        (dir, IniFile::new(path))
    }

    #[test]
    fn read_is_case_insensitive() {
        let (_dir, ini) = ini_with("[Distribution]\nSplashScreen = False\n");
        assert_eq!(ini.read("distribution", "splashscreen").as_deref(), Some("False"));
        assert_eq!(ini.read("Distribution", "Other"), None);
        assert_eq!(ini.read("Missing", "SplashScreen"), None);
    }

    #[test]
    fn read_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let ini = IniFile::new(dir.path().join("nope.ini"));
        assert_eq!(ini.read("cbjq", "GameVersion"), None);
    }

    #[test]
    fn write_replaces_existing_key_and_keeps_other_lines() {
        let (_dir, ini) = ini_with(
            "; generated\n[/Script/Engine.GameSession]\nMaxPlayers=1\n\n[Distribution]\nSplashScreen=True\nRegion=cn\n",
        );
        ini.write("Distribution", "SplashScreen", "False").unwrap();

        let content = fs::read_to_string(ini.path()).unwrap();
        assert_eq!(
            content,
            "; generated\n[/Script/Engine.GameSession]\nMaxPlayers=1\n\n[Distribution]\nSplashScreen=False\nRegion=cn\n"
        );
    }

    #[test]
    fn write_appends_key_before_blank_separator() {
        let (_dir, ini) = ini_with("[Distribution]\nRegion=cn\n\n[Other]\nA=1\n");
        ini.write("Distribution", "SplashScreen", "False").unwrap();

        let content = fs::read_to_string(ini.path()).unwrap();
        assert_eq!(content, "[Distribution]\nRegion=cn\nSplashScreen=False\n\n[Other]\nA=1\n");
    }

    #[test]
    fn write_creates_file_and_section() {
        let dir = TempDir::new().unwrap();
        let ini = IniFile::new(dir.path().join("Game.ini"));
        ini.write("Distribution", "SplashScreen", "False").unwrap();
        assert_eq!(
            fs::read_to_string(ini.path()).unwrap(),
            "[Distribution]\nSplashScreen=False\n"
        );
    }

    #[test]
    fn write_preserves_crlf() {
        let (_dir, ini) = ini_with("[A]\r\nx=1\r\n");
        ini.write("B", "y", "2").unwrap();
        assert_eq!(fs::read_to_string(ini.path()).unwrap(), "[A]\r\nx=1\r\n\r\n[B]\r\ny=2\r\n");
    }

    #[test]
    fn delete_key_only_touches_matching_section() {
        let (_dir, ini) = ini_with("[A]\nSplashScreen=1\n[Distribution]\nSplashScreen=False\n");
        ini.delete_key("Distribution", "SplashScreen").unwrap();
        assert_eq!(fs::read_to_string(ini.path()).unwrap(), "[A]\nSplashScreen=1\n[Distribution]\n");
        assert_eq!(ini.read("A", "SplashScreen").as_deref(), Some("1"));
    }

    #[test]
    fn leading_byte_order_mark_is_ignored_and_kept() {
        let (_dir, ini) = ini_with("\u{feff}[cbjq]\r\nGameVersion=1.7.9\r\n");
        assert_eq!(ini.read("cbjq", "GameVersion").as_deref(), Some("1.7.9"));

        ini.write("cbjq", "GameVersion", "1.8.0").unwrap();
        assert_eq!(
            fs::read_to_string(ini.path()).unwrap(),
            "\u{feff}[cbjq]\r\nGameVersion=1.8.0\r\n"
        );
    }

    #[test]
    fn delete_key_on_missing_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let ini = IniFile::new(dir.path().join("Game.ini"));
        ini.delete_key("Distribution", "SplashScreen").unwrap();
        assert!(!ini.path().exists());
    }
}
