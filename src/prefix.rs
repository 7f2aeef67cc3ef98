//! Wine prefix access for non-Windows hosts.
//!
//! The game and its launchers are Windows programs; on Linux they live in a
//! Wine prefix. The registry they write lands in `system.reg`/`user.reg`, and
//! every `X:\` path they record resolves through `dosdevices/x:`.

use crate::planner::PathRenderer;
use crate::registry::{split_hive, wow64_subkey, RegistryLookup};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct WinePrefix {
    pub path: PathBuf,
}

impl WinePrefix {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$WINEPREFIX`, falling back to `~/.wine`.
    pub fn from_env() -> Option<Self> {
        if let Some(prefix) = std::env::var_os("WINEPREFIX") {
            return Some(Self::new(prefix));
        }
        dirs::home_dir().map(|home| Self::new(home.join(".wine")))
    }

    pub fn exists(&self) -> bool {
        self.path.join("system.reg").is_file()
    }

    fn dosdevices(&self) -> PathBuf {
        self.path.join("dosdevices")
    }

    /// Maps `C:\Program Files\Snow` to `<prefix>/dosdevices/c:/Program Files/Snow`.
    /// Values that are not drive paths come back unchanged.
    pub fn to_host_path(&self, value: &str) -> String {
        let bytes = value.as_bytes();
        let is_drive_path = bytes.len() >= 2
            && bytes[0].is_ascii_alphabetic()
            && bytes[1] == b':'
            && (bytes.len() == 2 || bytes[2] == b'\\' || bytes[2] == b'/');
        if !is_drive_path {
            return value.to_string();
        }

        let drive = format!("{}:", (bytes[0] as char).to_ascii_lowercase());
        let mut host = self.dosdevices().join(drive);
        for part in value[2..].split(['\\', '/']).filter(|p| !p.is_empty()) {
            host.push(part);
        }
        host.to_string_lossy().into_owned()
    }

    /// Renders a host path the way a program inside the prefix sees it.
    pub fn to_windows_path(&self, host: &Path) -> String {
        let (drive, rest) = if let Ok(rest) = host.strip_prefix(self.dosdevices()) {
            let mut components = rest.components();
            let drive = components
                .next()
                .map(|c| c.as_os_str().to_string_lossy().to_ascii_uppercase())
                .unwrap_or_else(|| "Z:".to_string());
            (drive, components.as_path().to_path_buf())
        } else if let Ok(rest) = host.strip_prefix(self.path.join("drive_c")) {
            ("C:".to_string(), rest.to_path_buf())
        } else {
            let rest = host.strip_prefix("/").unwrap_or(host);
            ("Z:".to_string(), rest.to_path_buf())
        };

        let tail = rest
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\\");
        format!("{drive}\\{tail}")
    }

    /// `%LocalAppData%` of the prefix user.
    pub fn local_app_data(&self) -> PathBuf {
        let users = self.path.join("drive_c").join("users");
        let current = std::env::var("USER").unwrap_or_else(|_| "steamuser".to_string());

        let user = if users.join(&current).is_dir() {
            current
        } else {
            fs::read_dir(&users)
                .ok()
                .and_then(|entries| {
                    entries
                        .flatten()
                        .filter(|e| e.path().is_dir())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .find(|name| !name.eq_ignore_ascii_case("Public"))
                })
                .unwrap_or(current)
        };

        users.join(user).join("AppData").join("Local")
    }

    pub fn registry(&self) -> WineRegistry {
        WineRegistry::load(self.clone())
    }
}

impl PathRenderer for WinePrefix {
    fn render(&self, path: &Path) -> String {
        self.to_windows_path(path)
    }

    fn to_host(&self, rendered: &str) -> PathBuf {
        PathBuf::from(self.to_host_path(rendered))
    }
}

/// Registry view backed by the prefix's `.reg` files, with drive paths mapped to the host.
#[derive(Debug, Clone)]
pub struct WineRegistry {
    prefix: WinePrefix,
    machine: HashMap<(String, String), String>,
    user: HashMap<(String, String), String>,
}

impl WineRegistry {
    pub fn load(prefix: WinePrefix) -> Self {
        let machine = read_hive(&prefix.path.join("system.reg"));
        let user = read_hive(&prefix.path.join("user.reg"));
        debug!(
            "Loaded Wine registry from {} ({} machine values, {} user values)",
            prefix.path.display(),
            machine.len(),
            user.len()
        );
        Self { prefix, machine, user }
    }

    fn lookup(&self, hive: &HashMap<(String, String), String>, subkey: &str, field: &str) -> Option<String> {
        hive.get(&(subkey.to_ascii_lowercase(), field.to_ascii_lowercase()))
            .cloned()
    }
}

impl RegistryLookup for WineRegistry {
    fn get(&self, key: &str, field: &str) -> Option<String> {
        let (hive_name, subkey) = split_hive(key);
        let hive = match hive_name.to_ascii_uppercase().as_str() {
            "HKEY_LOCAL_MACHINE" | "HKLM" => &self.machine,
            "HKEY_CURRENT_USER" | "HKCU" => &self.user,
            _ => return None,
        };

        let value = self.lookup(hive, subkey, field).or_else(|| {
            let wow = wow64_subkey(subkey)?;
            self.lookup(hive, &wow, field)
        })?;

        Some(self.prefix.to_host_path(&value))
    }

    fn describe(&self) -> String {
        format!("Wine registry ({})", self.prefix.path.display())
    }
}

fn read_hive(path: &Path) -> HashMap<(String, String), String> {
    let parsed = fs::read_to_string(path).map_err(|e| e.to_string()).and_then(|content| {
        parse_reg(&content).map_err(|e| e.to_string())
    });
    match parsed {
        Ok(values) => values,
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            HashMap::new()
        }
    }
}

/// Parses the string values of a Wine `.reg` file into `(key, field) -> value`,
/// keys and fields lowercased.
pub fn parse_reg(content: &str) -> Result<HashMap<(String, String), String>, regex::Error> {
    let value_line = Regex::new(r#"^"((?:[^"\\]|\\.)*)"=(?:str\(2\):)?"((?:[^"\\]|\\.)*)"\s*$"#)?;
    let mut values = HashMap::new();
    let mut current_key: Option<String> = None;

    for line in content.lines() {
        let line = line.trim_end();

        if let Some(header) = line.strip_prefix('[') {
            current_key = header
                .rfind(']')
                .map(|end| unescape(&header[..end]).to_ascii_lowercase());
            continue;
        }

        let Some(key) = current_key.as_ref() else {
            continue;
        };

        if let Some(caps) = value_line.captures(line) {
            let field = unescape(&caps[1]).to_ascii_lowercase();
            let value = unescape(&caps[2]);
            values.insert((key.clone(), field), value);
        }
    }

    Ok(values)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
