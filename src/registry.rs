#[cfg(test)]
use std::collections::HashMap;

/// Read-only `key -> field -> string` lookup, shaped after the Windows registry.
///
/// Keys use the full hive path, e.g. `HKEY_LOCAL_MACHINE\SOFTWARE\Kingsoft\cbjq`.
pub trait RegistryLookup {
    fn get(&self, key: &str, field: &str) -> Option<String>;

    fn describe(&self) -> String {
        "registry".to_string()
    }
}

impl<T: RegistryLookup + ?Sized> RegistryLookup for Box<T> {
    fn get(&self, key: &str, field: &str) -> Option<String> {
        (**self).get(key, field)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// In-memory lookup for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    values: HashMap<(String, String), String>,
}

#[cfg(test)]
impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, field: &str, value: impl Into<String>) -> Self {
        self.insert(key, field, value);
        self
    }

    pub fn insert(&mut self, key: &str, field: &str, value: impl Into<String>) {
        self.values
            .insert((key.to_ascii_lowercase(), field.to_ascii_lowercase()), value.into());
    }
}

#[cfg(test)]
impl RegistryLookup for StaticRegistry {
    fn get(&self, key: &str, field: &str) -> Option<String> {
        self.values
            .get(&(key.to_ascii_lowercase(), field.to_ascii_lowercase()))
            .cloned()
    }

    fn describe(&self) -> String {
        "static values".to_string()
    }
}

/// Splits `HKEY_LOCAL_MACHINE\SOFTWARE\...` into the hive name and the subkey.
pub fn split_hive(key: &str) -> (&str, &str) {
    match key.split_once('\\') {
        Some((hive, subkey)) => (hive, subkey),
        None => (key, ""),
    }
}

/// The 32-bit view of a `SOFTWARE\...` subkey, if it has one.
pub fn wow64_subkey(subkey: &str) -> Option<String> {
    let (root, rest) = subkey.split_once('\\')?;
    if !root.eq_ignore_ascii_case("SOFTWARE") || rest.to_ascii_lowercase().starts_with("wow6432node") {
        return None;
    }
    Some(format!("{root}\\WOW6432Node\\{rest}"))
}

#[cfg(windows)]
pub use windows::WindowsRegistry;

#[cfg(windows)]
mod windows {
    use super::{split_hive, wow64_subkey, RegistryLookup};
    use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE};
    use winreg::RegKey;

    /// The live Windows registry.
    #[derive(Debug, Default)]
    pub struct WindowsRegistry;

    impl WindowsRegistry {
        fn read(hive: &RegKey, subkey: &str, field: &str) -> Option<String> {
            let key = hive.open_subkey(subkey).ok()?;
            key.get_value::<String, _>(field).ok()
        }
    }

    impl RegistryLookup for WindowsRegistry {
        fn get(&self, key: &str, field: &str) -> Option<String> {
            let (hive_name, subkey) = split_hive(key);
            let hive = match hive_name.to_ascii_uppercase().as_str() {
                "HKEY_LOCAL_MACHINE" | "HKLM" => RegKey::predef(HKEY_LOCAL_MACHINE),
                "HKEY_CURRENT_USER" | "HKCU" => RegKey::predef(HKEY_CURRENT_USER),
                _ => return None,
            };

            // Native view first, then the 32-bit view
            Self::read(&hive, subkey, field).or_else(|| {
                let wow = wow64_subkey(subkey)?;
                Self::read(&hive, &wow, field)
            })
        }

        fn describe(&self) -> String {
            "Windows registry".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_registry_is_case_insensitive() {
        let reg = StaticRegistry::new().with(r"HKEY_LOCAL_MACHINE\SOFTWARE\Kingsoft\cbjq", "InstallPath", "D:/Snow");
        assert_eq!(
            reg.get(r"hkey_local_machine\software\kingsoft\CBJQ", "installpath").as_deref(),
            Some("D:/Snow")
        );
        assert_eq!(reg.get(r"HKEY_LOCAL_MACHINE\SOFTWARE\Kingsoft", "InstallPath"), None);
    }

    #[test]
    fn hive_split_and_wow64_view() {
        assert_eq!(
            split_hive(r"HKEY_LOCAL_MACHINE\SOFTWARE\Kingsoft\cbjq"),
            ("HKEY_LOCAL_MACHINE", r"SOFTWARE\Kingsoft\cbjq")
        );
        assert_eq!(
            wow64_subkey(r"SOFTWARE\Kingsoft\cbjq").as_deref(),
            Some(r"SOFTWARE\WOW6432Node\Kingsoft\cbjq")
        );
        assert_eq!(wow64_subkey(r"SOFTWARE\WOW6432Node\Kingsoft"), None);
        assert_eq!(wow64_subkey(r"SYSTEM\Foo"), None);
    }
}
