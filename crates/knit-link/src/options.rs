use serde::{Deserialize, Serialize};

/// Switches of the linker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompilerOptions {
    /// Report mount name conflicts between user definitions.
    pub mount_conflict_error: bool,
    /// Report user entities mounted at reserved system names, only when
    /// `mount_conflict_error` is set as well.
    pub mount_conflict_system: bool,
    /// Editor mode, skips the final sweep for missing overrides.
    pub ide: bool,
    /// Reserved mount names besides `block`, `transaction` and `sys.*`.
    pub system_mount_names: Vec<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            mount_conflict_error: true,
            mount_conflict_system: true,
            ide: false,
            system_mount_names: Vec::new(),
        }
    }
}

impl CompilerOptions {
    /// Whether `mount` is reserved for system definitions.
    pub fn is_system_mount(&self, mount: &str) -> bool {
        mount == "block"
            || mount == "transaction"
            || mount.split('.').next() == Some("sys")
            || self.system_mount_names.iter().any(|name| name == mount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let options: CompilerOptions = serde_json::from_str(r#"{ "ide": true }"#).unwrap();

        assert!(options.ide);
        assert!(options.mount_conflict_error);
        assert!(options.system_mount_names.is_empty());
    }

    #[test]
    fn reserved_mount_names() {
        let options = CompilerOptions {
            system_mount_names: vec!["app.config".into()],
            ..Default::default()
        };

        assert!(options.is_system_mount("block"));
        assert!(options.is_system_mount("sys"));
        assert!(options.is_system_mount("sys.info"));
        assert!(!options.is_system_mount("sys_info"));
        assert!(options.is_system_mount("app.config"));
        assert!(!options.is_system_mount("app.sys"));
        assert!(!options.is_system_mount("blocks"));
    }
}
