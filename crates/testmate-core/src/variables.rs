//! Variable substitution for executable names, working directories and
//! environments
//!
//! Templates reference `${token}` variables. Substitution is verbatim and
//! applied pair by pair, so when two tokens overlap the earlier pair wins.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

static UNRESOLVED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{.*\}").expect("static regex is valid")
});

/// Ordered `(token, value)` substitution pairs
pub type VariableList = Vec<(String, String)>;

/// Replace every occurrence of each token with its value, in list order
pub fn resolve_variables(source: &str, variables: &[(String, String)]) -> String {
    variables
        .iter()
        .fold(source.to_string(), |acc, (token, value)| {
            acc.replace(token.as_str(), value)
        })
}

/// Resolve every value of an environment map
pub fn resolve_env(
    env: &IndexMap<String, String>,
    variables: &[(String, String)],
) -> IndexMap<String, String> {
    env.iter()
        .map(|(key, value)| (key.clone(), resolve_variables(value, variables)))
        .collect()
}

/// True if the string still contains something that looks like `${...}`
pub fn has_unresolved(resolved: &str) -> bool {
    UNRESOLVED.is_match(resolved)
}

/// Workspace-level variables that precede the per-file ones
pub fn workspace_variables(workspace: &Path) -> VariableList {
    let name = workspace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    vec![
        (
            "${workspaceFolder}".to_string(),
            workspace.to_string_lossy().into_owned(),
        ),
        ("${workspaceName}".to_string(), name),
    ]
}

/// Split a file name at its last extension dot
///
/// A leading dot does not start an extension, so `.profile` has none.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Path variables of one discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVariables {
    pub abs_path: String,
    pub rel_path: String,
    pub abs_dirpath: String,
    pub rel_dirpath: String,
    pub filename: String,
    pub ext_filename: String,
    pub base_filename: String,
    pub ext2_filename: String,
    pub base2_filename: String,
    pub ext3_filename: String,
    pub base3_filename: String,
}

impl FileVariables {
    /// Compute the variables of `file` relative to `workspace`
    pub fn new(workspace: &Path, file: &Path) -> Self {
        let rel = relative_path(workspace, file);
        let rel_dir = match rel.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
            _ => ".".to_string(),
        };
        let abs_dir = file
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let filename = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (base, ext) = split_extension(&filename);
        let (base2, ext2) = split_extension(base);
        let (base3, ext3) = split_extension(base2);

        Self {
            abs_path: file.to_string_lossy().into_owned(),
            rel_path: rel.to_string_lossy().into_owned(),
            abs_dirpath: abs_dir,
            rel_dirpath: rel_dir,
            ext_filename: ext.to_string(),
            base_filename: base.to_string(),
            ext2_filename: ext2.to_string(),
            base2_filename: base2.to_string(),
            ext3_filename: ext3.to_string(),
            base3_filename: base3.to_string(),
            filename,
        }
    }

    /// Token/value pairs for [`resolve_variables`]
    pub fn to_variables(&self) -> VariableList {
        [
            ("${absPath}", &self.abs_path),
            ("${relPath}", &self.rel_path),
            ("${absDirpath}", &self.abs_dirpath),
            ("${relDirpath}", &self.rel_dirpath),
            ("${filename}", &self.filename),
            ("${extFilename}", &self.ext_filename),
            ("${baseFilename}", &self.base_filename),
            ("${ext2Filename}", &self.ext2_filename),
            ("${base2Filename}", &self.base2_filename),
            ("${ext3Filename}", &self.ext3_filename),
            ("${base3Filename}", &self.base3_filename),
        ]
        .into_iter()
        .map(|(token, value)| (token.to_string(), value.clone()))
        .collect()
    }
}

/// Path of `file` relative to `base`, walking up with `..` when needed
pub fn relative_path(base: &Path, file: &Path) -> PathBuf {
    if let Ok(stripped) = file.strip_prefix(base) {
        return stripped.to_path_buf();
    }

    let base_components: Vec<Component> = base.components().collect();
    let file_components: Vec<Component> = file.components().collect();
    let common = base_components
        .iter()
        .zip(file_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base_components.len() {
        rel.push("..");
    }
    for component in &file_components[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

/// Lexically normalize a path, folding `.` and `..` components
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> VariableList {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_replaces_every_occurrence() {
        let v = vars(&[("${filename}", "t.exe")]);
        assert_eq!(
            resolve_variables("${filename} and ${filename}", &v),
            "t.exe and t.exe"
        );
    }

    #[test]
    fn test_earlier_pairs_win() {
        let v = vars(&[("${a}", "first"), ("${a}", "second")]);
        assert_eq!(resolve_variables("${a}", &v), "first");
    }

    #[test]
    fn test_unresolved_detection() {
        let v = vars(&[("${filename}", "t.exe")]);
        let resolved = resolve_variables("${filename} ${unknown}", &v);
        assert_eq!(resolved, "t.exe ${unknown}");
        assert!(has_unresolved(&resolved));
    }

    #[test]
    fn test_round_trip_leaves_no_tokens() {
        let file_vars = FileVariables::new(Path::new("/ws"), Path::new("/ws/build/a.b.c.exe"));
        let template = file_vars
            .to_variables()
            .iter()
            .map(|(token, _)| token.clone())
            .collect::<Vec<_>>()
            .join("|");
        let resolved = resolve_variables(&template, &file_vars.to_variables());
        assert!(!has_unresolved(&resolved));
    }

    #[test]
    fn test_extension_levels() {
        let v = FileVariables::new(Path::new("/ws"), Path::new("/ws/build/a.b.c.exe"));
        assert_eq!(v.filename, "a.b.c.exe");
        assert_eq!(v.ext_filename, ".exe");
        assert_eq!(v.base_filename, "a.b.c");
        assert_eq!(v.ext2_filename, ".c");
        assert_eq!(v.base2_filename, "a.b");
        assert_eq!(v.ext3_filename, ".b");
        assert_eq!(v.base3_filename, "a");
    }

    #[test]
    fn test_extension_levels_run_out() {
        let v = FileVariables::new(Path::new("/ws"), Path::new("/ws/tests1"));
        assert_eq!(v.ext_filename, "");
        assert_eq!(v.base_filename, "tests1");
        assert_eq!(v.ext3_filename, "");
        assert_eq!(v.base3_filename, "tests1");

        let v = FileVariables::new(Path::new("/ws"), Path::new("/ws/.hidden"));
        assert_eq!(v.ext_filename, "");
        assert_eq!(v.base_filename, ".hidden");
    }

    #[test]
    fn test_path_variables() {
        let v = FileVariables::new(Path::new("/ws"), Path::new("/ws/build/debug/t.exe"));
        assert_eq!(v.abs_path, "/ws/build/debug/t.exe");
        assert_eq!(v.rel_path, "build/debug/t.exe");
        assert_eq!(v.abs_dirpath, "/ws/build/debug");
        assert_eq!(v.rel_dirpath, "build/debug");

        let v = FileVariables::new(Path::new("/ws"), Path::new("/ws/t.exe"));
        assert_eq!(v.rel_dirpath, ".");
    }

    #[test]
    fn test_relative_path_outside_base() {
        assert_eq!(
            relative_path(Path::new("/ws/project"), Path::new("/opt/bin/t")),
            PathBuf::from("../../opt/bin/t")
        );
    }

    #[test]
    fn test_resolve_env() {
        let mut env = IndexMap::new();
        env.insert("DIR".to_string(), "${absDirpath}/data".to_string());
        let v = vars(&[("${absDirpath}", "/ws/build")]);
        let resolved = resolve_env(&env, &v);
        assert_eq!(resolved.get("DIR").map(String::as_str), Some("/ws/build/data"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("/ws/./build/../out")), PathBuf::from("/ws/out"));
        assert_eq!(normalize_path(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_workspace_variables() {
        let v = workspace_variables(Path::new("/home/me/project"));
        assert_eq!(resolve_variables("${workspaceName}", &v), "project");
        assert_eq!(resolve_variables("${workspaceFolder}", &v), "/home/me/project");
    }
}
