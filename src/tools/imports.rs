use syn::{Item, UseTree};

/// One local name brought in by a `use` declaration of the crate's own
/// modules (`crate::`, `self::`, `super::`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Absolute module path, e.g. `crate::weather`.
    pub module: String,
    /// Imported item; `None` for a glob.
    pub imported: Option<String>,
    /// Name visible in the importing module.
    pub local: String,
}

impl ImportEntry {
    /// The path of the imported item itself, which may name a module.
    pub fn item_path(&self) -> Option<String> {
        self.imported
            .as_ref()
            .map(|imported| format!("{}::{}", self.module, imported))
    }
}

/// Collect local imports of `source`, whose own module path is `module_path`.
/// External crates and unparsable sources yield nothing.
pub fn parse_imports(source: &str, module_path: &str) -> Vec<ImportEntry> {
    let Ok(file) = syn::parse_file(source) else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for item in &file.items {
        if let Item::Use(item) = item {
            walk(&item.tree, Vec::new(), module_path, &mut entries);
        }
    }
    entries
}

fn walk(tree: &UseTree, prefix: Vec<String>, module_path: &str, out: &mut Vec<ImportEntry>) {
    match tree {
        UseTree::Path(path) => {
            let mut next = prefix;
            next.push(path.ident.to_string());
            walk(&path.tree, next, module_path, out);
        }
        UseTree::Name(name) => {
            let ident = name.ident.to_string();
            if ident == "self" {
                push_module_import(&prefix, module_path, out);
            } else {
                push(&prefix, Some(ident.clone()), ident, module_path, out);
            }
        }
        UseTree::Rename(rename) => {
            let ident = rename.ident.to_string();
            let local = rename.rename.to_string();
            if ident == "self" {
                if let Some((module, last)) = split_last(&prefix) {
                    push(module, Some(last.to_string()), local, module_path, out);
                }
            } else {
                push(&prefix, Some(ident), local, module_path, out);
            }
        }
        UseTree::Glob(_) => push(&prefix, None, "*".to_string(), module_path, out),
        UseTree::Group(group) => {
            for item in &group.items {
                walk(item, prefix.clone(), module_path, out);
            }
        }
    }
}

fn split_last(segments: &[String]) -> Option<(&[String], &str)> {
    let (last, rest) = segments.split_last()?;
    Some((rest, last.as_str()))
}

fn push_module_import(prefix: &[String], module_path: &str, out: &mut Vec<ImportEntry>) {
    if let Some((module, last)) = split_last(prefix) {
        push(module, Some(last.to_string()), last.to_string(), module_path, out);
    }
}

fn push(
    prefix: &[String],
    imported: Option<String>,
    local: String,
    module_path: &str,
    out: &mut Vec<ImportEntry>,
) {
    if let Some(module) = absolute_module(prefix, module_path) {
        out.push(ImportEntry {
            module,
            imported,
            local,
        });
    }
}

/// Resolve `crate::`/`self::`/`super::` prefixes against the importing
/// module. Anything else names another crate.
fn absolute_module(prefix: &[String], module_path: &str) -> Option<String> {
    let (first, rest) = prefix.split_first()?;
    let mut base: Vec<String> = match first.as_str() {
        "crate" => vec!["crate".to_string()],
        "self" => module_path.split("::").map(str::to_string).collect(),
        "super" => {
            let mut base: Vec<String> = module_path.split("::").map(str::to_string).collect();
            base.pop();
            base
        }
        _ => return None,
    };
    let mut rest = rest;
    if first == "super" {
        while let Some((next, tail)) = rest.split_first() {
            if next != "super" {
                break;
            }
            base.pop();
            rest = tail;
        }
    }
    if base.is_empty() {
        return None;
    }
    base.extend(rest.iter().cloned());
    Some(base.join("::"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_imports_with_aliases_groups_and_globs() {
        let source = r#"
            use std::collections::HashMap;
            use crate::weather::{forecast, alerts as warnings};
            use super::math::*;
            use self::helpers::shout;
            use crate::geo;
        "#;
        let entries = parse_imports(source, "crate::app");
        assert_eq!(
            entries,
            vec![
                ImportEntry {
                    module: "crate::weather".into(),
                    imported: Some("forecast".into()),
                    local: "forecast".into()
                },
                ImportEntry {
                    module: "crate::weather".into(),
                    imported: Some("alerts".into()),
                    local: "warnings".into()
                },
                ImportEntry {
                    module: "crate::math".into(),
                    imported: None,
                    local: "*".into()
                },
                ImportEntry {
                    module: "crate::app::helpers".into(),
                    imported: Some("shout".into()),
                    local: "shout".into()
                },
                ImportEntry {
                    module: "crate".into(),
                    imported: Some("geo".into()),
                    local: "geo".into()
                },
            ]
        );
        assert_eq!(entries[4].item_path().as_deref(), Some("crate::geo"));
    }

    #[test]
    fn nested_super_walks_up() {
        let entries = parse_imports("use super::super::shared::ping;", "crate::a::b");
        assert_eq!(entries[0].module, "crate::shared");
    }
}
