use super::docs::{apply_doc_markers, doc_text, rename_case, serde_attrs, wants_json};
use crate::schemas::tool_schema::{Properties, PropertySchema, SchemaType};
use quote::ToTokens;
use serde_json::Value;
use std::collections::HashMap;
use syn::{
    Expr, ExprLit, Fields, File, GenericArgument, Item, ItemEnum, ItemStruct, ItemType, Lit,
    PathArguments, Type, TypePath, UnOp, Visibility,
};
use tracing::trace;

const MAX_DEPTH: usize = 8;

/// Exported named types of one source file, keyed by identifier.
#[derive(Default)]
pub(crate) struct TypeTables<'a> {
    structs: HashMap<String, &'a ItemStruct>,
    aliases: HashMap<String, &'a ItemType>,
    enums: HashMap<String, &'a ItemEnum>,
}

fn is_exported(vis: &Visibility) -> bool {
    matches!(vis, Visibility::Public(_))
}

impl<'a> TypeTables<'a> {
    pub(crate) fn from_file(file: &'a File) -> Self {
        let mut tables = TypeTables::default();
        for item in &file.items {
            match item {
                Item::Struct(item) if is_exported(&item.vis) => {
                    tables.structs.insert(item.ident.to_string(), item);
                }
                Item::Type(item) if is_exported(&item.vis) => {
                    tables.aliases.insert(item.ident.to_string(), item);
                }
                Item::Enum(item) if is_exported(&item.vis) => {
                    tables.enums.insert(item.ident.to_string(), item);
                }
                _ => {}
            }
        }
        tables
    }

    /// Names a struct or alias whose shape is an object with members.
    pub(crate) fn object_reference(&self, ty: &Type) -> Option<PropertySchema> {
        let name = last_ident(strip_wrappers(ty))?;
        if !self.structs.contains_key(&name) && !self.aliases.contains_key(&name) {
            return None;
        }
        let schema = self.named(&name, 0);
        schema.is_object().then_some(schema)
    }

    fn named(&self, name: &str, depth: usize) -> PropertySchema {
        if depth > MAX_DEPTH {
            return PropertySchema::object();
        }
        if let Some(item) = self.structs.get(name) {
            return self.struct_schema(item, depth + 1);
        }
        if let Some(item) = self.aliases.get(name) {
            return self.resolve(&item.ty, "", depth + 1);
        }
        if let Some(item) = self.enums.get(name) {
            return enum_schema(item);
        }
        PropertySchema::string()
    }

    fn struct_schema(&self, item: &ItemStruct, depth: usize) -> PropertySchema {
        let Fields::Named(fields) = &item.fields else {
            return PropertySchema::object();
        };
        let container = serde_attrs(&item.attrs);
        let mut properties = Properties::new();
        let mut required = Vec::new();

        for field in &fields.named {
            let Some(ident) = &field.ident else { continue };
            let attrs = serde_attrs(&field.attrs);
            if attrs.skip {
                continue;
            }
            let raw_name = ident.to_string().trim_start_matches("r#").to_string();
            let name = match (&attrs.rename, &container.rename_all) {
                (Some(rename), _) => rename.clone(),
                (None, Some(rule)) => rename_case(&raw_name, rule, false),
                (None, None) => raw_name,
            };

            let doc = doc_text(&field.attrs);
            let mut property = self.resolve(&field.ty, &doc, depth);
            if !doc.is_empty() {
                property.description = Some(doc.clone());
                apply_doc_markers(&mut property, &doc);
            }
            if !is_option(&field.ty) && !attrs.default && !container.default {
                required.push(name.clone());
            }
            properties.insert(name, property);
        }

        PropertySchema {
            schema_type: Some(SchemaType::Object),
            properties,
            required,
            ..PropertySchema::default()
        }
    }

    /// Schema for a type annotation. Never fails: unknown shapes degrade to
    /// `object` (dynamic) or `string` (anything else).
    pub(crate) fn resolve(&self, ty: &Type, doc: &str, depth: usize) -> PropertySchema {
        if wants_json(doc) {
            return PropertySchema::object();
        }
        if depth > MAX_DEPTH {
            return PropertySchema::object();
        }
        match ty {
            Type::Reference(reference) => self.resolve(&reference.elem, "", depth),
            Type::Paren(paren) => self.resolve(&paren.elem, "", depth),
            Type::Group(group) => self.resolve(&group.elem, "", depth),
            Type::Slice(slice) => PropertySchema::array(self.resolve(&slice.elem, "", depth + 1)),
            Type::Array(array) => PropertySchema::array(self.resolve(&array.elem, "", depth + 1)),
            Type::Tuple(tuple) if tuple.elems.len() == 1 => {
                self.resolve(&tuple.elems[0], "", depth)
            }
            Type::Tuple(_) | Type::ImplTrait(_) | Type::TraitObject(_) => PropertySchema::object(),
            Type::Path(path) => self.resolve_path(path, depth),
            _ => PropertySchema::string(),
        }
    }

    fn resolve_path(&self, path: &TypePath, depth: usize) -> PropertySchema {
        let Some(segment) = path.path.segments.last() else {
            return PropertySchema::string();
        };
        let name = segment.ident.to_string();
        let argument = first_type_argument(&segment.arguments);

        match name.as_str() {
            "Option" | "Box" | "Arc" | "Rc" => argument
                .map(|inner| self.resolve(inner, "", depth))
                .unwrap_or_else(PropertySchema::string),
            "String" | "str" | "char" | "Cow" | "PathBuf" | "Path" | "OsString" => {
                PropertySchema::string()
            }
            "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
            | "u128" | "usize" => PropertySchema::of_type(SchemaType::Integer),
            "f32" | "f64" => PropertySchema::of_type(SchemaType::Number),
            "bool" => PropertySchema::of_type(SchemaType::Boolean),
            "Vec" | "VecDeque" | "HashSet" | "BTreeSet" | "LinkedList" => {
                PropertySchema::array(
                    argument
                        .map(|inner| self.resolve(inner, "", depth + 1))
                        .unwrap_or_else(PropertySchema::string),
                )
            }
            "Value" | "Map" | "HashMap" | "BTreeMap" => PropertySchema::object(),
            _ if self.enums.contains_key(&name)
                || self.structs.contains_key(&name)
                || self.aliases.contains_key(&name) =>
            {
                self.named(&name, depth + 1)
            }
            _ => {
                trace!(
                    target: "agentic_tools::extract",
                    ty = %path.to_token_stream(),
                    "unknown type, using string"
                );
                PropertySchema::string()
            }
        }
    }
}

fn first_type_argument(arguments: &PathArguments) -> Option<&Type> {
    match arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(ty) => Some(ty),
            _ => None,
        }),
        _ => None,
    }
}

/// Peel references, parentheses and smart pointers.
pub(crate) fn strip_wrappers(ty: &Type) -> &Type {
    match ty {
        Type::Reference(reference) => strip_wrappers(&reference.elem),
        Type::Paren(paren) => strip_wrappers(&paren.elem),
        Type::Group(group) => strip_wrappers(&group.elem),
        Type::Path(path) => {
            let Some(segment) = path.path.segments.last() else {
                return ty;
            };
            match segment.ident.to_string().as_str() {
                "Box" | "Arc" | "Rc" => first_type_argument(&segment.arguments)
                    .map(strip_wrappers)
                    .unwrap_or(ty),
                _ => ty,
            }
        }
        _ => ty,
    }
}

fn last_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

pub(crate) fn is_option(ty: &Type) -> bool {
    matches!(last_ident(strip_wrappers(ty)).as_deref(), Some("Option"))
}

/// Unit-variant enums become literal enums; anything carrying data is an
/// open object.
fn enum_schema(item: &ItemEnum) -> PropertySchema {
    if item
        .variants
        .iter()
        .any(|variant| !matches!(variant.fields, Fields::Unit))
    {
        return PropertySchema::object();
    }
    let container = serde_attrs(&item.attrs);
    let mut values: Vec<Value> = item
        .variants
        .iter()
        .map(|variant| {
            if let Some((_, discriminant)) = &variant.discriminant {
                if let Some(number) = integer_literal(discriminant) {
                    return Value::from(number);
                }
            }
            let attrs = serde_attrs(&variant.attrs);
            let ident = variant.ident.to_string();
            Value::String(match (attrs.rename, &container.rename_all) {
                (Some(rename), _) => rename,
                (None, Some(rule)) => rename_case(&ident, rule, true),
                (None, None) => ident,
            })
        })
        .collect();

    if !values.iter().all(Value::is_number) {
        values = values
            .into_iter()
            .map(|value| match value {
                Value::Number(number) => Value::String(number.to_string()),
                other => other,
            })
            .collect();
    }
    PropertySchema::enumeration(values)
}

fn integer_literal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(lit), ..
        }) => lit.base10_parse().ok(),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => {
            integer_literal(&unary.expr).map(|value| -value)
        }
        _ => None,
    }
}
