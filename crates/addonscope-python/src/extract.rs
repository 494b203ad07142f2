use std::collections::BTreeMap;

use serde_json::Value;
use tree_sitter::Node;

use addonscope_core::types::{Field, Function, Model};

use crate::literal;
use crate::node_text;

const NAME_ATTR: &str = "_name";
const INHERIT_ATTR: &str = "_inherit";
const INHERITS_ATTR: &str = "_inherits";
const FIELD_FACTORY: &str = "fields";

/// Node kinds adding one decision point to a function.
const BRANCH_KINDS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "case_clause",
    "with_statement",
    "conditional_expression",
    "boolean_operator",
    "for_in_clause",
    "if_clause",
];

/// Statements whose `else` branch is a decision point of its own.
const ELSE_OWNERS: &[&str] = &["for_statement", "while_statement", "try_statement"];

/// Node kinds whose anonymous children are Halstead operators.
const OPERATOR_KINDS: &[&str] = &[
    "binary_operator",
    "unary_operator",
    "not_operator",
    "boolean_operator",
    "comparison_operator",
    "augmented_assignment",
];

/// What a class-body assignment declares.
enum Assignment<'t> {
    NameDecl(Node<'t>),
    InheritDecl(Node<'t>),
    InheritsDecl(Node<'t>),
    FieldDecl { type_tag: String, source_text: String },
    Other,
}

fn classify<'t>(target: &str, value: Node<'t>, source: &[u8]) -> Assignment<'t> {
    match target {
        NAME_ATTR => Assignment::NameDecl(value),
        INHERIT_ATTR => Assignment::InheritDecl(value),
        INHERITS_ATTR => Assignment::InheritsDecl(value),
        _ => field_call(value, source).unwrap_or(Assignment::Other),
    }
}

/// `fields.<Type>(...)` on the right-hand side of an assignment.
fn field_call<'t>(value: Node<'t>, source: &[u8]) -> Option<Assignment<'t>> {
    if value.kind() != "call" {
        return None;
    }
    let function = value.child_by_field_name("function")?;
    if function.kind() != "attribute" {
        return None;
    }
    let receiver = function.child_by_field_name("object")?;
    if receiver.kind() != "identifier" || node_text(receiver, source) != FIELD_FACTORY {
        return None;
    }
    let attribute = function.child_by_field_name("attribute")?;
    Some(Assignment::FieldDecl {
        type_tag: node_text(attribute, source).to_string(),
        source_text: node_text(value, source).to_string(),
    })
}

/// Unwrap a decorated definition to the definition itself.
fn undecorate(node: Node) -> Node {
    if node.kind() == "decorated_definition" {
        if let Some(definition) = node.child_by_field_name("definition") {
            return definition;
        }
    }
    node
}

/// Dotted paths named by one import statement. Relative imports keep their
/// leading dots, e.g. `from . import models` yields `..models`.
pub fn import_paths(statement: Node, source: &[u8]) -> Vec<String> {
    let module = match statement.kind() {
        "import_from_statement" => statement
            .child_by_field_name("module_name")
            .map(|m| node_text(m, source)),
        _ => None,
    };
    let mut cursor = statement.walk();
    statement
        .children_by_field_name("name", &mut cursor)
        .map(|name| match module {
            Some(module) => format!("{module}.{}", imported_name(name, source)),
            None => imported_name(name, source).to_string(),
        })
        .collect()
}

fn imported_name<'s>(node: Node, source: &'s [u8]) -> &'s str {
    if node.kind() == "aliased_import" {
        if let Some(name) = node.child_by_field_name("name") {
            return node_text(name, source);
        }
    }
    node_text(node, source)
}

/// Class definitions at module level, keyed by class identifier.
pub fn classes(root: Node, source: &[u8]) -> Vec<(String, Model)> {
    let mut out = Vec::new();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let definition = undecorate(child);
        if definition.kind() != "class_definition" {
            continue;
        }
        let ident = definition
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_string())
            .unwrap_or_default();
        out.push((ident, class_model(definition, source)));
    }
    out
}

/// Build a model from the statements of one class body.
pub fn class_model(class: Node, source: &[u8]) -> Model {
    let mut model = Model::default();
    let Some(body) = class.child_by_field_name("body") else {
        return model;
    };

    let mut cursor = body.walk();
    for statement in body.named_children(&mut cursor) {
        match undecorate(statement).kind() {
            "expression_statement" => {
                let mut inner = statement.walk();
                for expression in statement.named_children(&mut inner) {
                    if expression.kind() == "assignment" {
                        apply_assignment(&mut model, expression, source);
                    }
                }
            }
            "function_definition" => {
                let definition = undecorate(statement);
                if let Some(name) = definition.child_by_field_name("name") {
                    model
                        .functions
                        .insert(node_text(name, source).to_string(), function(definition, source));
                }
            }
            _ => {}
        }
    }

    model.adopt_inherit_name();
    model
}

fn apply_assignment(model: &mut Model, assignment: Node, source: &[u8]) {
    let (Some(left), Some(right)) = (
        assignment.child_by_field_name("left"),
        assignment.child_by_field_name("right"),
    ) else {
        return;
    };
    if left.kind() != "identifier" {
        return;
    }
    let target = node_text(left, source);

    match classify(target, right, source) {
        Assignment::NameDecl(value) => {
            if let Ok(Value::String(name)) = literal::evaluate(value, source) {
                model.name = Some(name);
            }
        }
        Assignment::InheritDecl(value) => {
            if value.kind() == "identifier" && node_text(value, source) == NAME_ATTR {
                if let Some(name) = model.name.clone() {
                    model.inherit.insert(name);
                }
                return;
            }
            match literal::evaluate(value, source) {
                Ok(Value::String(parent)) => {
                    model.inherit.insert(parent);
                }
                Ok(Value::Array(parents)) => {
                    model.inherit.extend(
                        parents
                            .into_iter()
                            .filter_map(|p| p.as_str().map(str::to_string)),
                    );
                }
                _ => {}
            }
        }
        Assignment::InheritsDecl(value) => {
            if let Ok(Value::Object(map)) = literal::evaluate(value, source) {
                for (target, field) in map {
                    if let Value::String(field) = field {
                        model.fields.insert(field.clone(), Field::delegation());
                        model.inherits.insert(field, target);
                    }
                }
            }
        }
        Assignment::FieldDecl {
            type_tag,
            source_text,
        } => {
            model
                .fields
                .insert(target.to_string(), Field::new(type_tag, Some(source_text)));
        }
        Assignment::Other => {}
    }
}

/// Parameters, cyclomatic complexity, line span and Halstead volume.
pub fn function(definition: Node, source: &[u8]) -> Function {
    let parameters = definition
        .child_by_field_name("parameters")
        .map(|p| parameter_names(p, source))
        .unwrap_or_default();

    let (complexity, halstead) = match definition.child_by_field_name("body") {
        Some(body) => {
            let mut counts = Counts::default();
            walk_body(body, source, &mut counts);
            (1 + counts.branches, counts.volume())
        }
        None => (1, 0.0),
    };

    let lines = definition.end_position().row - definition.start_position().row + 1;
    Function {
        parameters,
        complexity,
        lines: u32::try_from(lines).unwrap_or(u32::MAX),
        halstead,
    }
}

/// Positional parameter names; `*args`, `**kwargs` and keyword-only ones are skipped.
fn parameter_names(parameters: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = parameters.walk();
    for param in parameters.named_children(&mut cursor) {
        let name = match param.kind() {
            "identifier" => Some(param),
            "default_parameter" | "typed_default_parameter" => param.child_by_field_name("name"),
            "typed_parameter" => {
                let mut inner = param.walk();
                let first = param.named_children(&mut inner).next();
                first.filter(|n| n.kind() == "identifier")
            }
            "list_splat_pattern" | "keyword_separator" => break,
            _ => None,
        };
        if let Some(name) = name {
            names.push(node_text(name, source).to_string());
        }
    }
    names
}

#[derive(Default)]
struct Counts {
    branches: u32,
    operators: BTreeMap<String, usize>,
    operands: BTreeMap<String, usize>,
}

impl Counts {
    /// `N * log2(n)` over total and distinct operators and operands.
    fn volume(&self) -> f64 {
        let distinct = self.operators.len() + self.operands.len();
        let total: usize = self.operators.values().sum::<usize>() + self.operands.values().sum::<usize>();
        if distinct == 0 {
            return 0.0;
        }
        total as f64 * (distinct as f64).log2()
    }
}

fn walk_body(node: Node, source: &[u8], counts: &mut Counts) {
    let kind = node.kind();
    if BRANCH_KINDS.contains(&kind) {
        counts.branches += 1;
    }
    if kind == "else_clause"
        && node
            .parent()
            .is_some_and(|parent| ELSE_OWNERS.contains(&parent.kind()))
    {
        counts.branches += 1;
    }
    if OPERATOR_KINDS.contains(&kind) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "comment" {
                continue;
            }
            let text = node_text(child, source).to_string();
            let bucket = if child.is_named() {
                &mut counts.operands
            } else {
                &mut counts.operators
            };
            *bucket.entry(text).or_default() += 1;
        }
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.named_children(&mut cursor).collect();
    for child in children {
        // Nested definitions are measured on their own.
        if matches!(child.kind(), "function_definition" | "class_definition") {
            continue;
        }
        walk_body(child, source, counts);
    }
}
