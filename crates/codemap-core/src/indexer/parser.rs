//! Syntax-tree element extraction backed by native tree-sitter grammars.
//!
//! Covers TypeScript/JavaScript, Python, Java and Go. Files whose tree
//! contains syntax errors are rejected so the registry falls back to the
//! pattern extractor.

use tree_sitter::{Node, Parser, Tree};

use crate::indexer::extract::{ElementExtractor, ExtractedElement};
use crate::models::{ElementKind, Language};

fn parse(source: &str, grammar: tree_sitter::Language) -> Result<Tree, String> {
    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| format!("failed to set language: {e}"))?;
    parser
        .parse(source.as_bytes(), None)
        .ok_or_else(|| "parser returned no tree".to_string())
}

/// Parse with the first grammar that yields an error-free tree.
pub fn parse_source(source: &str, language: Language) -> Result<Tree, String> {
    let grammars: Vec<tree_sitter::Language> = match language {
        Language::TypeScript | Language::JavaScript => vec![
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            tree_sitter_typescript::LANGUAGE_TSX.into(),
        ],
        Language::Python => vec![tree_sitter_python::LANGUAGE.into()],
        Language::Java => vec![tree_sitter_java::LANGUAGE.into()],
        Language::Go => vec![tree_sitter_go::LANGUAGE.into()],
        Language::Rust | Language::Unknown => {
            return Err(format!("no syntax-tree grammar for {language}"))
        }
    };
    for grammar in grammars {
        let tree = parse(source, grammar)?;
        if !tree.root_node().has_error() {
            return Ok(tree);
        }
    }
    Err("source contains syntax errors".to_string())
}

#[derive(Debug, Default)]
pub struct SyntaxTreeExtractor;

impl ElementExtractor for SyntaxTreeExtractor {
    fn name(&self) -> &'static str {
        "syntax-tree"
    }

    fn supports(&self, language: Language) -> bool {
        matches!(
            language,
            Language::TypeScript | Language::JavaScript | Language::Python | Language::Java | Language::Go
        )
    }

    fn extract(&self, source: &str, language: Language) -> Result<Vec<ExtractedElement>, String> {
        let tree = parse_source(source, language)?;
        let mut walker = Walker {
            source,
            out: Vec::new(),
        };
        let root = tree.root_node();
        match language {
            Language::TypeScript | Language::JavaScript => walker.typescript_scope(root, None),
            Language::Python => walker.python_scope(root, None),
            Language::Java => walker.java_scope(root, None),
            Language::Go => walker.go_scope(root),
            Language::Rust | Language::Unknown => {}
        }
        let mut elements = walker.out;
        elements.sort_by_key(|e| e.start_line);
        Ok(elements)
    }
}

struct Walker<'s> {
    source: &'s str,
    out: Vec<ExtractedElement>,
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

impl<'s> Walker<'s> {
    fn text(&self, node: Node<'_>) -> &'s str {
        node.utf8_text(self.source.as_bytes()).unwrap_or_default()
    }

    fn name_of(&self, node: Node<'_>) -> Option<String> {
        node.child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .filter(|n| !n.is_empty())
    }

    /// Declaration text from `start` up to the body, whitespace collapsed.
    fn signature(&self, start: usize, node: Node<'_>, body: Option<Node<'_>>) -> String {
        let end = match body {
            Some(body) => body.start_byte(),
            None => node.end_byte(),
        };
        let raw = self.source.get(start..end).unwrap_or_default();
        let raw = if body.is_none() {
            raw.lines().next().unwrap_or_default()
        } else {
            raw
        };
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed
            .trim_end_matches([';', ':', '{'])
            .trim_end()
            .to_string()
    }

    fn push(
        &mut self,
        name: String,
        kind: ElementKind,
        node: Node<'_>,
        outer: Option<Node<'_>>,
        body: Option<Node<'_>>,
        container: Option<&str>,
    ) {
        let start_node = outer.unwrap_or(node);
        let signature = self.signature(start_node.start_byte(), node, body);
        let is_async = signature.split_whitespace().any(|w| w == "async");
        self.out.push(ExtractedElement {
            name,
            kind,
            start_line: start_node.start_position().row as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            signature,
            container: container.map(str::to_string),
            is_async,
        });
    }

    // -- TypeScript / JavaScript ---------------------------------------------

    fn typescript_scope(&mut self, scope: Node<'_>, container: Option<&str>) {
        for child in named_children(scope) {
            self.typescript_declaration(child, None, container);
        }
    }

    fn typescript_declaration(&mut self, node: Node<'_>, outer: Option<Node<'_>>, container: Option<&str>) {
        match node.kind() {
            "export_statement" => {
                if let Some(decl) = node.child_by_field_name("declaration") {
                    self.typescript_declaration(decl, Some(node), container);
                }
            }
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = self.name_of(node) {
                    let body = node.child_by_field_name("body");
                    self.push(name, ElementKind::Function, node, outer, body, None);
                }
            }
            "class_declaration" | "abstract_class_declaration" | "class" => {
                let Some(name) = self.name_of(node) else {
                    return;
                };
                let body = node.child_by_field_name("body");
                self.push(name.clone(), ElementKind::Class, node, outer, body, None);
                if let Some(body) = body {
                    self.typescript_scope(body, Some(&name));
                }
            }
            "enum_declaration" => {
                if let Some(name) = self.name_of(node) {
                    let body = node.child_by_field_name("body");
                    self.push(name, ElementKind::Class, node, outer, body, None);
                }
            }
            "interface_declaration" | "type_alias_declaration" => {
                if let Some(name) = self.name_of(node) {
                    let body = node.child_by_field_name("body");
                    self.push(name, ElementKind::Interface, node, outer, body, None);
                }
            }
            "internal_module" | "module" => {
                if let Some(body) = node.child_by_field_name("body") {
                    self.typescript_scope(body, container);
                }
            }
            "method_definition" | "abstract_method_signature" | "method_signature" => {
                if let (Some(name), Some(_)) = (self.name_of(node), container) {
                    let body = node.child_by_field_name("body");
                    self.push(name, ElementKind::Method, node, outer, body, container);
                }
            }
            "public_field_definition" | "field_definition" => {
                let Some(class_name) = container else {
                    return;
                };
                let name = self
                    .name_of(node)
                    .or_else(|| node.child_by_field_name("property").map(|n| self.text(n).to_string()));
                let Some(name) = name else {
                    return;
                };
                let value = node.child_by_field_name("value");
                match value.filter(|v| is_function_value(v.kind())) {
                    Some(func) => {
                        let body = func.child_by_field_name("body").filter(|b| b.kind() == "statement_block");
                        self.push(name, ElementKind::Method, node, outer, body, Some(class_name));
                    }
                    None => self.push(name, ElementKind::Property, node, outer, None, Some(class_name)),
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                if container.is_some() {
                    return;
                }
                let statement = outer.unwrap_or(node);
                for declarator in named_children(node) {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    let Some(name_node) = declarator.child_by_field_name("name") else {
                        continue;
                    };
                    if name_node.kind() != "identifier" {
                        continue;
                    }
                    let name = self.text(name_node).to_string();
                    let value = declarator.child_by_field_name("value");
                    match value.filter(|v| is_function_value(v.kind())) {
                        Some(func) => {
                            let body = func
                                .child_by_field_name("body")
                                .filter(|b| b.kind() == "statement_block");
                            self.push_spanning(name, ElementKind::Function, statement, declarator, body);
                        }
                        None => self.push_spanning(name, ElementKind::Variable, statement, declarator, None),
                    }
                }
            }
            _ => {}
        }
    }

    /// Element whose signature starts at `statement` but whose extent is
    /// the declarator (one statement may declare several names).
    fn push_spanning(
        &mut self,
        name: String,
        kind: ElementKind,
        statement: Node<'_>,
        declarator: Node<'_>,
        body: Option<Node<'_>>,
    ) {
        let signature = match body {
            Some(_) => self.signature(statement.start_byte(), declarator, body),
            None => self.signature(statement.start_byte(), statement, None),
        };
        let is_async = signature.split_whitespace().any(|w| w == "async");
        self.out.push(ExtractedElement {
            name,
            kind,
            start_line: statement.start_position().row as u32 + 1,
            end_line: declarator.end_position().row as u32 + 1,
            signature,
            container: None,
            is_async,
        });
    }

    // -- Python --------------------------------------------------------------

    fn python_scope(&mut self, scope: Node<'_>, container: Option<&str>) {
        for child in named_children(scope) {
            self.python_statement(child, container);
        }
    }

    fn python_statement(&mut self, node: Node<'_>, container: Option<&str>) {
        match node.kind() {
            "decorated_definition" => {
                if let Some(def) = node.child_by_field_name("definition") {
                    self.python_statement(def, container);
                }
            }
            "function_definition" => {
                if let Some(name) = self.name_of(node) {
                    let kind = if container.is_some() {
                        ElementKind::Method
                    } else {
                        ElementKind::Function
                    };
                    let body = node.child_by_field_name("body");
                    self.push(name, kind, node, None, body, container);
                }
            }
            "class_definition" => {
                let Some(name) = self.name_of(node) else {
                    return;
                };
                let body = node.child_by_field_name("body");
                self.push(name.clone(), ElementKind::Class, node, None, body, container);
                if let Some(body) = body {
                    self.python_scope(body, Some(&name));
                }
            }
            "expression_statement" => {
                let Some(assignment) = named_children(node)
                    .into_iter()
                    .find(|c| c.kind() == "assignment")
                else {
                    return;
                };
                let Some(left) = assignment.child_by_field_name("left") else {
                    return;
                };
                if left.kind() != "identifier" {
                    return;
                }
                let kind = if container.is_some() {
                    ElementKind::Property
                } else {
                    ElementKind::Variable
                };
                let name = self.text(left).to_string();
                self.push(name, kind, node, None, None, container);
            }
            _ => {}
        }
    }

    // -- Java ----------------------------------------------------------------

    fn java_scope(&mut self, scope: Node<'_>, container: Option<&str>) {
        for child in named_children(scope) {
            self.java_declaration(child, container);
        }
    }

    fn java_declaration(&mut self, node: Node<'_>, container: Option<&str>) {
        match node.kind() {
            "class_declaration" | "enum_declaration" | "record_declaration" | "interface_declaration"
            | "annotation_type_declaration" => {
                let Some(name) = self.name_of(node) else {
                    return;
                };
                let kind = if matches!(node.kind(), "interface_declaration" | "annotation_type_declaration") {
                    ElementKind::Interface
                } else {
                    ElementKind::Class
                };
                let body = node.child_by_field_name("body");
                self.push(name.clone(), kind, node, None, body, container);
                if let Some(body) = body {
                    self.java_scope(body, Some(&name));
                }
            }
            "enum_body_declarations" => self.java_scope(node, container),
            "method_declaration" | "constructor_declaration" => {
                if let (Some(name), Some(_)) = (self.name_of(node), container) {
                    let body = node.child_by_field_name("body");
                    self.push(name, ElementKind::Method, node, None, body, container);
                }
            }
            "field_declaration" | "constant_declaration" => {
                if container.is_none() {
                    return;
                }
                for declarator in named_children(node) {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    if let Some(name) = self.name_of(declarator) {
                        self.push(name, ElementKind::Property, node, None, None, container);
                    }
                }
            }
            _ => {}
        }
    }

    // -- Go ------------------------------------------------------------------

    fn go_scope(&mut self, scope: Node<'_>) {
        for node in named_children(scope) {
            match node.kind() {
                "function_declaration" => {
                    if let Some(name) = self.name_of(node) {
                        let body = node.child_by_field_name("body");
                        self.push(name, ElementKind::Function, node, None, body, None);
                    }
                }
                "method_declaration" => {
                    let Some(name) = self.name_of(node) else {
                        continue;
                    };
                    let receiver = node
                        .child_by_field_name("receiver")
                        .and_then(|r| self.first_descendant_text(r, "type_identifier"));
                    let body = node.child_by_field_name("body");
                    self.push(name, ElementKind::Method, node, None, body, receiver.as_deref());
                }
                "type_declaration" => {
                    for spec in named_children(node) {
                        if spec.kind() != "type_spec" {
                            continue;
                        }
                        let (Some(name), Some(ty)) = (self.name_of(spec), spec.child_by_field_name("type")) else {
                            continue;
                        };
                        let kind = match ty.kind() {
                            "struct_type" => ElementKind::Class,
                            "interface_type" => ElementKind::Interface,
                            _ => continue,
                        };
                        let outer = if named_children(node).len() == 1 { Some(node) } else { None };
                        self.push(name, kind, spec, outer, Some(ty).and_then(body_of_type), None);
                    }
                }
                "var_declaration" | "const_declaration" => {
                    for spec in named_children(node) {
                        if !matches!(spec.kind(), "var_spec" | "const_spec") {
                            continue;
                        }
                        if let Some(name) = self.name_of(spec) {
                            self.push(name, ElementKind::Variable, spec, Some(node), None, None);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn first_descendant_text(&self, node: Node<'_>, kind: &str) -> Option<String> {
        if node.kind() == kind {
            return Some(self.text(node).to_string());
        }
        named_children(node)
            .into_iter()
            .find_map(|child| self.first_descendant_text(child, kind))
    }
}

/// The `{ ... }` list of a struct or interface type.
fn body_of_type(ty: Node<'_>) -> Option<Node<'_>> {
    named_children(ty)
        .into_iter()
        .find(|c| matches!(c.kind(), "field_declaration_list" | "method_spec_list"))
        .or(Some(ty))
}

fn is_function_value(kind: &str) -> bool {
    matches!(
        kind,
        "arrow_function" | "function_expression" | "function" | "generator_function"
    )
}
