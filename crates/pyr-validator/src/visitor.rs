//! Syntax-tree walk that turns Python source into an [`Analysis`]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tree_sitter::{Node, Parser, Tree};

use crate::error::ValidatorError;
use crate::paths::is_path_allowed;
use crate::policy::ValidationPolicy;
use crate::stdlib::is_stdlib;
use crate::verdict::{Analysis, Verdict};

/// `os`/`shutil` calls that create, remove or rewrite filesystem entries
const DESTRUCTIVE_FILE_FUNCTIONS: &[&str] = &[
    "os.remove",
    "os.unlink",
    "os.rmdir",
    "os.removedirs",
    "os.rename",
    "os.renames",
    "os.replace",
    "os.mkdir",
    "os.makedirs",
    "os.chmod",
    "os.chown",
    "os.truncate",
    "os.symlink",
    "os.link",
    "os.mknod",
    "os.mkfifo",
    "shutil.rmtree",
    "shutil.move",
    "shutil.copy",
    "shutil.copy2",
    "shutil.copyfile",
    "shutil.copytree",
    "shutil.chown",
];

const PATH_WRITE_METHODS: &[&str] = &["write_text", "write_bytes"];

/// Static security validator for guest scripts
///
/// Holds no parser state, so one instance can be shared across tasks. A
/// fresh tree-sitter parser is created per call.
#[derive(Debug, Clone)]
pub struct Validator {
    policy: ValidationPolicy,
    scripts_dir: PathBuf,
    allowed_paths: Vec<PathBuf>,
}

impl Validator {
    /// Create a validator for scripts that run with `scripts_dir` as their
    /// working directory
    pub fn new(policy: ValidationPolicy, scripts_dir: impl Into<PathBuf>) -> Self {
        let scripts_dir = scripts_dir.into();
        let allowed_paths = if policy.allowed_paths.is_empty() {
            vec![scripts_dir.clone()]
        } else {
            policy
                .allowed_paths
                .iter()
                .map(|p| scripts_dir.join(p))
                .collect()
        };

        Self {
            policy,
            scripts_dir,
            allowed_paths,
        }
    }

    /// The policy this validator enforces
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Directory relative file paths are resolved against
    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    /// Validate `source` for the script called `script_name`
    ///
    /// `known_local_names` holds the module names (file stem) of every script
    /// currently in the managed directory.
    pub fn validate(
        &self,
        source: &str,
        script_name: &str,
        known_local_names: &BTreeSet<String>,
    ) -> Verdict {
        let verdict = self
            .analyze_script(source, script_name)
            .resolve(known_local_names);
        tracing::debug!(
            script = script_name,
            is_valid = verdict.is_valid,
            errors = verdict.errors.len(),
            missing = verdict.missing_deps.len(),
            "Validated script"
        );
        verdict
    }

    /// [`Self::analyze`] for a named script; the script's own module is not
    /// reported as a sibling import
    pub fn analyze_script(&self, source: &str, script_name: &str) -> Analysis {
        let mut analysis = self.analyze(source);
        let own_module = script_name.strip_suffix(".py").unwrap_or(script_name);
        analysis.local_imports.remove(own_module);
        analysis
    }

    /// Collect violations and local import candidates from `source`
    ///
    /// Fails closed: if the source cannot be parsed the analysis holds a
    /// single syntax error and nothing else.
    pub fn analyze(&self, source: &str) -> Analysis {
        let tree = match parse(source) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!("Python parser failed: {}", e);
                return Analysis {
                    errors: vec![format!("Parse error: {}", e)],
                    local_imports: BTreeSet::new(),
                };
            }
        };

        let root = tree.root_node();
        if root.has_error() {
            let message = first_syntax_error(root)
                .unwrap_or_else(|| "Syntax error at line 1: invalid syntax".to_string());
            return Analysis {
                errors: vec![message],
                local_imports: BTreeSet::new(),
            };
        }

        let mut visitor = SecurityVisitor {
            source: source.as_bytes(),
            policy: &self.policy,
            scripts_dir: &self.scripts_dir,
            allowed_paths: &self.allowed_paths,
            analysis: Analysis::default(),
        };
        visitor.walk(root);
        visitor.analysis
    }
}

fn parse(source: &str) -> Result<Tree, ValidatorError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ValidatorError::ParserInit(e.to_string()))?;
    parser.parse(source, None).ok_or(ValidatorError::NoTree)
}

/// First ERROR or MISSING node in document order
fn first_syntax_error(root: Node<'_>) -> Option<String> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let line = node.start_position().row + 1;
        if node.is_missing() {
            return Some(format!("Syntax error at line {}: missing '{}'", line, node.kind()));
        }
        if node.is_error() {
            return Some(format!("Syntax error at line {}: invalid syntax", line));
        }
        if !node.has_error() {
            continue;
        }

        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

struct SecurityVisitor<'a> {
    source: &'a [u8],
    policy: &'a ValidationPolicy,
    scripts_dir: &'a Path,
    allowed_paths: &'a [PathBuf],
    analysis: Analysis,
}

impl<'a> SecurityVisitor<'a> {
    /// Pre-order walk with an explicit stack; deeply nested input cannot
    /// exhaust the thread stack
    fn walk(&mut self, root: Node<'_>) {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            self.visit(node);

            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_statement" => self.visit_import(node),
            "import_from_statement" => self.visit_import_from(node),
            "call" => self.visit_call(node),
            "attribute" => self.visit_attribute(node),
            "identifier" | "keyword_identifier" => self.visit_identifier(node),
            "exec_statement" => self.report(node, "Blocked builtin 'exec()'".to_string()),
            _ => {}
        }
    }

    fn visit_import(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let targets: Vec<Node<'_>> = node.children_by_field_name("name", &mut cursor).collect();

        for target in targets {
            let Some(module) = self.imported_name(target) else {
                continue;
            };

            if self.policy.is_blocked_module(&module) {
                self.report(node, format!("Blocked import '{}'", module));
            } else {
                self.note_local(&module);
            }
        }
    }

    fn visit_import_from(&mut self, node: Node<'_>) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };

        let mut cursor = node.walk();
        let names: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|n| self.imported_name(n))
            .collect();

        if module_node.kind() == "relative_import" {
            self.visit_relative_import(module_node, &names);
            return;
        }

        let module = self.text(module_node).to_string();
        if self.policy.is_blocked_module(&module) {
            self.report(node, format!("Blocked import 'from {}'", module));
            return;
        }

        for name in &names {
            let qualified = format!("{}.{}", module, name);
            if self.policy.is_blocked_module(&qualified)
                || self.policy.is_blocked_function(&qualified)
            {
                self.report(node, format!("Blocked import '{}'", qualified));
            }
        }

        self.note_local(&module);
    }

    /// `from . import b` and `from .b import c` name siblings; deeper
    /// prefixes leave the managed directory and are ignored
    fn visit_relative_import(&mut self, module_node: Node<'_>, names: &[String]) {
        let mut cursor = module_node.walk();
        let mut prefix = "";
        let mut dotted = None;
        for child in module_node.children(&mut cursor) {
            match child.kind() {
                "import_prefix" => prefix = self.text(child),
                "dotted_name" => dotted = Some(self.text(child).to_string()),
                _ => {}
            }
        }

        if prefix != "." {
            return;
        }

        match dotted {
            Some(module) => self.note_local(&module),
            None => {
                for name in names {
                    self.note_local(name);
                }
            }
        }
    }

    fn visit_call(&mut self, node: Node<'_>) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };

        match function.kind() {
            "identifier" | "keyword_identifier" => {
                let name = self.text(function).to_string();
                if self.policy.is_blocked_builtin(&name) {
                    self.report(node, format!("Blocked builtin '{}()'", name));
                }
                if name == "open" {
                    self.check_open(node);
                }
            }
            "attribute" => {
                if let Some(chain) = self.dotted_chain(function) {
                    if self.policy.is_blocked_function(&chain) {
                        self.report(node, format!("Blocked function '{}()'", chain));
                    }
                    if DESTRUCTIVE_FILE_FUNCTIONS.contains(&chain.as_str()) {
                        self.check_literal_paths(node, &chain);
                    }
                }
                self.check_path_write(node, function);
            }
            _ => {}
        }
    }

    fn visit_attribute(&mut self, node: Node<'_>) {
        if let Some(attr) = node.child_by_field_name("attribute") {
            let attr = self.text(attr).to_string();
            if self.policy.is_suspicious_attribute(&attr) {
                self.report(node, format!("Blocked dunder access '{}'", attr));
            }
        }

        // Called chains are reported by the call itself
        let is_callee = node
            .parent()
            .and_then(|p| {
                (p.kind() == "call")
                    .then(|| p.child_by_field_name("function"))
                    .flatten()
            })
            .is_some_and(|f| f == node);
        if is_callee {
            return;
        }

        // Only the outermost attribute of a chain names the full target
        if node.parent().is_some_and(|p| p.kind() == "attribute") {
            return;
        }

        if let Some(chain) = self.dotted_chain(node) {
            if self.policy.is_blocked_function(&chain) {
                self.report(node, format!("Blocked attribute '{}'", chain));
            }
        }
    }

    /// Bare references such as `e = eval` or `__builtins__.__dict__`
    fn visit_identifier(&mut self, node: Node<'_>) {
        let name = self.text(node);
        if !self.policy.is_blocked_builtin(name) && !self.policy.is_suspicious_attribute(name) {
            return;
        }

        let Some(parent) = node.parent() else {
            return;
        };
        let is_field = |field: &str| parent.child_by_field_name(field).is_some_and(|f| f == node);
        let skip = match parent.kind() {
            // Calls report themselves
            "call" => is_field("function"),
            // `obj.compile` is a method, not the builtin
            "attribute" => is_field("attribute"),
            "keyword_argument" => is_field("name"),
            "parameters" | "lambda_parameters" => true,
            "default_parameter" | "typed_parameter" | "typed_default_parameter" => {
                is_field("name") || parent.named_child(0).is_some_and(|f| f == node)
            }
            _ => false,
        };
        if skip {
            return;
        }

        self.report(node, format!("Blocked reference to '{}'", name));
    }

    fn check_open(&mut self, call: Node<'_>) {
        let (positional, keywords) = self.arguments(call);

        let path = positional
            .first()
            .copied()
            .or_else(|| keyword_value(&keywords, "file"));
        let Some(path) = path else {
            return;
        };

        match self.string_literal(path) {
            Some(literal) => {
                if !is_path_allowed(&literal, self.scripts_dir, self.allowed_paths) {
                    self.report(
                        call,
                        format!("File operation 'open' on disallowed path '{}'", literal),
                    );
                }
            }
            None => {
                let mode = positional
                    .get(1)
                    .copied()
                    .or_else(|| keyword_value(&keywords, "mode"));
                let writes = match mode {
                    None => false,
                    // A computed mode could be anything
                    Some(mode) => self
                        .string_literal(mode)
                        .map_or(true, |m| m.contains(['w', 'a', 'x', '+'])),
                };
                if writes {
                    self.report(
                        call,
                        format!(
                            "Write operation with dynamic path - ensure path is within {}",
                            self.scripts_dir.display()
                        ),
                    );
                }
            }
        }
    }

    fn check_literal_paths(&mut self, call: Node<'_>, function: &str) {
        let (positional, _) = self.arguments(call);
        for arg in positional {
            if let Some(literal) = self.string_literal(arg) {
                if !is_path_allowed(&literal, self.scripts_dir, self.allowed_paths) {
                    self.report(
                        call,
                        format!(
                            "File operation '{}' on disallowed path '{}'",
                            function, literal
                        ),
                    );
                }
            }
        }
    }

    /// `Path("...").write_text(...)` and friends
    fn check_path_write(&mut self, call: Node<'_>, function: Node<'_>) {
        let Some(method) = function.child_by_field_name("attribute") else {
            return;
        };
        let method = self.text(method).to_string();
        if !PATH_WRITE_METHODS.contains(&method.as_str()) {
            return;
        }

        let Some(receiver) = function.child_by_field_name("object") else {
            return;
        };
        if receiver.kind() != "call" {
            return;
        }

        let constructor = receiver
            .child_by_field_name("function")
            .and_then(|f| self.dotted_chain(f));
        let is_path_ctor = constructor.as_deref().is_some_and(|c| {
            c == "Path" || c.ends_with(".Path") || c == "PosixPath" || c.ends_with(".PosixPath")
        });
        if !is_path_ctor {
            return;
        }

        let (positional, _) = self.arguments(receiver);
        if let Some(literal) = positional.first().and_then(|a| self.string_literal(*a)) {
            if !is_path_allowed(&literal, self.scripts_dir, self.allowed_paths) {
                self.report(
                    call,
                    format!("File operation '{}' on disallowed path '{}'", method, literal),
                );
            }
        }
    }

    fn report(&mut self, node: Node<'_>, description: String) {
        let line = node.start_position().row + 1;
        self.analysis
            .errors
            .push(format!("Line {}: {}", line, description));
    }

    fn note_local(&mut self, module: &str) {
        if module.is_empty()
            || module.contains('.')
            || is_stdlib(module)
            || self.policy.is_known_package(module)
            || self.policy.is_blocked_module(module)
        {
            return;
        }
        self.analysis.local_imports.insert(module.to_string());
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }

    /// Module named by a `dotted_name` or `aliased_import`
    fn imported_name(&self, node: Node<'_>) -> Option<String> {
        let name = if node.kind() == "aliased_import" {
            node.child_by_field_name("name")?
        } else {
            node
        };
        (name.kind() == "dotted_name").then(|| self.text(name).to_string())
    }

    /// `a.b.c` for attribute chains rooted at a plain identifier
    fn dotted_chain(&self, node: Node<'_>) -> Option<String> {
        let mut parts = Vec::new();
        let mut current = node;
        loop {
            match current.kind() {
                "identifier" | "keyword_identifier" => {
                    parts.push(self.text(current));
                    break;
                }
                "attribute" => {
                    parts.push(self.text(current.child_by_field_name("attribute")?));
                    current = current.child_by_field_name("object")?;
                }
                _ => return None,
            }
        }
        parts.reverse();
        Some(parts.join("."))
    }

    fn arguments<'t>(&self, call: Node<'t>) -> (Vec<Node<'t>>, Vec<(String, Node<'t>)>) {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();

        let Some(args) = call.child_by_field_name("arguments") else {
            return (positional, keywords);
        };
        if args.kind() != "argument_list" {
            return (positional, keywords);
        }

        let mut cursor = args.walk();
        for arg in args.named_children(&mut cursor) {
            match arg.kind() {
                "keyword_argument" => {
                    if let (Some(name), Some(value)) = (
                        arg.child_by_field_name("name"),
                        arg.child_by_field_name("value"),
                    ) {
                        keywords.push((self.text(name).to_string(), value));
                    }
                }
                "list_splat" | "dictionary_splat" | "comment" => {}
                _ => positional.push(arg),
            }
        }

        (positional, keywords)
    }

    /// Value of a plain string literal. f-strings and implicit
    /// concatenations count as dynamic.
    fn string_literal(&self, node: Node<'_>) -> Option<String> {
        if node.kind() != "string" {
            return None;
        }

        let mut value = String::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "string_start" => {
                    if self.text(child).to_ascii_lowercase().contains('f') {
                        return None;
                    }
                }
                "string_content" => value.push_str(self.text(child)),
                "interpolation" => return None,
                _ => {}
            }
        }
        Some(value)
    }
}

fn keyword_value<'t>(keywords: &[(String, Node<'t>)], name: &str) -> Option<Node<'t>> {
    keywords
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> Validator {
        Validator::new(ValidationPolicy::default(), "/home/pi/pythoncode")
    }

    fn check(source: &str) -> Verdict {
        validator().validate(source, "guest.py", &BTreeSet::new())
    }

    #[test]
    fn test_clean_script_is_valid() {
        let verdict = check("import time\n\nfor i in range(3):\n    print(i)\n    time.sleep(1)\n");
        assert!(verdict.is_valid, "{:?}", verdict.errors);
        assert!(verdict.missing_deps.is_empty());
        assert!(verdict.is_executable());
    }

    #[test]
    fn test_blocked_import_names_module_and_line() {
        let verdict = check("import os\nimport socket\n");
        assert!(!verdict.is_valid);
        assert_eq!(verdict.errors, vec!["Line 2: Blocked import 'socket'"]);
    }

    #[test]
    fn test_dotted_prefix_import_is_blocked() {
        let verdict = check("import urllib.request as req\n");
        assert_eq!(verdict.errors, vec!["Line 1: Blocked import 'urllib.request'"]);
    }

    #[test]
    fn test_from_import_checks_module_and_member() {
        let verdict = check("from http.client import HTTPConnection\n");
        assert_eq!(verdict.errors, vec!["Line 1: Blocked import 'from http.client'"]);

        let verdict = check("from os import system, path\n");
        assert_eq!(verdict.errors, vec!["Line 1: Blocked import 'os.system'"]);
    }

    #[test]
    fn test_allowed_gpio_modules() {
        let verdict = check("import RPi.GPIO as GPIO\nfrom gpiozero import LED\n");
        assert!(verdict.is_valid, "{:?}", verdict.errors);
        assert!(verdict.missing_deps.is_empty());
    }

    #[test]
    fn test_blocked_builtin_call() {
        let verdict = check("x = eval('1 + 1')\n");
        assert_eq!(verdict.errors, vec!["Line 1: Blocked builtin 'eval()'"]);

        let verdict = check("mod = __import__('os')\n");
        assert_eq!(verdict.errors, vec!["Line 1: Blocked builtin '__import__()'"]);
    }

    #[test]
    fn test_blocked_function_call_reported_once() {
        let verdict = check("import os\nos.system('ls')\n");
        assert_eq!(verdict.errors, vec!["Line 2: Blocked function 'os.system()'"]);
    }

    #[test]
    fn test_blocked_function_reference() {
        let verdict = check("import os\nrun = os.system\n");
        assert_eq!(verdict.errors, vec!["Line 2: Blocked attribute 'os.system'"]);
    }

    #[test]
    fn test_aliased_builtin_reference() {
        let verdict = check("m = __import__\nm('socket')\n");
        assert_eq!(verdict.errors, vec!["Line 1: Blocked reference to '__import__'"]);

        let verdict = check("e = eval\ne('1 + 1')\n");
        assert_eq!(verdict.errors, vec!["Line 1: Blocked reference to 'eval'"]);

        let verdict = check("run = [getattr][0]\n");
        assert_eq!(verdict.errors, vec!["Line 1: Blocked reference to 'getattr'"]);
    }

    #[test]
    fn test_builtins_module_reference() {
        let verdict = check("__builtins__.__dict__['exec']('print(1)')\n");
        assert_eq!(verdict.errors, vec!["Line 1: Blocked reference to '__builtins__'"]);

        let verdict = check("b = __builtins__\n");
        assert!(!verdict.is_valid);
    }

    #[test]
    fn test_builtin_names_as_methods_and_parameters() {
        let source = "import re\npattern = re.compile('a+')\n\ndef walk(dir, vars=None):\n    return dir\n\nprint(sorted([], key=None))\n";
        let verdict = check(source);
        // Only the use of the shadowed name in the body is a reference
        assert_eq!(verdict.errors, vec!["Line 5: Blocked reference to 'dir'"]);

        let verdict = check("opts = dict(compile=True)\n");
        assert!(verdict.is_valid, "{:?}", verdict.errors);
    }

    #[test]
    fn test_dunder_access_blocked() {
        let verdict = check("x = ().__class__.__bases__[0]\n");
        assert!(!verdict.is_valid);
        assert!(verdict
            .errors
            .contains(&"Line 1: Blocked dunder access '__class__'".to_string()));
        assert!(verdict
            .errors
            .contains(&"Line 1: Blocked dunder access '__bases__'".to_string()));
    }

    #[test]
    fn test_collects_every_violation() {
        let source = "import socket\nimport pickle\neval('1')\nexec('2')\n";
        let verdict = check(source);
        assert!(!verdict.is_valid);
        assert_eq!(verdict.errors.len(), 4);
        assert!(verdict.errors[0].starts_with("Line 1:"));
        assert!(verdict.errors[3].starts_with("Line 4:"));
    }

    #[test]
    fn test_syntax_error_fails_closed() {
        let verdict = check("import socket\ndef broken(:\n    pass\n");
        assert!(!verdict.is_valid);
        assert_eq!(verdict.errors.len(), 1);
        assert!(verdict.errors[0].starts_with("Syntax error at line"));
        assert!(verdict.missing_deps.is_empty());
    }

    #[test]
    fn test_missing_sibling_is_valid_but_not_executable() {
        let verdict = check("import helpers\nfrom motor import drive\n");
        assert!(verdict.is_valid);
        assert_eq!(verdict.missing_deps, vec!["helpers", "motor"]);
        assert!(!verdict.is_executable());

        let known: BTreeSet<String> = ["helpers", "motor"].iter().map(|s| s.to_string()).collect();
        let verdict = validator().validate("import helpers\nfrom motor import drive\n", "guest.py", &known);
        assert!(verdict.is_executable());
    }

    #[test]
    fn test_relative_import_names_sibling() {
        let verdict = check("from . import sensor\nfrom .leds import blink\nfrom .. import up\n");
        assert_eq!(verdict.missing_deps, vec!["leds", "sensor"]);
    }

    #[test]
    fn test_third_party_and_stdlib_are_not_siblings() {
        let verdict = check("import numpy\nimport json\nimport os.path\n");
        assert!(verdict.missing_deps.is_empty());
    }

    #[test]
    fn test_self_import_is_not_missing() {
        let verdict = validator().validate("import guest\n", "guest.py", &BTreeSet::new());
        assert!(verdict.missing_deps.is_empty());
    }

    #[test]
    fn test_open_literal_outside_sandbox() {
        let verdict = check("f = open('/etc/passwd')\n");
        assert_eq!(
            verdict.errors,
            vec!["Line 1: File operation 'open' on disallowed path '/etc/passwd'"]
        );

        let verdict = check("f = open('data/readings.csv', 'w')\n");
        assert!(verdict.is_valid, "{:?}", verdict.errors);

        let verdict = check("f = open('../escape.txt')\n");
        assert!(!verdict.is_valid);
    }

    #[test]
    fn test_open_write_with_dynamic_path() {
        let verdict = check("name = input()\nf = open(name, 'a')\n");
        assert_eq!(
            verdict.errors,
            vec!["Line 2: Write operation with dynamic path - ensure path is within /home/pi/pythoncode"]
        );

        let verdict = check("name = input()\nf = open(name)\n");
        assert!(verdict.is_valid);

        let verdict = check("f = open(f'{name}.txt', mode='w')\n");
        assert!(!verdict.is_valid);
    }

    #[test]
    fn test_destructive_os_calls_checked() {
        let verdict = check("import shutil\nshutil.rmtree('/home/pi')\n");
        assert_eq!(
            verdict.errors,
            vec!["Line 2: File operation 'shutil.rmtree' on disallowed path '/home/pi'"]
        );

        let verdict = check("import os\nos.remove('old.log')\n");
        assert!(verdict.is_valid, "{:?}", verdict.errors);
    }

    #[test]
    fn test_link_and_node_creation_checked() {
        let cases = [
            ("os.symlink('/etc/shadow', 'x')", "os.symlink", "/etc/shadow"),
            ("os.link('/etc/passwd', 'p')", "os.link", "/etc/passwd"),
            ("os.mknod('/dev/evil')", "os.mknod", "/dev/evil"),
            ("os.mkfifo('/tmp/pipe')", "os.mkfifo", "/tmp/pipe"),
        ];
        for (call, function, path) in cases {
            let verdict = check(&format!("import os\n{}\n", call));
            assert_eq!(
                verdict.errors,
                vec![format!("Line 2: File operation '{}' on disallowed path '{}'", function, path)]
            );
        }

        let verdict = check("import shutil\nshutil.chown('/etc/sudoers', 'pi')\n");
        assert_eq!(
            verdict.errors,
            vec!["Line 2: File operation 'shutil.chown' on disallowed path '/etc/sudoers'"]
        );

        let verdict = check("import os\nos.symlink('data.csv', 'latest.csv')\n");
        assert!(verdict.is_valid, "{:?}", verdict.errors);
    }

    #[test]
    fn test_path_write_text_checked() {
        let verdict = check("from pathlib import Path\nPath('/boot/config.txt').write_text('x')\n");
        assert_eq!(
            verdict.errors,
            vec!["Line 2: File operation 'write_text' on disallowed path '/boot/config.txt'"]
        );
    }

    #[test]
    fn test_custom_allowed_paths() {
        let mut policy = ValidationPolicy::default();
        policy.allowed_paths = vec![PathBuf::from("/tmp/share")];
        let validator = Validator::new(policy, "/home/pi/pythoncode");

        let verdict = validator.validate("open('/tmp/share/x.txt', 'w')\n", "p.py", &BTreeSet::new());
        assert!(verdict.is_valid, "{:?}", verdict.errors);

        let verdict = validator.validate("open('x.txt', 'w')\n", "p.py", &BTreeSet::new());
        assert!(!verdict.is_valid);
    }

    #[test]
    fn test_deeply_nested_source_does_not_overflow() {
        let depth = 5_000;
        let source = format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth));
        let verdict = check(&source);
        // Either parsed and clean, or rejected as a syntax error
        assert!(verdict.is_valid || verdict.errors[0].starts_with("Syntax error"));
    }
}
