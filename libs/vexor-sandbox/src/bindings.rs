//! Declared bindings of the submitted code.
//!
//! The sandbox has no module loader. Instead of rewriting `require` calls,
//! the bundler exposes a fixed set of names to the test scope. This module
//! decides which names those are and checks the requested target is one of
//! them. Detection only reads the source; it never edits it.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::SandboxError;

lazy_static! {
    // A declaration starts a line or follows `;`, a brace or a block comment.
    static ref FUNCTION_DECL: Regex = Regex::new(
        r"(?m)(?:^|[;{}]|\*/)\s*(?:export\s+(?:default\s+)?)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\("
    )
    .expect("function pattern compiles");

    static ref VARIABLE_DECL: Regex = Regex::new(
        r"(?m)(?:^|[;{}]|\*/)\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\b\s*)?(?:function\b|class\b|\(|[A-Za-z_$][\w$]*\s*=>)"
    )
    .expect("variable pattern compiles");

    static ref CLASS_DECL: Regex = Regex::new(
        r"(?m)(?:^|[;{}]|\*/)\s*(?:export\s+(?:default\s+)?)?class\s+([A-Za-z_$][\w$]*)"
    )
    .expect("class pattern compiles");

    static ref EXPORTS_PROPERTY: Regex = Regex::new(
        r"(?m)(?:^|[;{}]|\*/)\s*(?:module\s*\.\s*)?exports\s*\.\s*([A-Za-z_$][\w$]*)\s*=[^=]"
    )
    .expect("exports pattern compiles");

    static ref MODULE_EXPORTS_FUNCTION: Regex = Regex::new(
        r"module\s*\.\s*exports\s*=\s*(?:(?:async\s+)?function\s*\*?\s*|class\s+)([A-Za-z_$][\w$]*)"
    )
    .expect("module.exports function pattern compiles");

    static ref MODULE_EXPORTS_NAME: Regex = Regex::new(
        r"(?m)module\s*\.\s*exports\s*=\s*([A-Za-z_$][\w$]*)[ \t]*(?:;|$)"
    )
    .expect("module.exports name pattern compiles");

    static ref MODULE_EXPORTS_OBJECT: Regex = Regex::new(
        r"module[ \t]*\.[ \t]*exports[ \t]*=[ \t]*\{([^}]*)\}"
    )
    .expect("module.exports pattern compiles");

    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$")
        .expect("identifier pattern compiles");
}

const RESERVED_WORDS: &[&str] = &[
    "arguments", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false", "finally",
    "for", "function", "if", "implements", "import", "in", "instanceof", "interface", "let",
    "new", "null", "package", "private", "protected", "public", "return", "static", "super",
    "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void", "while",
    "with", "yield", "NaN", "Infinity",
    // bundle internals
    "__vexor", "__vexorLinked", "__vexorUserModule",
];

/// Whether `name` can be emitted as a plain JS binding
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !RESERVED_WORDS.contains(&name)
}

/// Names declared by the user code, in source order, without duplicates
pub fn detect_declarations(user_code: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for pattern in [
        &*FUNCTION_DECL,
        &*VARIABLE_DECL,
        &*CLASS_DECL,
        &*EXPORTS_PROPERTY,
        &*MODULE_EXPORTS_FUNCTION,
        &*MODULE_EXPORTS_NAME,
    ] {
        for captures in pattern.captures_iter(user_code) {
            if let Some(name) = captures.get(1) {
                found.push((name.start(), name.as_str().to_string()));
            }
        }
    }

    for captures in MODULE_EXPORTS_OBJECT.captures_iter(user_code) {
        let Some(body) = captures.get(1) else { continue };
        for entry in body.as_str().split(',') {
            let key = entry.split(':').next().unwrap_or("").trim();
            if !key.starts_with("...") && !key.is_empty() {
                found.push((body.start(), key.to_string()));
            }
        }
    }

    found.sort_by_key(|(position, _)| *position);

    let mut names: Vec<String> = Vec::new();
    for (_, name) in found {
        if is_identifier(&name) && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// The names the bundle injects into the test scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBindings {
    target: String,
    names: Vec<String>,
}

impl ResolvedBindings {
    pub fn target(&self) -> &str {
        &self.target
    }

    /// All injected names; the target always comes first
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Resolve the target function against the user code's declarations
///
/// An empty `target_function_name` selects the first declaration.
/// Fails with `SandboxError::Validation` when nothing resolves.
pub fn resolve_bindings(
    user_code: &str,
    target_function_name: &str,
) -> Result<ResolvedBindings, SandboxError> {
    let declared = detect_declarations(user_code);
    let requested = target_function_name.trim();

    let target = if requested.is_empty() {
        declared.first().cloned().ok_or_else(|| {
            SandboxError::Validation(
                "no function declaration found in userCode; supply targetFunctionName".to_string(),
            )
        })?
    } else {
        if !is_identifier(requested) {
            return Err(SandboxError::Validation(format!(
                "targetFunctionName '{}' is not a valid JavaScript identifier",
                requested
            )));
        }
        if !declared.iter().any(|name| name == requested) {
            return Err(SandboxError::Validation(format!(
                "function '{}' is not declared in userCode",
                requested
            )));
        }
        requested.to_string()
    };

    let mut names = vec![target.clone()];
    names.extend(declared.into_iter().filter(|name| *name != target));

    Ok(ResolvedBindings { target, names })
}
