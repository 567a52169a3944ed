//! ES module syntax normalisation.
//!
//! Bundles run as a plain function body, where `import` and `export` are
//! syntax errors. Submitted code and generated tests use them anyway, so the
//! common forms are lowered before bundling. Anything this module does not
//! recognise is left as-is and surfaces as a compilation error.
//!
//! This is a line-oriented rewrite, not a parser. Recognised forms:
//!
//! - `export` before a `function`, `class`, `const`, `let` or `var`
//!   declaration, `export { a, b }` and `export default <name>`
//! - `import x from '…'`, `import { a, b as c } from '…'`,
//!   `import * as ns from '…'`, their default-plus-named combinations,
//!   and `import '…'`
//!
//! Each statement must start its own line. Not recognised: statements that
//! follow other code on the same line, dynamic `import()`, `import.meta`,
//! import attributes (`with { … }`), `export * from` and re-exports such as
//! `export { a } from '…'`. The rewrite never changes what a specifier
//! resolves to; `require` in the sandbox decides that.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::bindings::is_identifier;

lazy_static! {
    static ref EXPORT_PREFIX: Regex =
        Regex::new(r"(?m)^([ \t]*)export[ \t]+(?:default[ \t]+)?((?:async[ \t]+)?function\b|class\b|const\b|let\b|var\b)")
            .expect("export pattern compiles");

    static ref EXPORT_LIST: Regex = Regex::new(r"(?m)^([ \t]*)export[ \t]*\{[^}]*\}[ \t]*;?")
        .expect("export list pattern compiles");

    static ref EXPORT_DEFAULT_NAME: Regex =
        Regex::new(r"(?m)^([ \t]*)export[ \t]+default[ \t]+([A-Za-z_$][\w$]*)[ \t]*;?[ \t]*$")
            .expect("export default pattern compiles");

    static ref IMPORT_FROM: Regex = Regex::new(
        r#"(?m)^[ \t]*import[ \t]+(?:([A-Za-z_$][\w$]*)[ \t]*,?[ \t]*)?(?:\{([^}]*)\}|\*[ \t]*as[ \t]+([A-Za-z_$][\w$]*))?[ \t\r\n]*from[ \t]*['"]([^'"\r\n]+)['"][ \t]*;?"#
    )
    .expect("import pattern compiles");

    static ref IMPORT_BARE: Regex =
        Regex::new(r#"(?m)^[ \t]*import[ \t]*['"]([^'"\r\n]+)['"][ \t]*;?"#)
            .expect("side-effect import pattern compiles");
}

/// Drop `export` keywords from user code, keeping the declarations
pub fn strip_exports(user_code: &str) -> String {
    let stripped = EXPORT_PREFIX.replace_all(user_code, "$1$2");
    let stripped = EXPORT_LIST.replace_all(&stripped, "$1");
    EXPORT_DEFAULT_NAME
        .replace_all(&stripped, "$1")
        .into_owned()
}

/// Lower ES `import` statements in test code to `require` calls
pub fn lower_imports(test_code: &str) -> String {
    let lowered = IMPORT_FROM.replace_all(test_code, |caps: &Captures| {
        lower_import_from(caps).unwrap_or_else(|| caps[0].to_string())
    });

    IMPORT_BARE
        .replace_all(&lowered, |caps: &Captures| {
            format!("require({});", quote(&caps[1]))
        })
        .into_owned()
}

fn lower_import_from(caps: &Captures) -> Option<String> {
    let default_name = caps.get(1).map(|m| m.as_str());
    let named = caps.get(2).map(|m| m.as_str());
    let namespace = caps.get(3).map(|m| m.as_str());
    let specifier = quote(&caps[4]);

    if default_name.is_none() && named.is_none() && namespace.is_none() {
        return None;
    }

    let mut statements = Vec::new();

    if let Some(name) = default_name {
        if !is_identifier(name) {
            return None;
        }
        statements.push(format!(
            "const {} = __vexor.interopDefault(require({}));",
            name, specifier
        ));
    }

    if let Some(name) = namespace {
        if !is_identifier(name) {
            return None;
        }
        statements.push(format!("const {} = require({});", name, specifier));
    }

    if let Some(list) = named {
        let mut fields = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split_whitespace();
            let imported = parts.next()?;
            let field = match (parts.next(), parts.next(), parts.next()) {
                (None, _, _) if is_identifier(imported) => imported.to_string(),
                (Some("as"), Some(local), None) if is_identifier(local) => {
                    format!("{}: {}", imported, local)
                }
                _ => return None,
            };
            fields.push(field);
        }
        if !fields.is_empty() {
            statements.push(format!(
                "const {{ {} }} = require({});",
                fields.join(", "),
                specifier
            ));
        }
    }

    // Keep the line count stable so error locations stay meaningful
    let newlines = caps[0].matches('\n').count();
    Some(format!("{}{}", statements.join(" "), "\n".repeat(newlines)))
}

fn quote(specifier: &str) -> String {
    serde_json::to_string(specifier).unwrap_or_else(|_| "\"\"".to_string())
}
