/// Code Bundler - Single-Source Test Bundle Construction
///
/// **Core Responsibility:**
/// Combine the harness, the user's code and the generated tests into one
/// function body whose completion value is the serialized `ExecutionResult`.
///
/// **Scoping Rules:**
/// - User code runs in its own function scope with `module`, `exports` and a
///   `require` that refuses every specifier
/// - Declared names are captured after the user code ran and linked against
///   `module.exports`
/// - Tests run two scopes further in: the resolved names are parameters of
///   the outer one, the harness API of the inner one, so tests may shadow
///   either with their own declarations
/// - Relative `require` specifiers in tests resolve to the user module
///
/// **Non-Responsibilities:**
/// - Does not parse JavaScript; syntax errors surface at compile time
/// - Does not execute anything

use crate::bindings::{resolve_bindings, ResolvedBindings};
use crate::error::SandboxError;
use crate::module_syntax::{lower_imports, strip_exports};

const HARNESS: &str = include_str!("harness.js");

/// Parameters the harness supplies to the test scope, in `testScope` order
const TEST_SCOPE_PARAMS: &str = "require, module, exports, describe, test, it, expect, \
beforeEach, afterEach, beforeAll, afterAll, xdescribe, xit, xtest";

/// A fully assembled bundle, ready for `IsolatedEngine::compile`
#[derive(Debug, Clone)]
pub struct Bundle {
    source: String,
    user_unit: String,
    test_unit: String,
    bindings: ResolvedBindings,
}

impl Bundle {
    /// Build the bundle for one request
    ///
    /// Fails with `SandboxError::Validation` when the target function cannot
    /// be resolved from the user code.
    pub fn build(
        user_code: &str,
        generated_test_code: &str,
        target_function_name: &str,
    ) -> Result<Self, SandboxError> {
        let user_code = strip_exports(user_code);
        let test_code = lower_imports(generated_test_code);
        let bindings = resolve_bindings(&user_code, target_function_name)?;

        let user_unit = user_scope(&user_code, &bindings);
        let test_unit = test_scope(&test_code);
        let source = assemble(&user_unit, &test_unit, &bindings);

        Ok(Self {
            source,
            user_unit,
            test_unit,
            bindings,
        })
    }

    /// The complete function body to compile and run
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The user code's scope alone, for attributing syntax errors
    pub fn user_unit(&self) -> &str {
        &self.user_unit
    }

    /// The test code's scope alone, for attributing syntax errors
    pub fn test_unit(&self) -> &str {
        &self.test_unit
    }

    pub fn bindings(&self) -> &ResolvedBindings {
        &self.bindings
    }

    pub fn target(&self) -> &str {
        self.bindings.target()
    }
}

fn user_scope(user_code: &str, bindings: &ResolvedBindings) -> String {
    let captures = bindings
        .names()
        .iter()
        .map(|name| {
            format!(
                "{}: typeof {} === 'undefined' ? undefined : {}",
                json_string(name),
                name,
                name
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "(function (module, exports, require) {{\n{}\n;return {{ {} }};\n}})",
        user_code, captures
    )
}

fn test_scope(test_code: &str) -> String {
    format!("(function () {{\n{}\n}})", test_code)
}

fn assemble(user_unit: &str, test_unit: &str, bindings: &ResolvedBindings) -> String {
    let names = bindings.names();
    let params = names.join(", ");
    let args = names
        .iter()
        .map(|name| format!("__vexorLinked.values[{}]", json_string(name)))
        .collect::<Vec<_>>()
        .join(", ");
    let name_list = serde_json::to_string(names).unwrap_or_else(|_| "[]".to_string());

    let mut source = String::with_capacity(
        HARNESS.len() + user_unit.len() + test_unit.len() + 1024,
    );
    source.push_str(HARNESS);
    source.push_str("\nconst __vexorUserModule = { exports: {} };\n");
    source.push_str("const __vexorLinked = __vexor.link(__vexorUserModule, ");
    source.push_str(user_unit);
    source.push_str(
        ".call(undefined, __vexorUserModule, __vexorUserModule.exports, __vexor.require(null)), ",
    );
    source.push_str(&json_string(bindings.target()));
    source.push_str(", ");
    source.push_str(&name_list);
    source.push_str(");\n");
    source.push_str(&format!("(function ({}) {{\n", params));
    source.push_str(&format!("(function ({}) {{\n", TEST_SCOPE_PARAMS));
    source.push_str(test_unit);
    source.push_str(".call(undefined);\n");
    source.push_str("}).apply(undefined, __vexor.testScope(__vexorLinked));\n");
    source.push_str(&format!("}}).call(undefined{}{});\n", if args.is_empty() { "" } else { ", " }, args));
    source.push_str("return __vexor.run();\n");
    source
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
