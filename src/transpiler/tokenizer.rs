//! Token extraction from a parsed stage function.

use super::builtins::BuiltinRegistry;
use super::syntax::{Expr, FunctionDecl, Stmt, walk_exprs, walk_stmts};
use super::types::{Token, TokenRole};

/// Collect tokens in order: inputs, declarations, built-in uniform uses, then
/// identifier arguments of `texture*` calls.
///
/// `helpers` are scanned for built-in uniforms and texture arguments only;
/// their locals and parameters belong to the helper.
pub fn tokenize(
    func: &FunctionDecl,
    helpers: &[FunctionDecl],
    registry: &BuiltinRegistry,
) -> Vec<Token> {
    let mut tokens: Vec<Token> = func
        .params
        .iter()
        .map(|p| Token {
            text: p.name.clone(),
            role: TokenRole::Input,
            value: p.default.clone(),
        })
        .collect();

    walk_stmts(&func.body, &mut |stmt| {
        if let Stmt::Decl { declarators, .. } = stmt {
            for d in declarators {
                tokens.push(Token {
                    text: d.name.clone(),
                    role: TokenRole::Declared,
                    value: d.init.clone(),
                });
            }
        }
    });

    let bodies: Vec<&[Stmt]> = std::iter::once(func.body.as_slice())
        .chain(helpers.iter().map(|h| h.body.as_slice()))
        .collect();

    for body in &bodies {
        walk_exprs(body, &mut |e| {
            if let Expr::Ident(name) = e
                && registry.contains(name)
            {
                tokens.push(Token {
                    text: name.clone(),
                    role: TokenRole::BuiltinUniform,
                    value: None,
                });
            }
        });
    }

    for body in &bodies {
        walk_exprs(body, &mut |e| {
            let Expr::Call { callee, args } = e else {
                return;
            };
            if !callee.as_ident().is_some_and(|n| n.starts_with("texture")) {
                return;
            }
            for arg in args {
                if let Expr::Ident(name) = arg {
                    tokens.push(Token {
                        text: name.clone(),
                        role: TokenRole::ResourceCallArg,
                        value: None,
                    });
                }
            }
        });
    }

    tokens
}

/// Split on commas outside `()`, `[]` and `{}`. Unbalanced input simply runs
/// to the end of the text.
pub fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for ch in text.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth <= 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transpiler::syntax::parse_function;

    fn roles(tokens: &[Token]) -> Vec<(String, TokenRole)> {
        tokens.iter().map(|t| (t.text.clone(), t.role)).collect()
    }

    #[test]
    fn test_token_order() {
        let f = parse_function(
            "function main(data = [1.0], scale = 2.0) {\n\
             let i = threadId.x\n\
             let c = textureSample(albedo, samp, vec2(0.5, 0.5))\n\
             data[i] = data[i] * scale + resX + frame\n\
             return data }",
        )
        .unwrap();
        let tokens = tokenize(&f, &[], &BuiltinRegistry::standard());
        assert_eq!(
            roles(&tokens),
            vec![
                ("data".to_string(), TokenRole::Input),
                ("scale".to_string(), TokenRole::Input),
                ("i".to_string(), TokenRole::Declared),
                ("c".to_string(), TokenRole::Declared),
                ("resX".to_string(), TokenRole::BuiltinUniform),
                ("frame".to_string(), TokenRole::BuiltinUniform),
                ("albedo".to_string(), TokenRole::ResourceCallArg),
                ("samp".to_string(), TokenRole::ResourceCallArg),
            ]
        );
        assert!(tokens[0].value.is_some());
    }

    #[test]
    fn test_member_names_are_not_builtins() {
        let f = parse_function("function f(p) { let a = p.frame + p.resX }").unwrap();
        let tokens = tokenize(&f, &[], &BuiltinRegistry::standard());
        assert!(
            tokens
                .iter()
                .all(|t| t.role != TokenRole::BuiltinUniform)
        );
    }

    #[test]
    fn test_helpers_contribute_builtins() {
        let f = parse_function("function f() { let a = 1 }").unwrap();
        let h = parse_function("function h() { return mouseX }").unwrap();
        let tokens = tokenize(&f, &[h], &BuiltinRegistry::standard());
        assert!(tokens.iter().any(|t| t.text == "mouseX"));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("a, b = vec3(1, 2, 3), c = [1, 2]"),
            ["a", "b = vec3(1, 2, 3)", "c = [1, 2]"]
        );
        assert_eq!(split_top_level("x = f(1, 2"), ["x = f(1, 2"]);
        assert_eq!(split_top_level("s = 'a,b', t"), ["s = 'a,b'", "t"]);
    }
}
