//! `Math.*` to WGSL built-in substitutions.

use std::collections::BTreeMap;

use super::utils::fmt_float;

#[derive(Clone, Debug, PartialEq)]
pub struct MathTable {
    functions: BTreeMap<&'static str, &'static str>,
    constants: BTreeMap<&'static str, f64>,
}

impl Default for MathTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl MathTable {
    pub fn standard() -> Self {
        let functions = [
            ("abs", "abs"),
            ("acos", "acos"),
            ("acosh", "acosh"),
            ("asin", "asin"),
            ("asinh", "asinh"),
            ("atan", "atan"),
            ("atanh", "atanh"),
            ("atan2", "atan2"),
            ("ceil", "ceil"),
            ("cos", "cos"),
            ("cosh", "cosh"),
            ("exp", "exp"),
            ("floor", "floor"),
            ("fround", "f32"),
            ("log", "log"),
            ("log2", "log2"),
            ("max", "max"),
            ("min", "min"),
            ("pow", "pow"),
            ("round", "round"),
            ("sign", "sign"),
            ("sin", "sin"),
            ("sinh", "sinh"),
            ("sqrt", "sqrt"),
            ("tan", "tan"),
            ("tanh", "tanh"),
            ("trunc", "trunc"),
            ("clz32", "countLeadingZeros"),
        ]
        .into_iter()
        .collect();
        let constants = [("PI", std::f64::consts::PI), ("E", std::f64::consts::E)]
            .into_iter()
            .collect();
        Self {
            functions,
            constants,
        }
    }

    /// WGSL name for `Math.<name>(...)`.
    pub fn function(&self, name: &str) -> Option<&'static str> {
        self.functions.get(name).copied()
    }

    /// Literal text for `Math.<name>`.
    pub fn constant(&self, name: &str) -> Option<String> {
        self.constants.get(name).map(|v| fmt_float(*v))
    }

    /// True when `name` is a WGSL built-in this table can produce.
    pub fn is_wgsl_builtin(&self, name: &str) -> bool {
        self.functions.values().any(|f| *f == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitutions() {
        let t = MathTable::standard();
        assert_eq!(t.function("clz32"), Some("countLeadingZeros"));
        assert_eq!(t.function("fround"), Some("f32"));
        assert_eq!(t.function("random"), None);
        assert_eq!(t.constant("PI").as_deref(), Some("3.141592654"));
        assert_eq!(t.constant("E").as_deref(), Some("2.718281828"));
    }
}
