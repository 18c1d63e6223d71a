//! WGSL validation of generated modules using naga.

use anyhow::{Context, Result, anyhow};

/// Parse generated WGSL with naga's front end.
///
/// Parsing already lowers the module, so most type mismatches in generated code
/// surface here.
pub fn validate_wgsl(source: &str) -> Result<naga::Module> {
    naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL validation failed:\n{}", format_naga_error(source, &e)))
}

/// Parse and run naga's full validator (uniformity, layouts, entry points).
pub fn validate_module(source: &str) -> Result<naga::Module> {
    let module = validate_wgsl(source)?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("WGSL module is invalid: {e:?}\n{}", numbered(source)))?;
    Ok(module)
}

/// Validate WGSL and say which stage produced it.
pub fn validate_wgsl_with_context(source: &str, context: &str) -> Result<naga::Module> {
    validate_module(source).with_context(|| format!("{context} generated invalid WGSL"))
}

fn numbered(source: &str) -> String {
    let mut output = String::from("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}

fn format_naga_error(source: &str, error: &naga::front::wgsl::ParseError) -> String {
    let mut output = format!("  {}\n", error.emit_to_string(source).trim_end());
    output.push_str("\nGenerated WGSL:\n");
    output.push_str(&numbered(source));
    output
}
