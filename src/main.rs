use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use wgsl_forge::options::CompileOptions;
use wgsl_forge::runtime::layout_entries;
use wgsl_forge::transpiler::validation::validate_wgsl_with_context;
use wgsl_forge::transpiler::{StageProgram, Transpiler};

#[derive(Debug, Default, Clone)]
struct Cli {
    compute: Option<PathBuf>,
    vertex: Option<PathBuf>,
    fragment: Option<PathBuf>,
    options: Option<PathBuf>,
    validate: bool,
    bindings: bool,
}

const USAGE: &str = "supported: --compute <f.js>, --vertex <f.js>, --fragment <f.js>, --options <o.json>, --validate, --bindings";

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let slot = match flag {
            "--validate" => {
                cli.validate = true;
                i += 1;
                continue;
            }
            "--bindings" => {
                cli.bindings = true;
                i += 1;
                continue;
            }
            "--compute" => &mut cli.compute,
            "--vertex" => &mut cli.vertex,
            "--fragment" => &mut cli.fragment,
            "--options" => &mut cli.options,
            other => return Err(anyhow!("unknown argument: {other} ({USAGE})")),
        };
        let Some(v) = args.get(i + 1) else {
            return Err(anyhow!("missing value for {flag}"));
        };
        *slot = Some(PathBuf::from(v));
        i += 2;
    }
    if cli.compute.is_none() && cli.vertex.is_none() && cli.fragment.is_none() {
        return Err(anyhow!("nothing to compile ({USAGE})"));
    }
    Ok(cli)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn print_bindings(programs: &[&StageProgram]) -> Result<()> {
    let Some(first) = programs.first() else {
        return Ok(());
    };
    let entries = layout_entries(programs, first.bind_group_number);
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let options = match &cli.options {
        Some(path) => CompileOptions::from_json(&read(path)?)
            .with_context(|| format!("invalid options in {}", path.display()))?,
        None => CompileOptions::default(),
    };
    let transpiler = Transpiler::new();

    if let Some(path) = &cli.compute {
        let program = transpiler.compile_compute(&read(path)?, &options)?;
        for name in &program.inference_fallbacks {
            eprintln!("[warn] `{name}` typed by fallback");
        }
        if cli.validate {
            validate_wgsl_with_context(&program.code, "compute stage")?;
        }
        print!("{}", program.code);
        if cli.bindings {
            print_bindings(&[&program])?;
        }
    }

    if cli.vertex.is_some() || cli.fragment.is_some() {
        let vertex = cli.vertex.as_deref().map(read).transpose()?;
        let fragment = cli.fragment.as_deref().map(read).transpose()?;
        let render = transpiler.compile_render(vertex.as_deref(), fragment.as_deref(), &options)?;
        if cli.validate {
            validate_wgsl_with_context(&render.code, "render program")?;
        }
        print!("{}", render.code);
        if cli.bindings {
            print_bindings(&render.stages())?;
        }
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = parse_cli(&args).and_then(|cli| run(&cli));
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_cli_render_with_flags() {
        let cli = parse_cli(&args(&[
            "--vertex",
            "v.js",
            "--fragment",
            "f.js",
            "--validate",
            "--bindings",
        ]))
        .unwrap();
        assert_eq!(cli.vertex.as_ref().unwrap(), &PathBuf::from("v.js"));
        assert_eq!(cli.fragment.as_ref().unwrap(), &PathBuf::from("f.js"));
        assert!(cli.validate && cli.bindings);
        assert!(cli.compute.is_none());
    }

    #[test]
    fn parse_cli_rejects_missing_value_and_unknown_flag() {
        let err = parse_cli(&args(&["--compute"])).unwrap_err();
        assert!(err.to_string().contains("missing value for --compute"));
        let err = parse_cli(&args(&["--headless"])).unwrap_err();
        assert!(err.to_string().contains("unknown argument: --headless"));
    }

    #[test]
    fn parse_cli_requires_a_stage() {
        assert!(parse_cli(&args(&["--validate"])).is_err());
    }
}
