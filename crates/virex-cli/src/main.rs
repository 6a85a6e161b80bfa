use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::{env, fs};

use virex::{cgen, ErrorReporter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    println!("Virex compiler v{VERSION}");
}

fn print_help() {
    println!("Virex - Explicit control. Predictable speed. Minimal magic.\n");
    println!("Usage: virex [OPTIONS] [COMMAND]\n");
    println!("Commands:");
    println!("  build <file>       Compile a Virex source file\n");
    println!("Options:");
    println!("  --backend=c|llvm   Select the code generation backend (default: c)");
    println!("  --strict-unsafe    Treat unnecessary unsafe blocks as errors");
    println!("  --emit-ir          Print the optimized IR as JSON and stop");
    println!("  -o <path>          Output executable path");
    println!("  --version          Print version information");
    println!("  --help             Print this help message\n");
    println!("Remaining flags are passed to the host C compiler.\n");
    println!("Examples:");
    println!("  virex build main.vx");
    println!("  virex build main.vx -o out/app -lcurl");
}

struct BuildOptions {
    input: String,
    backend: String,
    strict_unsafe: bool,
    emit_ir: bool,
    output: Option<PathBuf>,
    cc_args: Vec<String>,
}

fn parse_build_args(args: &[String]) -> Result<BuildOptions, String> {
    let mut input = None;
    let mut backend = "c".to_owned();
    let mut strict_unsafe = false;
    let mut emit_ir = false;
    let mut output = None;
    let mut cc_args = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--backend=") {
            backend = value.to_owned();
        } else if arg == "--strict-unsafe" {
            strict_unsafe = true;
        } else if arg == "--emit-ir" {
            emit_ir = true;
        } else if arg == "-o" {
            let path = iter.next().ok_or("missing path after -o")?;
            output = Some(PathBuf::from(path));
        } else if arg.starts_with('-') {
            // Unrecognized flags go to the host C compiler verbatim.
            cc_args.push(arg.clone());
        } else if input.is_none() {
            input = Some(arg.clone());
        } else {
            cc_args.push(arg.clone());
        }
    }

    Ok(BuildOptions {
        input: input.ok_or("missing input file")?,
        backend,
        strict_unsafe,
        emit_ir,
        output,
        cc_args,
    })
}

/// Compiles the bundled runtime to an object file next to the generated C,
/// reusing it when already present.
fn ensure_runtime_object(dir: &Path) -> Result<PathBuf, String> {
    let object = dir.join("virex_runtime.o");
    if object.exists() {
        return Ok(object);
    }

    let source = dir.join("virex_runtime.c");
    fs::write(&source, virex::RUNTIME_C).map_err(|err| format!("could not write runtime source: {err}"))?;

    let status = Command::new("gcc")
        .arg("-O2")
        .arg("-c")
        .arg(&source)
        .arg("-o")
        .arg(&object)
        .status()
        .map_err(|err| format!("could not run gcc: {err}"))?;
    if !status.success() {
        return Err("runtime compilation failed".to_owned());
    }
    Ok(object)
}

fn build(options: &BuildOptions) -> ExitCode {
    if options.backend == "llvm" {
        eprintln!("error: LLVM backend not available in this build");
        return ExitCode::FAILURE;
    }
    if options.backend != "c" {
        eprintln!("error: unknown backend '{}'", options.backend);
        return ExitCode::FAILURE;
    }

    let mut reporter = ErrorReporter::new();

    if options.emit_ir {
        let project = match virex::analyze_file(&options.input, options.strict_unsafe, &mut reporter) {
            Ok(project) => project,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        };
        let lowered = cgen::lower_project(&project);
        match serde_json::to_string_pretty(&lowered) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("error: could not serialize IR: {err}");
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    let c_source = match virex::compile_file_to_c(&options.input, options.strict_unsafe, &mut reporter) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Output executable: -o path, or the input's file stem.
    let exe_path = options.output.clone().unwrap_or_else(|| {
        PathBuf::from(
            Path::new(&options.input)
                .file_stem()
                .map_or_else(|| "a.out".to_owned(), |s| s.to_string_lossy().into_owned()),
        )
    });
    if let Some(parent) = exe_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = fs::create_dir_all(parent)
    {
        eprintln!("error: could not create output directory: {err}");
        return ExitCode::FAILURE;
    }

    let work_dir = exe_path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let c_path = work_dir.join("virex_out.c");
    if let Err(err) = fs::write(&c_path, &c_source) {
        eprintln!("error: could not write '{}': {err}", c_path.display());
        return ExitCode::FAILURE;
    }
    println!("✓ Generated C code: {}", c_path.display());

    let runtime_object = match ensure_runtime_object(&work_dir) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("✓ Compiling with gcc...");
    let status = Command::new("gcc")
        .arg("-O2")
        .arg(&c_path)
        .arg(&runtime_object)
        .args(&options.cc_args)
        .arg("-o")
        .arg(&exe_path)
        .arg("-lm")
        .status();

    match status {
        Ok(status) if status.success() => {
            println!("✓ Build successful: {}", exe_path.display());
            ExitCode::SUCCESS
        }
        Ok(_) => {
            eprintln!("✗ Compilation failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: could not run gcc: {err}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--version") {
        print_version();
        return ExitCode::SUCCESS;
    }
    if args.is_empty() || args.iter().any(|a| a == "--help") {
        print_help();
        return if args.is_empty() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    }

    match args[0].as_str() {
        "build" => match parse_build_args(&args[1..]) {
            Ok(options) => build(&options),
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        other => {
            eprintln!("Unknown command: {other}");
            ExitCode::FAILURE
        }
    }
}
