//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{anyhow, Context};
use avrc::{
    bind::{self, Modules},
    error::Diagnostics,
    lower, parse, scan, syntax,
};
use clap::{self, crate_version, Arg, Command};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use std::{
    collections::HashSet,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    str::FromStr,
};

/// Última fase a ejecutar, cuyo resultado se emite.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Emit {
    Tokens,
    Syntax,
    Semantic,
    Lowered,
}

impl FromStr for Emit {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "tokens" => Ok(Emit::Tokens),
            "syntax" => Ok(Emit::Syntax),
            "semantic" => Ok(Emit::Semantic),
            "lowered" => Ok(Emit::Lowered),
            _ => Err(()),
        }
    }
}

/// Fallo de compilación.
enum Failure {
    /// Errores en el código fuente, se presentan tal cual.
    Diagnostics(Diagnostics),

    /// Errores del entorno (E/S, etc.).
    Other(anyhow::Error),
}

impl From<Diagnostics> for Failure {
    fn from(diagnostics: Diagnostics) -> Self {
        Failure::Diagnostics(diagnostics)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        Failure::Other(error)
    }
}

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("AVR compiler")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("FILE")
                .help("Root source file"),
        )
        .arg(
            Arg::new("emit")
                .long("emit")
                .value_name("STAGE")
                .takes_value(true)
                .default_value("lowered")
                .possible_values(["tokens", "syntax", "semantic", "lowered"])
                .help("Last stage to run, its result is written to the output"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .default_value("-")
                .value_name("FILE")
                .help("Output file ('-' for stdout)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .multiple_occurrences(true)
                .help("Log stage progress to stderr (-v, -vv)"),
        )
        .get_matches();

    init_logging(args.occurrences_of("verbose"));

    // Se extraen argumentos necesarios
    let input = args
        .value_of("input")
        .ok_or_else(|| anyhow!("No input file given"))?;

    let emit = args.value_of("emit").unwrap_or("lowered");
    let emit = Emit::from_str(emit).map_err(|()| anyhow!("Bad stage: {}", emit))?;
    let output = args.value_of("output").unwrap_or("-");

    let dump = match compile(Path::new(input), emit) {
        Ok(dump) => dump,
        Err(Failure::Other(error)) => return Err(error),
        Err(Failure::Diagnostics(diagnostics)) => {
            eprint!("{}", diagnostics);
            process::exit(1);
        }
    };

    match output {
        "-" => io::stdout()
            .write_all(dump.as_bytes())
            .context("Failed to write to stdout")?,

        path => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            file.write_all(dump.as_bytes())
                .with_context(|| format!("Failed to write to file: {}", path))?;
        }
    }

    Ok(())
}

/// `RUST_LOG` tiene prioridad, excepto si se indica `-v`.
fn init_logging(verbosity: u64) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("avrc=debug"),
        _ => EnvFilter::new("avrc=trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Ejecuta la pipeline hasta `emit` y retorna la representación textual.
fn compile(input: &Path, emit: Emit) -> Result<String, Failure> {
    let tokens = read_and_scan(input)?;
    if emit == Emit::Tokens {
        return Ok(format!("{:#?}\n", tokens));
    }

    let root = parse::parse(&tokens).map_err(|error| Diagnostics::from(error).kind("syntax error"))?;
    if emit == Emit::Syntax {
        return Ok(format!("{:#?}\n", root));
    }

    // Las importaciones se resuelven respecto al directorio del archivo raíz
    let base = input.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut modules = Modules::new();
    load_imports(&base, &root, &mut modules, &mut HashSet::new())?;
    debug!(modules = modules.len(), "loaded imports");

    let semantic = bind::bind(root, &mut modules)
        .map_err(|error| Diagnostics::from(error).kind("semantic error"))?;

    if emit == Emit::Semantic {
        return Ok(format!("{:#?}\n", semantic));
    }

    let lowered = lower::lower(semantic).map_err(|error| Diagnostics::from(error).kind("internal error"))?;
    Ok(lowered.to_string())
}

fn read_and_scan(path: &Path) -> Result<Vec<syntax::SyntaxToken>, Failure> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))?;

    let name = path.to_string_lossy();
    let tokens = scan::scan(&text, &name).map_err(|error| Diagnostics::from(error).kind("lexical error"))?;

    Ok(tokens)
}

/// Carga transitivamente todo archivo importado, una vez por ruta.
///
/// Los ciclos no se detectan aquí, sino en [`bind::bind`].
fn load_imports(
    base: &Path,
    file: &syntax::File,
    modules: &mut Modules,
    visited: &mut HashSet<String>,
) -> Result<(), Failure> {
    for import in file.imports() {
        let path = import.path.as_ref().text();
        if !visited.insert(path.to_owned()) {
            continue;
        }

        let full_path: PathBuf = base.join(path);
        let tokens = read_and_scan(&full_path)?;
        let imported = parse::parse(&tokens).map_err(|error| Diagnostics::from(error).kind("syntax error"))?;

        load_imports(base, &imported, modules, visited)?;
        modules.insert(path, imported);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Directorio temporal propio de cada prueba.
    fn workspace(name: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("avrc-{}-{}", name, process::id()));
        fs::create_dir_all(&dir).unwrap();

        for (path, text) in files {
            fs::write(dir.join(path), text).unwrap();
        }

        dir
    }

    #[test]
    fn emit_names() {
        assert_eq!(Emit::from_str("tokens"), Ok(Emit::Tokens));
        assert_eq!(Emit::from_str("lowered"), Ok(Emit::Lowered));
        assert_eq!(Emit::from_str("asm"), Err(()));
    }

    #[test]
    fn compiles_root_and_imports() {
        let dir = workspace(
            "imports",
            &[
                ("util.av", "function twice(n: Int): Int { return n * 2; }"),
                (
                    "main.av",
                    "import 'util.av';
                     function main(): Int { while twice(1) < 2 { } return 0; }",
                ),
            ],
        );

        let lowered = match compile(&dir.join("main.av"), Emit::Lowered) {
            Ok(lowered) => lowered,
            Err(_) => panic!("compilation failed"),
        };

        assert!(lowered.contains("// util.av"));
        assert!(lowered.contains("l#0:"));
        assert!(lowered.contains("goto l#1 unless (twice(1) < 2);"));

        let tokens = match compile(&dir.join("main.av"), Emit::Tokens) {
            Ok(tokens) => tokens,
            Err(_) => panic!("scanning failed"),
        };

        assert!(tokens.contains("EndOfInput"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn source_errors_become_diagnostics() {
        let dir = workspace("diagnostics", &[("main.av", "function main() { missing(); }")]);

        match compile(&dir.join("main.av"), Emit::Lowered) {
            Err(Failure::Diagnostics(diagnostics)) => {
                let rendered = diagnostics.to_string();
                assert!(rendered.starts_with("semantic error: Symbol `missing` is undefined\n"));
            }

            _ => panic!("expected diagnostics"),
        }

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_files_are_environment_errors() {
        let dir = workspace("missing", &[("main.av", "import 'absent.av';")]);

        match compile(&dir.join("main.av"), Emit::Lowered) {
            Err(Failure::Other(error)) => {
                assert!(error.to_string().starts_with("Failed to read source file"))
            }

            _ => panic!("expected an I/O error"),
        }

        fs::remove_dir_all(&dir).unwrap();
    }
}
