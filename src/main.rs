use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use quetzal::error::{Error, Result};
use quetzal::store::Artifact;

fn main() {
    env_logger::init();

    let mut pargs = pico_args::Arguments::from_env();
    let cmd = pargs.subcommand().unwrap_or(None);
    let rest: Vec<PathBuf> = pargs.finish().into_iter().map(PathBuf::from).collect();

    let outcome = match (cmd.as_deref(), rest.as_slice()) {
        (Some("run"), [file]) => run_file(file),
        (Some("build"), [src, out]) => build(src, out),
        (Some("exec"), [artifact]) => exec(artifact),
        (Some("quads"), [file]) => quads(file),
        (Some(file), []) => run_file(Path::new(file)),
        _ => {
            eprintln!("usage: quetzal <file>");
            eprintln!("       quetzal run <file>");
            eprintln!("       quetzal build <file> <artifact>");
            eprintln!("       quetzal exec <artifact>");
            eprintln!("       quetzal quads <file>");
            process::exit(2);
        }
    };

    if let Err(e) = outcome {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Compile and execute in one go.
fn run_file(path: &Path) -> Result<()> {
    let artifact = quetzal::compile(&read_source(path)?)?;
    let stdout = io::stdout();
    artifact.into_vm(stdout.lock()).run()
}

/// Compile and persist the artifact.
fn build(src: &Path, out: &Path) -> Result<()> {
    let artifact = quetzal::compile(&read_source(src)?)?;
    artifact.save(out)?;
    log::info!("wrote {}", out.display());
    Ok(())
}

/// Execute a previously built artifact.
fn exec(path: &Path) -> Result<()> {
    let artifact = Artifact::load(path)?;
    let stdout = io::stdout();
    artifact.into_vm(stdout.lock()).run()
}

/// Dump the quadruple listing instead of executing.
fn quads(path: &Path) -> Result<()> {
    let artifact = quetzal::compile(&read_source(path)?)?;
    print!("{}", artifact);
    Ok(())
}
