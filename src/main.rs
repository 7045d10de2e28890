use argh::FromArgs;
use shell_jobs::Interpreter;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// An interactive shell with POSIX job control.
struct Args {}

fn main() {
    let Args {} = argh::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("shell_jobs: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    // Tell children which shell launched them.
    if let Ok(exe) = std::env::current_exe() {
        // Safety: no other threads are running yet.
        unsafe { std::env::set_var("SHELL", &exe) };
    }

    Interpreter::new()?.repl()
}
