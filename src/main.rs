use clap::{Parser, ValueEnum};
use miette::Result;
use fct::cli::{Cli, Commands, OutputFormat};
use fct::core::{Config, Project};

fn main() -> Result<()> {
    // Terminate quietly on a closed pipe (`fct sub list | head`)
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let mut global = cli.global;

    // RUST_LOG wins over --verbose
    let level = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    if global.format == OutputFormat::Auto {
        let project = Project::locate(global.project.as_deref()).ok();
        let configured = Config::load_for(project.as_ref()).default_format;
        if let Some(name) = configured {
            match OutputFormat::from_str(&name, true) {
                Ok(format) => global.format = format,
                Err(_) => log::warn!("ignoring unknown default_format '{}' in config", name),
            }
        }
    }

    match cli.command {
        Commands::Init(args) => fct::cli::commands::init::run(args),
        Commands::Form(cmd) => fct::cli::commands::form::run(cmd, &global),
        Commands::Asset(cmd) => fct::cli::commands::asset::run(cmd, &global),
        Commands::Job(cmd) => fct::cli::commands::job::run(cmd, &global),
        Commands::Meter(cmd) => fct::cli::commands::meter::run(cmd, &global),
        Commands::Sub(cmd) => fct::cli::commands::sub::run(cmd, &global),
        Commands::Validate(args) => fct::cli::commands::validate::run(args, &global),
        Commands::Completions(args) => fct::cli::commands::completions::run(args),
    }
}
