use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use packdl::core::job;
use packdl::{PackConfig, Side};

#[derive(Parser)]
#[command(
    name = "packdl",
    about = "Resolve a CurseForge modpack into a ready-to-run installation",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a client side pack.
    Client {
        #[command(flatten)]
        common: CommonArgs,
        /// Create a MultiMC instance instead of a raw tree.
        #[arg(long)]
        multimc: bool,
    },
    /// Create a server side pack.
    Server {
        #[command(flatten)]
        common: CommonArgs,
        /// Write an eula.txt acceptance file. Only use this if you are the
        /// end user and you agree with the Mojang EULA.
        #[arg(long)]
        eula: bool,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Input modpack zip: a file path or an http(s) URL.
    #[arg(short, long)]
    input: String,

    /// Output folder or zip file.
    #[arg(short, long)]
    output: PathBuf,

    /// If the output is a folder, replace subtrees that already exist there.
    #[arg(short, long)]
    delete: bool,

    /// Write into a non-empty folder / over an existing zip.
    #[arg(short = 'w', long = "override")]
    overwrite: bool,

    /// Number of parallel download workers.
    #[arg(short = 'j', long, default_value_t = 8)]
    threads: usize,

    /// Suppress progress output. The final report still prints.
    #[arg(short, long)]
    quiet: bool,

    /// Parent directory for the staging area. Defaults to the system tmp.
    #[arg(long)]
    tmp: Option<PathBuf>,

    /// Skip forge download (and install on servers).
    #[arg(long = "no-forge")]
    no_loader: bool,

    /// Keep the staging directory after the run.
    #[arg(long)]
    keep_tmp: bool,

    /// Put the pack at the root of the output zip instead of wrapping it in
    /// a named folder.
    #[arg(long)]
    root_zip: bool,

    /// Override the pack name used for zip wrapping and instance folders.
    #[arg(long)]
    name: Option<String>,

    /// Skip the remote metadata service and resolve against the content
    /// host only.
    #[arg(long)]
    no_remote_metadata: bool,
}

impl CommonArgs {
    fn into_config(self, side: Side) -> PackConfig {
        PackConfig {
            input: self.input,
            output: self.output,
            side,
            threads: self.threads,
            quiet: self.quiet,
            tmp: self.tmp.unwrap_or_else(std::env::temp_dir),
            no_loader: self.no_loader,
            keep_tmp: self.keep_tmp,
            root_zip: self.root_zip,
            name: self.name,
            remote_metadata: !self.no_remote_metadata,
            delete_existing: self.delete,
            overwrite: self.overwrite,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match cli.command {
        Command::Client { common, multimc } => common.into_config(Side::Client { multimc }),
        Command::Server { common, eula } => common.into_config(Side::Server { eula }),
    };

    // Quiet mode floors the log at warnings; the final report prints either
    // way.
    let filter = if config.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match job::run(&config).await {
        Ok(report) => report.print(),
        Err(error) => {
            eprintln!("ERROR: {error}");
            std::process::exit(1);
        }
    }
}
