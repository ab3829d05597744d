use super::commands;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a structure into chains and write per-chain label records.
    Featurize {
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        output: String,
    },
    /// Draw prior-noised features and write the noisy backbone as PDB.
    Diffuse {
        #[arg(short, long)]
        input: Option<String>,
        #[arg(short, long)]
        output: String,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        t: Option<f64>,
        #[arg(long)]
        gen_region: Option<String>,
        #[arg(long)]
        config: Option<String>,
    },
    /// Interpolate backbone frames between two structures of equal length.
    Interpolate {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(short, long, default_value_t = 10)]
        steps: usize,
        #[arg(short, long)]
        output: String,
    },
}

impl Cli {
    pub fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Featurize { input, output } => commands::featurize::execute(input, output),
            Commands::Diffuse {
                input,
                output,
                seed,
                t,
                gen_region,
                config,
            } => commands::diffuse::execute(input, output, seed, t, gen_region, config),
            Commands::Interpolate {
                from,
                to,
                steps,
                output,
            } => commands::interpolate::execute(from, to, steps, output),
        }
    }
}
