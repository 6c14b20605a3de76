use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ldsc::ldscore::{freq, ldscore};
use ldsc::logging::{RunLog, init_tracing};
use ldsc::regression::sumstats;
use ldsc::request::{FreqConfig, LdScoreFlags, SumstatsFlags};

#[derive(Parser)]
#[command(name = "ldsc")]
#[command(about = "LD Score estimation and LD Score regression", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate LD Scores from a PLINK fileset.
    Ldscore {
        #[arg(long, required = true)]
        bfile: String,
        #[arg(long, default_value = "ldsc")]
        out: String,
        #[arg(long)]
        annot: Option<PathBuf>,
        #[arg(long)]
        extract: Option<PathBuf>,
        #[arg(long)]
        keep: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        cts_bin: Option<Vec<PathBuf>>,
        #[arg(long, value_delimiter = ',')]
        cts_bin_add: Option<Vec<PathBuf>>,
        #[arg(long)]
        cts_breaks: Option<String>,
        #[arg(long, value_delimiter = ',')]
        cts_names: Option<Vec<String>>,
        #[arg(long)]
        ld_wind_snps: Option<usize>,
        #[arg(long)]
        ld_wind_kb: Option<f64>,
        #[arg(long)]
        ld_wind_cm: Option<f64>,
        #[arg(long, default_value_t = 50)]
        chunk_size: usize,
        #[arg(long)]
        maf: Option<f64>,
        #[arg(long)]
        per_allele: bool,
        #[arg(long, allow_hyphen_values = true)]
        pq_exp: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        maf_exp: Option<f64>,
        #[arg(long)]
        print_snps: Option<PathBuf>,
        #[arg(long)]
        yes_really: bool,
        #[arg(long)]
        no_print_annot: bool,
    },
    /// Heritability, partitioned heritability or genetic correlation.
    Sumstats {
        #[arg(long, default_value = "ldsc")]
        out: String,
        #[arg(long)]
        intercept: Option<String>,
        #[arg(long)]
        h2: Option<String>,
        #[arg(long, value_delimiter = ',')]
        rg: Option<Vec<String>>,
        #[arg(long)]
        ref_ld: Option<String>,
        #[arg(long)]
        ref_ld_chr: Option<String>,
        #[arg(long)]
        ref_ld_fromfile: Option<PathBuf>,
        #[arg(long)]
        ref_ld_fromfile_chr: Option<PathBuf>,
        #[arg(long)]
        w_ld: Option<String>,
        #[arg(long)]
        w_ld_chr: Option<String>,
        #[arg(long = "M", allow_hyphen_values = true)]
        m: Option<String>,
        #[arg(long = "M-file")]
        m_file: Option<String>,
        #[arg(long = "not-M-5-50")]
        not_m_5_50: bool,
        #[arg(long)]
        keep_ld: Option<String>,
        #[arg(long)]
        invert_anyway: bool,
        #[arg(long)]
        no_filter_chisq: bool,
        #[arg(long)]
        no_intercept: bool,
        #[arg(long, allow_hyphen_values = true)]
        constrain_intercept: Option<String>,
        #[arg(long)]
        non_negative: bool,
        #[arg(long)]
        aggregate: bool,
        #[arg(long)]
        annot: Option<PathBuf>,
        #[arg(long)]
        info_min: Option<f64>,
        #[arg(long)]
        info_max: Option<f64>,
        #[arg(long)]
        maf: Option<f64>,
        #[arg(long, default_value_t = 0.0)]
        overlap: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        rho: f64,
        #[arg(long, default_value_t = 200)]
        num_blocks: usize,
        #[arg(long)]
        human_only: bool,
        #[arg(long)]
        print_delete_vals: bool,
    },
    /// Write allele frequencies of a PLINK fileset.
    Freq {
        #[arg(long, required = true)]
        bfile: String,
        #[arg(long, default_value = "ldsc")]
        out: String,
        #[arg(long)]
        extract: Option<PathBuf>,
        #[arg(long)]
        keep: Option<PathBuf>,
    },
}

/// Groups the raw command line into one `--flag values...` entry per flag.
fn options_from_args(args: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for arg in args {
        if arg.starts_with("--") || out.is_empty() {
            out.push(arg.clone());
        } else if let Some(last) = out.last_mut() {
            last.push(' ');
            last.push_str(arg);
        }
    }
    out
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let args: Vec<String> = std::env::args().skip(2).collect();
    let options = options_from_args(&args);

    match cli.command {
        Command::Ldscore {
            bfile,
            out,
            annot,
            extract,
            keep,
            cts_bin,
            cts_bin_add,
            cts_breaks,
            cts_names,
            ld_wind_snps,
            ld_wind_kb,
            ld_wind_cm,
            chunk_size,
            maf,
            per_allele,
            pq_exp,
            maf_exp,
            print_snps,
            yes_really,
            no_print_annot,
        } => {
            let flags = LdScoreFlags {
                bfile,
                out,
                annot,
                extract,
                keep,
                cts_bin,
                cts_bin_add,
                cts_breaks,
                cts_names,
                ld_wind_snps,
                ld_wind_kb,
                ld_wind_cm,
                chunk_size,
                maf,
                per_allele,
                pq_exp,
                maf_exp,
                print_snps,
                yes_really,
                no_print_annot,
            };
            let mut log = RunLog::for_prefix(&flags.out, &options)?;
            let config = flags.validate()?;
            ldscore(&config, &mut log).context("LD Score estimation")?;
            log.line("Analysis finished.")?;
            log.close()?;
        }
        Command::Sumstats {
            out,
            intercept,
            h2,
            rg,
            ref_ld,
            ref_ld_chr,
            ref_ld_fromfile,
            ref_ld_fromfile_chr,
            w_ld,
            w_ld_chr,
            m,
            m_file,
            not_m_5_50,
            keep_ld,
            invert_anyway,
            no_filter_chisq,
            no_intercept,
            constrain_intercept,
            non_negative,
            aggregate,
            annot,
            info_min,
            info_max,
            maf,
            overlap,
            rho,
            num_blocks,
            human_only,
            print_delete_vals,
        } => {
            let flags = SumstatsFlags {
                out,
                intercept,
                h2,
                rg,
                ref_ld,
                ref_ld_chr,
                ref_ld_fromfile,
                ref_ld_fromfile_chr,
                w_ld,
                w_ld_chr,
                m,
                m_file,
                not_m_5_50,
                keep_ld,
                invert_anyway,
                no_filter_chisq,
                no_intercept,
                constrain_intercept,
                non_negative,
                aggregate,
                annot,
                info_min,
                info_max,
                maf,
                overlap,
                rho,
                num_blocks,
                human_only,
                print_delete_vals,
            };
            let mut log = RunLog::for_prefix(&flags.out, &options)?;
            let config = flags.validate()?;
            sumstats(&config, &mut log).context("LD Score regression")?;
            log.line("Analysis finished.")?;
            log.close()?;
        }
        Command::Freq {
            bfile,
            out,
            extract,
            keep,
        } => {
            let config = FreqConfig {
                bfile,
                out,
                extract,
                keep,
            };
            let mut log = RunLog::for_prefix(&config.out, &options)?;
            freq(&config, &mut log).context("allele frequencies")?;
            log.line("Analysis finished.")?;
            log.close()?;
        }
    }
    Ok(())
}
