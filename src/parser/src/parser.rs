use std::path::PathBuf;

use clap::{ArgEnum, Args, Parser, Subcommand};
use log::info;
use serde::Serialize;

use crate::error::ParserError;

#[derive(Parser, Debug, Serialize)]
#[clap(name = "snapclust", version, about = "Hierarchical SNP-address clustering of bacterial genomes")]
pub struct Cli {
    /// Set the verbosity level (-v -vv -vvv -vvvv)
    ///
    /// Set the verbosity level of this program. With multiple levels
    ///    -v : Info  |  -vv : Debug  | -vvv : Trace
    /// By default, the program will still output Warnings. Use --quiet/-q to disable them
    #[clap(short = 'v', long, parse(from_occurrences), global = true)]
    pub verbose: u8,
    /// Disable warnings.
    ///
    /// By default, warnings are emitted and redirected to the console, even without verbose mode on.
    /// Use this argument to disable this. Only errors will be displayed.
    #[clap(short = 'q', long, global = true)]
    pub quiet: bool,
    #[clap(subcommand)]
    pub commands: Commands,
}

impl Cli {
    /// Dump the resolved arguments as YAML into the log, so a run can be
    /// reproduced from its output alone.
    pub fn serialize(&self) {
        match serde_yaml::to_string(&self) {
            Ok(yaml) => info!("\n---- Command line args ----\n{yaml}\n---"),
            Err(e)   => info!("Could not serialize command line args: {e}"),
        }
    }
}

#[derive(Subcommand, Debug, Serialize)]
pub enum Commands {
    /// Initialise an empty store with the reference genome.
    ///
    /// Contig names and lengths come from the reference fasta; the json
    /// payload provides the positions with no mapping, which are treated as
    /// globally ignored together with any --exclude intervals.
    AddReference {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        args: AddReference,
    },
    /// Take variants for a sample and add them to the store.
    AddSample {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        args: AddSample,
    },
    /// Determine the clustering for a sample already in the store.
    ///
    /// Performs all statistical checks and merging if necessary and updates
    /// the store accordingly. If statistical checks fail the store is not
    /// updated.
    ClusterSample {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        args: ClusterSample,
    },
    /// Remove a sample from the store.
    ///
    /// This is not a trivial thing to do: cluster stats and stats for other
    /// samples need to be updated, and the integrity of all clusters the
    /// sample is in is checked for the potential need to split them.
    RemoveSample {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        args: RemoveSample,
    },
    /// Get the closest samples to a given sample.
    Closest {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        args: Closest,
    },
    /// Get all samples within a given SNP distance of a sample.
    Within {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        args: Within,
    },
    /// Print a sample's SNP address and its nearest-neighbour band.
    Address {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        args: SnpAddressArgs,
    },
    /// Print a sample's current SNP address and all its past renames.
    History {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        args: History,
    },
    /// Export a sample's stored variants as an ingest json payload.
    Export {
        #[clap(flatten)]
        common: Common,
        #[clap(flatten)]
        args: Export,
    },
}

impl Commands {
    #[must_use]
    pub fn common(&self) -> &Common {
        match self {
            Commands::AddReference { common, .. }
            | Commands::AddSample { common, .. }
            | Commands::ClusterSample { common, .. }
            | Commands::RemoveSample { common, .. }
            | Commands::Closest { common, .. }
            | Commands::Within { common, .. }
            | Commands::Address { common, .. }
            | Commands::History { common, .. }
            | Commands::Export { common, .. } => common,
        }
    }
}

#[derive(Args, Debug, Serialize)]
pub struct Common {
    /// Path to the store file.
    #[clap(short = 'd', long, parse(from_os_str))]
    pub db: PathBuf,
}

#[derive(ArgEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum InputFormat {
    Json,
    Fasta,
}

#[derive(Args, Debug, Serialize)]
pub struct AddReference {
    /// Path to the reference fasta. Provides contig names and lengths.
    #[clap(long, parse(from_os_str))]
    pub reference: PathBuf,
    /// Json payload holding the reference's no-mapping positions.
    #[clap(short, long, parse(from_os_str))]
    pub input: PathBuf,
    /// The sample_name of the reference genome in the store.
    ///
    /// [default: input file name before the 1st dot]
    #[clap(short = 'r', long)]
    pub name: Option<String>,
    /// Bed file with additional regions to ignore everywhere.
    #[clap(long, parse(from_os_str))]
    pub exclude: Option<PathBuf>,
}

#[derive(Args, Debug, Serialize)]
pub struct AddSample {
    /// Path to the input file, optionally gzip-compressed.
    #[clap(short, long, parse(from_os_str))]
    pub input: PathBuf,
    /// Input format of the variant data.
    #[clap(short, long, arg_enum)]
    pub format: InputFormat,
    /// The sample_name of the reference genome in the store.
    #[clap(short, long)]
    pub refname: String,
    /// The name of the sample to go into the store.
    ///
    /// [default: input file name before the 1st dot]
    #[clap(short, long)]
    pub sample_name: Option<String>,
    /// Path to the reference fasta for this sample. Must be the same as the
    /// one the store was initialised with. REQUIRED when format is fasta,
    /// else ignored.
    #[clap(long, parse(from_os_str))]
    pub reference: Option<PathBuf>,
    /// Minimum mean coverage required to allow the sample in. Only
    /// applicable with json format; checks the coverageMetaData annotation.
    ///
    /// [default: do not check this]
    #[clap(long)]
    pub min_coverage: Option<f64>,
    /// Minimum N50 of N-less sequence required to allow the sample in.
    ///
    /// Checks the nlessnessMetaData annotation for json input; calculated
    /// on the fly for fasta input.
    /// [default: do not check this]
    #[clap(long)]
    pub min_nless_n50: Option<u32>,
}

impl AddSample {
    /// Sanity check: fasta input needs the reference sequence, and the
    /// coverage annotation only exists on json payloads.
    pub fn check(&self) -> Result<(), ParserError> {
        if self.format == InputFormat::Fasta && self.reference.is_none() {
            return Err(ParserError::MissingReferenceFasta);
        }
        if self.format == InputFormat::Fasta && self.min_coverage.is_some() {
            return Err(ParserError::CoverageGateNeedsJson);
        }
        Ok(())
    }
}

#[derive(Args, Debug, Serialize)]
pub struct ClusterSample {
    /// The name of the sample to cluster.
    #[clap(short, long)]
    pub sample_name: String,
    /// Do not perform statistical checks and just add the sample. It's fine.
    ///
    /// The sample is flagged as a known outlier on registration.
    /// [Default: Perform checks.]
    #[clap(long)]
    pub no_zscore_check: bool,
    /// Register the clustering for this sample in the store and update the
    /// cluster stats. [Default: Do not register.]
    #[clap(long)]
    pub with_registration: bool,
    /// Add the sample even if it causes clusters to merge.
    /// [Default: Do not add if a merge is required.]
    #[clap(long)]
    pub force_merge: bool,
}

#[derive(Args, Debug, Serialize)]
pub struct RemoveSample {
    /// Name of the sample to remove.
    #[clap(short, long)]
    pub sample: String,
    /// Keep sample and variant information in the store, but remove the
    /// clustering information and set ignore_sample.
    ///
    /// [Default: Remove everything. The sample can be added and clustered
    /// again later.]
    #[clap(long, conflicts_with = "known-outlier")]
    pub just_ignore: bool,
    /// Keep sample, variant and clustering information, but revert the
    /// cluster stats and set ignore_zscore.
    ///
    /// [Default: Remove everything. The sample can be added and clustered
    /// again later.]
    #[clap(long)]
    pub known_outlier: bool,
}

#[derive(Args, Debug, Serialize)]
pub struct Closest {
    /// The name of the query sample.
    #[clap(short, long)]
    pub sample_name: String,
    /// Number of neighbours to report; ties on the last distance are
    /// included.
    #[clap(short, long, default_value("10"))]
    pub neighbours: usize,
}

#[derive(Args, Debug, Serialize)]
pub struct Within {
    /// The name of the query sample.
    #[clap(short, long)]
    pub sample_name: String,
    /// The SNP distance threshold.
    #[clap(short = 'x', long)]
    pub distance: u32,
}

#[derive(Args, Debug, Serialize)]
pub struct SnpAddressArgs {
    /// The name of the query sample.
    #[clap(short, long)]
    pub sample_name: String,
}

#[derive(Args, Debug, Serialize)]
pub struct History {
    /// The name of the query sample.
    #[clap(short, long)]
    pub sample_name: String,
}

#[derive(Args, Debug, Serialize)]
pub struct Export {
    /// The name of the sample to export.
    #[clap(short, long)]
    pub sample_name: String,
    /// Output file. [default: stdout]
    #[clap(short, long, parse(from_os_str))]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fasta_without_reference_is_refused() {
        let args = AddSample {
            input        : PathBuf::from("sample.fasta"),
            format       : InputFormat::Fasta,
            refname      : "ref".to_string(),
            sample_name  : None,
            reference    : None,
            min_coverage : None,
            min_nless_n50: None,
        };
        assert!(matches!(args.check(), Err(ParserError::MissingReferenceFasta)));
    }

    #[test]
    fn coverage_gate_is_json_only() {
        let args = AddSample {
            input        : PathBuf::from("sample.fasta"),
            format       : InputFormat::Fasta,
            refname      : "ref".to_string(),
            sample_name  : None,
            reference    : Some(PathBuf::from("ref.fasta")),
            min_coverage : Some(30.0),
            min_nless_n50: None,
        };
        assert!(matches!(args.check(), Err(ParserError::CoverageGateNeedsJson)));
    }

    #[test]
    fn command_lines_parse() {
        use clap::Parser;
        let cli = Cli::parse_from([
            "snapclust",
            "cluster-sample",
            "--db",
            "store.json",
            "--sample-name",
            "sample01",
            "--with-registration",
            "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.commands {
            Commands::ClusterSample { common, args } => {
                assert_eq!(common.db, PathBuf::from("store.json"));
                assert_eq!(args.sample_name, "sample01");
                assert!(args.with_registration);
                assert!(!args.force_merge);
            }
            other => panic!("parsed into the wrong subcommand: {other:?}"),
        }
    }

    #[test]
    fn remove_modes_are_mutually_exclusive() {
        use clap::Parser;
        let result = Cli::try_parse_from([
            "snapclust",
            "remove-sample",
            "--db",
            "store.json",
            "--sample",
            "sample01",
            "--just-ignore",
            "--known-outlier",
        ]);
        assert!(result.is_err());
    }
}
