use clap::{Args, Parser, Subcommand, ValueEnum};
use recog_common::CertaintyPolicy;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "recog")]
#[command(version)]
#[command(about = "Banner fingerprinting against the Recog pattern corpus", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Match text against every database in a corpus directory
    Match {
        /// Directory holding the corpus XML files
        #[arg(env = "RECOG_XML")]
        xml_dir: PathBuf,

        /// Text to match; each whitespace-separated term is matched on its own.
        /// Lines are read from stdin when omitted.
        text: Vec<String>,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Load every database and check its fingerprints against their examples
    Verify {
        /// Directory holding the corpus XML files
        #[arg(env = "RECOG_XML")]
        xml_dir: PathBuf,

        /// Directory external example files are read from (defaults to the corpus directory)
        #[arg(long)]
        examples: Option<PathBuf>,

        /// Also run the corpus conformance checks
        #[arg(long)]
        lint: bool,

        #[command(flatten)]
        load: LoadArgs,
    },

    /// Compare identifiers asserted by corpus files with the reference lists
    Identifiers {
        /// Write newly discovered identifiers to the reference files
        #[arg(short = 'w', long)]
        write: bool,

        /// Exit with a zero exit code even when identifiers drifted
        #[arg(short = 'z', long)]
        zero: bool,

        /// Recog checkout holding identifiers/<category>.txt
        #[arg(long, env = "RECOG_HOME", default_value = "./recog")]
        recog_home: PathBuf,

        /// Corpus XML files, or directories of them
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Options shared by commands that load a corpus.
#[derive(Args, Debug, Clone, Default)]
pub struct LoadArgs {
    /// Certainty for fingerprints that declare none
    #[arg(long, value_enum)]
    pub certainty_policy: Option<PolicyArg>,

    /// JSON file with load options
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    /// Always 0.85
    Fixed,
    /// The database preference, when present
    Preference,
}

impl From<PolicyArg> for CertaintyPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Fixed => CertaintyPolicy::Fixed,
            PolicyArg::Preference => CertaintyPolicy::InheritPreference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_match() {
        let cli = Cli::parse_from([
            "recog",
            "-vv",
            "match",
            "xml",
            "SSH-2.0-OpenSSH_8.9",
            "--certainty-policy",
            "preference",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Match { xml_dir, text, load } => {
                assert_eq!(xml_dir, PathBuf::from("xml"));
                assert_eq!(text, vec!["SSH-2.0-OpenSSH_8.9".to_string()]);
                assert_eq!(load.certainty_policy, Some(PolicyArg::Preference));
                assert!(load.config.is_none());
            }
            _ => panic!("expected match command"),
        }
    }

    #[test]
    fn parse_identifiers_flags() {
        let cli = Cli::parse_from([
            "recog",
            "identifiers",
            "-w",
            "-z",
            "--recog-home",
            "/tmp/recog",
            "a.xml",
            "b.xml",
        ]);
        match cli.command {
            Commands::Identifiers {
                write,
                zero,
                recog_home,
                files,
            } => {
                assert!(write);
                assert!(zero);
                assert_eq!(recog_home, PathBuf::from("/tmp/recog"));
                assert_eq!(files.len(), 2);
            }
            _ => panic!("expected identifiers command"),
        }
    }

    #[test]
    fn identifiers_requires_files() {
        assert!(Cli::try_parse_from(["recog", "identifiers", "--recog-home", "x"]).is_err());
    }

    #[test]
    fn policy_conversion() {
        assert_eq!(CertaintyPolicy::from(PolicyArg::Fixed), CertaintyPolicy::Fixed);
        assert_eq!(
            CertaintyPolicy::from(PolicyArg::Preference),
            CertaintyPolicy::InheritPreference
        );
    }
}
