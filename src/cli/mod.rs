use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "yt2mp3",
    about = "yt2mp3 - Convert YouTube videos to mp3 files",
    version,
    long_about = "Command line tool for converting YouTube videos to mp3 files. All links are resolved, downloaded and converted concurrently; a failing link never stops the others."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one or more YouTube links to mp3 files
    Convert {
        /// YouTube links, comma separated or repeated
        #[arg(short, long = "links", value_name = "LINK", value_delimiter = ',', required = true)]
        links: Vec<String>,

        /// Directory for the mp3 files (overrides the config file)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Maximum number of tasks running at once (overrides the config file)
        #[arg(short = 'j', long, value_name = "COUNT")]
        jobs: Option<usize>,
    },

    /// Show or locate the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert_links() {
        let cli = Cli::try_parse_from([
            "yt2mp3",
            "convert",
            "-l",
            "https://youtu.be/a,https://youtu.be/b",
            "--links",
            "https://youtu.be/c",
            "-o",
            "/music",
            "-j",
            "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Convert {
                links,
                output_dir,
                jobs,
            } => {
                assert_eq!(links, vec!["https://youtu.be/a", "https://youtu.be/b", "https://youtu.be/c"]);
                assert_eq!(output_dir, Some(PathBuf::from("/music")));
                assert_eq!(jobs, Some(2));
            }
            Commands::Config { .. } => panic!("expected convert"),
        }
    }

    #[test]
    fn test_convert_requires_links() {
        assert!(Cli::try_parse_from(["yt2mp3", "convert"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["yt2mp3", "config", "--show", "-v", "-q"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }
}
