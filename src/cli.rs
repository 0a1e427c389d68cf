//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use eprints2archives_core::default_threads;

/// Send EPrints server content to web archiving services.
///
/// eprints2archives contacts the EPrints server whose REST API is reachable
/// at the URL given with --api-url, discovers the server's public URLs, and
/// asks web archives to take snapshots of them. A typical EPrints API URL
/// has the form "https://server.institution.edu/rest"; a bare host name is
/// probed with https and http, and the "/rest" suffix is added when missing.
#[derive(Parser, Debug)]
#[command(name = "eprints2archives")]
#[command(author, version, about)]
pub struct Args {
    /// URL of the EPrints server's REST API
    #[arg(short = 'a', long, value_name = "URL")]
    pub api_url: Option<String>,

    /// Destination services: "all" or a comma-separated list of names
    #[arg(short = 'd', long, default_value = "all", value_name = "LIST")]
    pub dest: String,

    /// Send URLs even if the archives already have snapshots of them
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Record identifiers: a number, a range like 1-100, a comma list,
    /// or the path of a file with one identifier per line
    #[arg(short = 'i', long, value_name = "LIST")]
    pub id_list: Option<String>,

    /// Only consider records modified on or after this date/time
    #[arg(short = 'l', long, value_name = "DATE")]
    pub lastmod: Option<String>,

    /// Only consider records with these status values ("any" disables;
    /// a leading ^ negates, e.g. "^inbox,buffer")
    #[arg(short = 's', long, value_name = "LIST")]
    pub status: Option<String>,

    /// Number of worker threads (default: half the CPU cores)
    #[arg(short = 't', long, default_value_t = default_threads(), value_parser = clap::value_parser!(usize))]
    pub threads: usize,

    /// EPrints server user login name
    #[arg(short = 'u', long, value_name = "USER")]
    pub user: Option<String>,

    /// EPrints server user password
    #[arg(short = 'p', long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Write a plain-text report of per-URL outcomes to this file
    #[arg(short = 'r', long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Delay between submissions to the same service, in milliseconds
    #[arg(short = 'y', long, default_value_t = 0, value_name = "MS")]
    pub delay: u64,

    /// Suppress informational messages while working
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Do not color-code terminal output
    #[arg(short = 'C', long)]
    pub no_color: bool,

    /// Do not use the system keyring for EPrints credentials
    #[arg(short = 'K', long)]
    pub no_keyring: bool,

    /// Print the list of known archive services and exit
    #[arg(short = 'v', long)]
    pub services: bool,

    /// Stop at the first missing record or per-record error
    #[arg(short = 'e', long)]
    pub error_out: bool,

    /// Write a detailed trace to the given file ("-" means the console)
    #[arg(long, value_name = "OUT")]
    pub debug: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parse_successfully() {
        let args = Args::try_parse_from(["eprints2archives"]).unwrap();
        assert!(args.api_url.is_none());
        assert_eq!(args.dest, "all");
        assert!(!args.force);
        assert!(args.id_list.is_none());
        assert!(args.lastmod.is_none());
        assert!(args.status.is_none());
        assert_eq!(args.threads, default_threads());
        assert_eq!(args.delay, 0);
        assert!(!args.quiet);
        assert!(!args.no_color);
        assert!(!args.no_keyring);
        assert!(!args.services);
        assert!(!args.error_out);
        assert!(args.debug.is_none());
    }

    #[test]
    fn test_cli_api_url_short_and_long() {
        let args =
            Args::try_parse_from(["eprints2archives", "-a", "https://srv.edu/rest"]).unwrap();
        assert_eq!(args.api_url.as_deref(), Some("https://srv.edu/rest"));

        let args =
            Args::try_parse_from(["eprints2archives", "--api-url", "srv.edu"]).unwrap();
        assert_eq!(args.api_url.as_deref(), Some("srv.edu"));
    }

    #[test]
    fn test_cli_dest_list() {
        let args =
            Args::try_parse_from(["eprints2archives", "-d", "internetarchive,archivetoday"])
                .unwrap();
        assert_eq!(args.dest, "internetarchive,archivetoday");
    }

    #[test]
    fn test_cli_filters_and_force() {
        let args = Args::try_parse_from([
            "eprints2archives",
            "-a",
            "srv.edu",
            "-i",
            "1-100",
            "-l",
            "2 weeks ago",
            "-s",
            "^inbox",
            "--force",
        ])
        .unwrap();
        assert_eq!(args.id_list.as_deref(), Some("1-100"));
        assert_eq!(args.lastmod.as_deref(), Some("2 weeks ago"));
        assert_eq!(args.status.as_deref(), Some("^inbox"));
        assert!(args.force);
    }

    #[test]
    fn test_cli_threads_and_delay() {
        let args =
            Args::try_parse_from(["eprints2archives", "-t", "4", "-y", "250"]).unwrap();
        assert_eq!(args.threads, 4);
        assert_eq!(args.delay, 250);
    }

    #[test]
    fn test_cli_debug_console_sentinel() {
        let args = Args::try_parse_from(["eprints2archives", "--debug", "-"]).unwrap();
        assert_eq!(args.debug.as_deref(), Some("-"));
    }

    #[test]
    fn test_cli_version_flag_shows_version() {
        let result = Args::try_parse_from(["eprints2archives", "--version"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let result = Args::try_parse_from(["eprints2archives", "--invalid-flag"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
