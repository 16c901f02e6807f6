use clap::Parser;

/// Live competition results board for the festival.
///
/// Fetches the results feed, reconciles the per-program publication flags
/// and prints the grouped results.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (url) The endpoint returning the results feed as comma-separated text.
    #[clap(short, long, value_parser)]
    pub feed_url: Option<String>,

    /// (file path) Reads the feed from a local file instead of the endpoint. Useful
    /// for replaying an export downloaded by hand.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (directory path or ':memory:') Location of the publication flag store. Created on
    /// first use; ':memory:' keeps the flags for this run only.
    #[clap(short, long, value_parser, default_value = "program_status.db")]
    pub store: String,

    /// (file path, 'stdout' or empty) If specified, the grouped results summary will be
    /// written in JSON format to the given location instead of the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// Include programs that are not published in the summary.
    #[clap(long, takes_value = false)]
    pub all: bool,

    /// (text) Only keep entries whose candidate, team or program contains this text.
    #[clap(long, value_parser)]
    pub search: Option<String>,

    /// (section name) Only keep entries of this section, e.g. JUNIOR.
    #[clap(long, value_parser)]
    pub section: Option<String>,

    /// (team code) Only keep entries of this team, e.g. AR.
    #[clap(long, value_parser)]
    pub team: Option<String>,

    /// (program code) Publish one program and exit.
    #[clap(long, value_parser)]
    pub publish: Option<String>,

    /// (program code) Unpublish one program and exit.
    #[clap(long, value_parser)]
    pub unpublish: Option<String>,

    /// Publish every program known from the current feed and exit.
    #[clap(long, takes_value = false)]
    pub publish_all: bool,

    /// Unpublish every program known from the current feed and exit.
    #[clap(long, takes_value = false)]
    pub unpublish_all: bool,

    /// (seconds) Keep running and refresh the feed at this interval. A failed
    /// refresh keeps the previous results on display.
    #[clap(long, value_parser)]
    pub watch: Option<u64>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
