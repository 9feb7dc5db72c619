use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
/// Shows every game owned by the members
/// of a BoardGameGeek guild.
pub enum Cli {
    #[structopt(name = "new")]
    /// Creates new .db and .config files.
    New { },
    #[structopt(name = "load")]
    /// Loads the collections of a guild and
    /// prints them grouped by first letter.
    Load {
        /// Guild id, taken from config if omitted.
        guild: Option<String>,
        #[structopt(long = "html", parse(from_os_str))]
        /// Also writes an HTML gallery to this file.
        html: Option<PathBuf>
    },
    #[structopt(name = "clear")]
    /// Drops every cached roster and collection.
    Clear { }
}
