mod cli;

use bgg_guild::core::{self, LoadError, Message, Source};
use bgg_guild::render;
use cli::Cli;
use structopt::StructOpt;
use failure::Error;
use exitfailure::ExitFailure;
use reqwest::blocking::Client;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::path::PathBuf;
use std::io::Write;

fn main() -> Result<(), ExitFailure> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::from_args();
    match cli {
        Cli::New { } => create_structure()?,
        Cli::Load { guild, html } => load(guild, html)?,
        Cli::Clear { } => clear_cache()?
    }
    Ok(())
}

fn create_structure() -> Result<(), Error> {
    core::create_structure()?;
    println!("Created initial structure files.");
    Ok(())
}

fn load(guild: Option<String>, html: Option<PathBuf>) -> Result<(), Error> {
    // Cancellation token
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    // Bind cancellation token with ctrl+c command
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;
    let config = core::config()?;
    let guild = guild.unwrap_or_else(|| config.guild.clone());
    let source = Arc::new(Source::new(Client::new(), config.cache()?, &config));

    println!("Loading guild {}.", guild);
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let mut total: usize = 0;
    let mut done: usize = 0;
    let snapshot = core::load_guild(&source, &guild, config.threads, &running, |m| match m {
        Message::Roster(n) => {
            total = n;
            println!("Found {} members.", n);
        },
        Message::Collection { member, games } => {
            done += 1;
            println!("[{}/{}] {} owns {} games.", done, total, member, games);
        }
    });
    let snapshot = match snapshot {
        Ok(s) => s,
        Err(e) => {
            if let Some(LoadError::Interrupted) = e.downcast_ref::<LoadError>() {
                stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
                writeln!(&mut stdout, "Stopped before every member was loaded.")?;
                stdout.reset()?;
            }
            return Err(e);
        }
    };

    println!();
    render::print_snapshot(&snapshot, &mut stdout)?;
    if let Some(path) = html {
        let path = render::write_html(&snapshot, &path)?;
        println!("Gallery written to {}.", path.display());
    }
    Ok(())
}

fn clear_cache() -> Result<(), Error> {
    let config = core::config()?;
    config.cache()?.clear()?;
    println!("Cache cleared.");
    Ok(())
}
