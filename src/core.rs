use crate::bgg::{self, Fetcher, Http, MemberPages};
use crate::cache::{Cache, MemoryStore, Store};
use crate::db;
use crate::gallery::GuildSnapshot;
use crate::{Game, Member};
use chrono::{Duration as Ttl, Utc};
use failure::{Error, Fail, ResultExt, format_err};
use log::{debug, info};
use serde_derive::{Serialize, Deserialize};
use serde_json::{from_str, to_string_pretty};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use threadpool::ThreadPool;

const CONFIG_FILE_NAME: &str = "app.config";
const DB_FILE_NAME: &str = "guild.db";

pub fn create_structure() -> Result<(), Error> {
    // create config file
    let config = Config { cache_file: Some(String::from(DB_FILE_NAME)), ..Config::default() };
    fs::write(CONFIG_FILE_NAME, to_string_pretty(&config)?)?;
    // create db file
    db::initialize(Path::new(DB_FILE_NAME))?;
    Ok(())
}

/// Reads the config file, defaults if there is none.
pub fn config() -> Result<Config, Error> {
    let conf = match fs::read_to_string(CONFIG_FILE_NAME) {
        Ok(conf) => conf,
        Err(ref e) if e.kind() == ErrorKind::NotFound => {
            info!("{} not found, using defaults", CONFIG_FILE_NAME);
            return Ok(Config::default());
        },
        Err(e) => return Err(e.context(format!("Can't open: {}", CONFIG_FILE_NAME)).into())
    };
    let conf = from_str(&conf)
        .with_context(|_| format!("Can't parse: {}", CONFIG_FILE_NAME))?;
    Ok(conf)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub guild: String, // guild loaded when none is given
    pub base_url: String,
    pub retries: u32, // attempts per request
    pub wait: u64, // ms between attempts
    pub ttl: u64, // s, cache lifetime
    pub threads: usize, // members loaded at once
    pub cache_file: Option<String> // none => in-memory cache
}

impl Default for Config {
    fn default() -> Config {
        Config {
            guild: String::from("4523"),
            base_url: String::from(bgg::BASE_URL),
            retries: 5,
            wait: 2000,
            ttl: 3600,
            threads: 1,
            cache_file: None
        }
    }
}

impl Config {
    pub fn cache(&self) -> Result<Cache, Error> {
        let store: Box<dyn Store> = match self.cache_file {
            Some(ref path) => Box::new(db::DbConn::open(Path::new(path))?),
            None => Box::new(MemoryStore::new())
        };
        let ttl = i64::try_from(self.ttl).ok()
            .and_then(Ttl::try_seconds)
            .ok_or_else(|| format_err!("ttl of {} seconds is too large", self.ttl))?;
        Ok(Cache::new(store, ttl))
    }
}

#[derive(Debug, Fail)]
pub enum LoadError {
    #[fail(display = "no members found or connection error")]
    NoMembers,
    #[fail(display = "load interrupted")]
    Interrupted
}

#[derive(Debug, PartialEq)]
pub enum Message {
    Roster(usize), // members found
    Collection { member: Member, games: usize }
}

/// Explicit outcome of merging every member's collection.
#[derive(Debug, PartialEq)]
pub enum Aggregate {
    NoGames,
    Games(Vec<Game>)
}

/// Cached access to the remote API.
pub struct Source<H> {
    fetcher: Fetcher<H>,
    cache: Cache,
    base: String
}

impl<H: Http> Source<H> {
    pub fn new(http: H, cache: Cache, config: &Config) -> Source<H> {
        Source {
            fetcher: Fetcher::new(http, config.retries, Duration::from_millis(config.wait)),
            cache,
            base: config.base_url.clone()
        }
    }

    /// Full roster in server order; empty if nothing could be fetched.
    pub fn members(&self, guild: &str) -> Vec<Member> {
        let key = format!("members/{}", guild);
        if let Some((members, true)) = self.cache.get::<Vec<Member>>(&key) {
            debug!("cache hit: {}", key);
            return members;
        }
        let mut pages = MemberPages::new(&self.fetcher, &self.base, guild);
        let members: Vec<Member> = (&mut pages).flatten().collect();
        // a partial roster is served but not remembered
        if !pages.unavailable() {
            self.cache.put(&key, &members, Utc::now());
        }
        members
    }

    /// Owned games of a member; empty if unavailable.
    pub fn collection(&self, member: &str) -> Vec<Game> {
        let key = format!("collection/{}", member);
        self.cache.cached(&key, || bgg::get_collection(&self.fetcher, &self.base, member))
            .unwrap_or_default()
    }

    pub fn guild_name(&self, guild: &str) -> String {
        bgg::get_guild_name(&self.fetcher, &self.base, guild)
            .unwrap_or_else(|| String::from(bgg::DEFAULT_GUILD_NAME))
    }

    pub fn clear(&self) -> Result<(), Error> {
        self.cache.clear()
    }
}

/// Merges per-member lists given in roster order. The last record seen for an
/// id wins; the id keeps the position of its first appearance.
pub fn merge(lists: Vec<Vec<Game>>) -> Vec<Game> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut games: Vec<Game> = Vec::new();
    for game in lists.into_iter().flatten() {
        match positions.get(&game.id) {
            Some(&i) => games[i] = game,
            None => {
                positions.insert(game.id.clone(), games.len());
                games.push(game);
            }
        }
    }
    games
}

/// Loads every member's collection, one by one or on a pool of `threads`.
/// Output does not depend on completion order.
pub fn aggregate<H: Http + 'static>(source: &Arc<Source<H>>, members: &[Member], threads: usize,
        running: &Arc<AtomicBool>, mut progress: impl FnMut(Message)) -> Result<Aggregate, Error> {
    let mut lists: Vec<Vec<Game>> = vec![Vec::new(); members.len()];

    if threads <= 1 {
        for (i, member) in members.iter().enumerate() {
            if !running.load(Ordering::SeqCst) {
                return Err(LoadError::Interrupted.into());
            }
            lists[i] = source.collection(member);
            progress(Message::Collection { member: member.clone(), games: lists[i].len() });
        }
    } else {
        let (tx, rx) = mpsc::channel();
        let pool = ThreadPool::new(threads);
        for (i, member) in members.iter().enumerate() {
            let tx = tx.clone();
            let source = source.clone();
            let running = running.clone();
            let member = member.clone();
            pool.execute(move || {
                let games = if running.load(Ordering::SeqCst) {
                    Some(source.collection(&member))
                } else {
                    None
                };
                // receiver outlives the pool
                let _ = tx.send((i, member, games));
            });
        }
        drop(tx);
        for (i, member, games) in rx {
            if let Some(games) = games {
                progress(Message::Collection { member, games: games.len() });
                lists[i] = games;
            }
        }
        pool.join();
        if !running.load(Ordering::SeqCst) {
            return Err(LoadError::Interrupted.into());
        }
    }

    let games = merge(lists);
    debug!("{} distinct games from {} members", games.len(), members.len());
    if games.is_empty() {
        Ok(Aggregate::NoGames)
    } else {
        Ok(Aggregate::Games(games))
    }
}

/// Fetches, merges and groups the collections of a guild.
pub fn load_guild<H: Http + 'static>(source: &Arc<Source<H>>, guild: &str, threads: usize,
        running: &Arc<AtomicBool>, mut progress: impl FnMut(Message)) -> Result<GuildSnapshot, Error> {
    let members = source.members(guild);
    if members.is_empty() {
        return Err(LoadError::NoMembers.into());
    }
    progress(Message::Roster(members.len()));

    let games = match aggregate(source, &members, threads, running, &mut progress)? {
        Aggregate::NoGames => Vec::new(),
        Aggregate::Games(games) => games
    };
    let name = source.guild_name(guild);
    Ok(GuildSnapshot::new(guild, &name, games))
}
