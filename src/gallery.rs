use crate::Game;
use std::collections::BTreeMap;
use std::fmt;
use std::iter;

/// Navigation key of a game: its leading Latin letter or the catch-all.
/// Ordering follows the index: `A` to `Z`, then `#`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Letter(char),
    Other
}

impl Bucket {
    /// Every possible key, in index order.
    pub fn all() -> impl Iterator<Item = Bucket> {
        (b'A'..=b'Z')
            .map(|b| Bucket::Letter(b as char))
            .chain(iter::once(Bucket::Other))
    }

    /// Empty names land in the catch-all, as do digits and non-Latin letters.
    pub fn of(name: &str) -> Bucket {
        match name.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => Bucket::Letter(c.to_ascii_uppercase()),
            _ => Bucket::Other
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Bucket::Letter(c) => write!(f, "{}", c),
            Bucket::Other => write!(f, "#")
        }
    }
}

/// Case-insensitive by name; the id breaks ties so the order is total.
pub fn sort_games(games: &mut [Game]) {
    games.sort_by_cached_key(|g| (g.name.to_lowercase(), g.id.clone()));
}

/// Sorts and buckets games. The map always holds all 27 keys.
pub fn group(mut games: Vec<Game>) -> BTreeMap<Bucket, Vec<Game>> {
    sort_games(&mut games);
    let mut groups: BTreeMap<Bucket, Vec<Game>> = Bucket::all().map(|b| (b, Vec::new())).collect();
    for game in games {
        groups.entry(Bucket::of(&game.name)).or_insert_with(Vec::new).push(game);
    }
    groups
}

/// Everything a presenter needs for one guild.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildSnapshot {
    pub guild: String, // guild id
    pub name: String,
    groups: BTreeMap<Bucket, Vec<Game>>
}

impl GuildSnapshot {
    pub fn new(guild: &str, name: &str, games: Vec<Game>) -> GuildSnapshot {
        GuildSnapshot {
            guild: String::from(guild),
            name: String::from(name),
            groups: group(games)
        }
    }

    /// All keys with a flag telling whether the bucket has games.
    pub fn index(&self) -> Vec<(Bucket, bool)> {
        self.groups.iter().map(|(b, games)| (*b, !games.is_empty())).collect()
    }

    /// Non-empty buckets in index order.
    pub fn groups(&self) -> impl Iterator<Item = (Bucket, &[Game])> {
        self.groups.iter()
            .filter(|(_, games)| !games.is_empty())
            .map(|(b, games)| (*b, games.as_slice()))
    }

    pub fn bucket(&self, bucket: Bucket) -> &[Game] {
        self.groups.get(&bucket).map(|g| g.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(|g| g.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
