use failure::{Error, ResultExt, bail};
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use roxmltree::{Document, Node};
use std::thread;
use std::time::Duration;
use crate::{Game, Member};

pub const BASE_URL: &str = "https://boardgamegeek.com/xmlapi2";
pub const DEFAULT_GUILD_NAME: &str = "name not available";

/// Raw answer of a GET request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String
}

impl Reply {
    pub fn ok(body: &str) -> Reply {
        Reply { status: StatusCode::OK.as_u16(), body: String::from(body) }
    }
}

/// Anything that can perform a blocking GET.
pub trait Http: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Reply, Error>;
}

impl Http for Client {
    fn fetch(&self, url: &str) -> Result<Reply, Error> {
        let resp = self.get(url).send()
            .with_context(|_| format!("could not download page `{}`", url))?;
        let status = resp.status().as_u16();
        let body = resp.text()
            .with_context(|_| format!("could not read body of `{}`", url))?;
        Ok(Reply { status, body })
    }
}

impl<F> Http for F where F: Fn(&str) -> Result<Reply, Error> + Send + Sync {
    fn fetch(&self, url: &str) -> Result<Reply, Error> {
        self(url)
    }
}

pub struct Fetcher<H> {
    http: H,
    retries: u32,
    wait: Duration
}

impl<H: Http> Fetcher<H> {
    pub fn new(http: H, retries: u32, wait: Duration) -> Fetcher<H> {
        Fetcher { http, retries: retries.max(1), wait }
    }

    /// Downloads `url` and hands the parsed root element to `extract`.
    /// None => every attempt failed, treat as no data.
    pub fn fetch<T>(&self, url: &str, extract: impl Fn(Node) -> T) -> Option<T> {
        for attempt in 1..=self.retries {
            debug!("GET {} (attempt {}/{})", url, attempt, self.retries);
            match self.download(url) {
                Ok(body) => match Document::parse(&body) {
                    Ok(doc) => return Some(extract(doc.root_element())),
                    Err(e) => warn!("malformed xml from {}: {}", url, e)
                },
                Err(e) => warn!("{}", e)
            }
            if attempt < self.retries {
                thread::sleep(self.wait);
            }
        }
        warn!("giving up on {} after {} attempts", url, self.retries);
        None
    }

    fn download(&self, url: &str) -> Result<String, Error> {
        let reply = self.http.fetch(url)?;
        if reply.status != StatusCode::OK.as_u16() {
            bail!("Can't get {}. Status: {}", url, reply.status);
        }
        if reply.body.trim().is_empty() {
            bail!("Empty body from {}", url);
        }
        Ok(reply.body)
    }
}

fn endpoint(base: &str, path: &str, params: &[(&str, &str)]) -> String {
    let raw = format!("{}/{}", base.trim_end_matches('/'), path);
    match Url::parse_with_params(&raw, params) {
        Ok(url) => String::from(url),
        // unparsable base, let the request itself fail and be retried
        Err(_) => raw
    }
}

pub fn roster_url(base: &str, guild: &str, page: u32) -> String {
    let page = page.to_string();
    endpoint(base, "guild", &[("id", guild), ("members", "1"), ("page", page.as_str())])
}

pub fn guild_url(base: &str, guild: &str) -> String {
    endpoint(base, "guild", &[("id", guild)])
}

pub fn collection_url(base: &str, member: &str) -> String {
    endpoint(base, "collection", &[
        ("username", member),
        ("own", "1"),
        ("excludesubtype", "boardgameexpansion"),
        ("stats", "1")
    ])
}

/// Walks the roster of a guild page by page.
pub struct MemberPages<'a, H> {
    fetcher: &'a Fetcher<H>,
    base: &'a str,
    guild: &'a str,
    page: u32,
    seen: Option<Member>,
    unavailable: bool
}

impl<'a, H: Http> MemberPages<'a, H> {
    pub fn new(fetcher: &'a Fetcher<H>, base: &'a str, guild: &'a str) -> MemberPages<'a, H> {
        MemberPages { fetcher, base, guild, page: 0, seen: None, unavailable: false }
    }

    /// True if the walk ended because a page could not be fetched.
    pub fn unavailable(&self) -> bool {
        self.unavailable
    }
}

impl<'a, H: Http> Iterator for MemberPages<'a, H> {
    type Item = Vec<Member>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.unavailable {
            return None;
        }
        self.page += 1;
        let url = roster_url(self.base, self.guild, self.page);
        match self.fetcher.fetch(&url, filter_members) {
            None => {
                self.unavailable = true;
                None
            },
            Some(members) => {
                // an exhausted roster or a server ignoring the page number
                if members.is_empty() || members.first() == self.seen.as_ref() {
                    None
                } else {
                    self.seen = Some(members[0].clone());
                    Some(members)
                }
            }
        }
    }
}

fn filter_members(root: Node) -> Vec<Member> {
    root.descendants()
        .filter(|n| n.has_tag_name("member"))
        .filter_map(|n| n.attribute("name"))
        .map(String::from)
        .collect()
}

/// None => guild metadata unavailable.
pub fn get_guild_name<H: Http>(fetcher: &Fetcher<H>, base: &str, guild: &str) -> Option<String> {
    fetcher.fetch(&guild_url(base, guild), |root| {
        root.attribute("name").unwrap_or(DEFAULT_GUILD_NAME).to_string()
    })
}

/// None => collection unavailable, Some(empty) => member owns nothing.
pub fn get_collection<H: Http>(fetcher: &Fetcher<H>, base: &str, member: &str) -> Option<Vec<Game>> {
    fetcher.fetch(&collection_url(base, member), |root| filter_games(root, member))
}

fn filter_games(root: Node, owner: &str) -> Vec<Game> {
    let items = root.children().filter(|n| n.has_tag_name("item"));

    let mut games = Vec::new();
    for item in items {
        match parse_item(item, owner) {
            Some(game) => games.push(game),
            None => warn!("skipping an item without id or name in the collection of {}", owner)
        }
    }
    games
}

fn parse_item(item: Node, owner: &str) -> Option<Game> {
    let id = item.attribute("objectid")?;
    let name = child_text(item, "name")?;
    let stats = child(item, "stats");
    let rating = stats
        .and_then(|s| child(s, "rating"))
        .and_then(|r| child(r, "average"))
        .and_then(|a| a.attribute("value"))
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite());
    let players = |attr: &str| stats
        .and_then(|s| s.attribute(attr))
        .and_then(|v| v.trim().parse::<u32>().ok());

    Some(Game {
        id: String::from(id),
        name,
        image: child_text(item, "image").map(|s| s.trim().to_string()),
        owner: String::from(owner),
        rating,
        min_players: players("minplayers"),
        max_players: players("maxplayers")
    })
}

fn child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(tag))
}

fn child_text(node: Node, tag: &str) -> Option<String> {
    child(node, tag).and_then(|n| n.text()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COLLECTION: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="yes"?>
<items totalitems="2" termsofuse="https://boardgamegeek.com/xmlapi/termsofuse">
  <item objecttype="thing" objectid="13" subtype="boardgame" collid="1">
    <name sortindex="1">Catan</name>
    <image>https://cf.geekdo-images.com/catan.jpg</image>
    <stats minplayers="3" maxplayers="4" playingtime="120">
      <rating value="N/A">
        <usersrated value="100"/>
        <average value="7.1"/>
      </rating>
    </stats>
  </item>
  <item objecttype="thing" objectid="42" subtype="boardgame" collid="2">
    <name sortindex="1">Tigris &amp; Euphrates</name>
    <stats>
      <rating value="N/A"/>
    </stats>
  </item>
  <item objecttype="thing" subtype="boardgame" collid="3">
    <name sortindex="1">No id</name>
  </item>
</items>"#;

    fn fetcher<F>(f: F) -> Fetcher<F>
        where F: Fn(&str) -> Result<Reply, Error> + Send + Sync {
        Fetcher::new(f, 3, Duration::from_millis(0))
    }

    #[test]
    fn parses_items_with_optional_fields() {
        let f = fetcher(|_: &str| Ok(Reply::ok(COLLECTION)));
        let games = get_collection(&f, BASE_URL, "alice").unwrap();
        assert_eq!(games.len(), 2);

        assert_eq!(games[0].id, "13");
        assert_eq!(games[0].name, "Catan");
        assert_eq!(games[0].image.as_deref(), Some("https://cf.geekdo-images.com/catan.jpg"));
        assert_eq!(games[0].rating, Some(7.1));
        assert_eq!(games[0].min_players, Some(3));
        assert_eq!(games[0].max_players, Some(4));
        assert_eq!(games[0].owner, "alice");

        assert_eq!(games[1].name, "Tigris & Euphrates");
        assert_eq!(games[1].image, None);
        assert_eq!(games[1].rating, None);
        assert_eq!(games[1].players_label(), "(N/A - N/A players)");
    }

    #[test]
    fn retries_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let f = fetcher(move |_: &str| {
            match c.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(Reply { status: 202, body: String::from("<message>queued</message>") }),
                1 => Ok(Reply::ok("<items><item>")),
                _ => Ok(Reply::ok(COLLECTION))
            }
        });
        let games = get_collection(&f, BASE_URL, "alice").unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn gives_up_after_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let f = fetcher(move |_: &str| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::ok("   "))
        });
        assert_eq!(get_collection(&f, BASE_URL, "alice"), None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn transport_errors_are_retried() {
        let f = fetcher(|_: &str| -> Result<Reply, Error> { bail!("connection reset") });
        assert_eq!(get_guild_name(&f, BASE_URL, "1"), None);
    }

    #[test]
    fn zero_retries_still_tries_once() {
        let http = |_: &str| -> Result<Reply, Error> { Ok(Reply::ok("<guild name=\"x\"/>")) };
        let f = Fetcher::new(http, 0, Duration::from_millis(0));
        assert_eq!(get_guild_name(&f, BASE_URL, "1").as_deref(), Some("x"));
    }

    #[test]
    fn guild_name_defaults_when_attribute_missing() {
        let f = fetcher(|_: &str| Ok(Reply::ok("<guild id=\"4523\"></guild>")));
        assert_eq!(get_guild_name(&f, BASE_URL, "4523").as_deref(), Some(DEFAULT_GUILD_NAME));
    }

    #[test]
    fn walks_member_pages_until_empty() {
        let f = fetcher(|url: &str| {
            let body = if url.ends_with("page=1") {
                r#"<guild><members count="3" page="1"><member name="alice"/><member name="bob"/></members></guild>"#
            } else if url.ends_with("page=2") {
                r#"<guild><members count="3" page="2"><member name="carol"/></members></guild>"#
            } else {
                r#"<guild><members count="3" page="3"></members></guild>"#
            };
            Ok(Reply::ok(body))
        });
        let mut pages = MemberPages::new(&f, BASE_URL, "4523");
        let members: Vec<Member> = (&mut pages).flatten().collect();
        assert_eq!(members, vec!["alice", "bob", "carol"]);
        assert!(!pages.unavailable());
    }

    #[test]
    fn stops_on_repeated_page() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let f = fetcher(move |_: &str| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::ok(r#"<guild><members><member name="alice"/></members></guild>"#))
        });
        let members: Vec<Member> = MemberPages::new(&f, BASE_URL, "1").flatten().collect();
        assert_eq!(members, vec!["alice"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reports_unavailable_page() {
        let f = fetcher(|url: &str| {
            if url.ends_with("page=1") {
                Ok(Reply::ok(r#"<guild><members><member name="alice"/></members></guild>"#))
            } else {
                Ok(Reply { status: 500, body: String::new() })
            }
        });
        let mut pages = MemberPages::new(&f, BASE_URL, "1");
        let members: Vec<Member> = (&mut pages).flatten().collect();
        assert_eq!(members, vec!["alice"]);
        assert!(pages.unavailable());
        assert_eq!(pages.next(), None);
    }

    #[test]
    fn encodes_member_names() {
        let url = collection_url(BASE_URL, "john doe&co");
        assert_eq!(url, "https://boardgamegeek.com/xmlapi2/collection?username=john+doe%26co&own=1&excludesubtype=boardgameexpansion&stats=1");
        assert_eq!(roster_url("http://localhost/api/", "7", 2), "http://localhost/api/guild?id=7&members=1&page=2");
    }
}
