use crate::gallery::{Bucket, GuildSnapshot};
use crate::rating;
use crate::Game;
use failure::{Error, ResultExt};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use termcolor::{Color, ColorSpec, WriteColor};

const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/300x400?text=No+image";
const COLUMNS: usize = 5;

pub fn print_snapshot(snap: &GuildSnapshot, out: &mut impl WriteColor) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "Guild: {}", snap.name)?;
    out.reset()?;
    if snap.is_empty() {
        writeln!(out, "No games found.")?;
        return Ok(());
    }

    for (bucket, filled) in snap.index() {
        out.set_color(ColorSpec::new().set_bold(filled).set_dimmed(!filled))?;
        write!(out, "{} ", bucket)?;
    }
    out.reset()?;
    writeln!(out)?;

    for (bucket, games) in snap.groups() {
        writeln!(out)?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true))?;
        writeln!(out, "== {} ==", bucket)?;
        out.reset()?;
        for game in games {
            print_game(game, out)?;
        }
    }
    writeln!(out)?;
    writeln!(out, "{} games.", snap.len())
}

fn print_game(game: &Game, out: &mut impl WriteColor) -> io::Result<()> {
    let (r, g, b) = rating::shade(game.rating).rgb();
    out.set_color(ColorSpec::new()
        .set_bg(Some(Color::Rgb(r, g, b)))
        .set_fg(Some(Color::White))
        .set_bold(true))?;
    write!(out, " {:>4} ", rating::label(game.rating))?;
    out.reset()?;
    writeln!(out, " {} {} {}", game.name, game.players_label(), game.url())
}

/// Anchor used by the index; the catch-all gets a word since `#` is taken.
pub fn anchor(bucket: Bucket) -> String {
    match bucket {
        Bucket::Letter(c) => c.to_ascii_lowercase().to_string(),
        Bucket::Other => String::from("other")
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch)
        }
    }
    out
}

pub fn write_html(snap: &GuildSnapshot, path: &Path) -> Result<PathBuf, Error> {
    let f = File::create(path)
        .with_context(|_| format!("Can't create: {}", path.display()))?;
    let mut w = BufWriter::new(f);
    gallery_html(snap, &mut w)?;
    w.flush()?;
    Ok(path.to_path_buf())
}

pub fn gallery_html(snap: &GuildSnapshot, w: &mut impl Write) -> io::Result<()> {
    let title = escape(&snap.name);
    writeln!(
        w,
        r#"<!doctype html><meta charset="utf-8">
<title>{title}</title>
<style>
  body{{margin:0;font-family:system-ui;display:flex}}
  nav{{position:sticky;top:0;height:100vh;padding:12px;background:#f0f0f0;display:flex;flex-direction:column}}
  nav a{{font-weight:bold;text-decoration:none}}
  nav .empty{{color:#bbb}}
  main{{flex:1;padding:12px}}
  .grid{{display:grid;grid-template-columns:repeat({cols},1fr);gap:15px}}
  .card{{position:relative}}
  .card img{{width:100%;height:auto;border-radius:8px;display:block}}
  .hex-badge{{position:absolute;top:10px;right:10px;width:40px;height:40px;
      clip-path:polygon(50% 0,100% 20%,100% 80%,50% 100%,0 80%,0 20%);
      display:flex;align-items:center;justify-content:center;
      color:white;font-weight:bold;font-size:14px;text-shadow:0 0 2px #000}}
  .game-title{{margin:8px 0 0;font-weight:bold;font-size:14px;text-align:center}}
  .game-players{{margin:0;font-size:14px;text-align:center}}
</style>
<nav>"#,
        title = title,
        cols = COLUMNS
    )?;
    for (bucket, filled) in snap.index() {
        if filled {
            writeln!(w, r##"<a href="#{}">{}</a>"##, anchor(bucket), bucket)?;
        } else {
            writeln!(w, r#"<span class="empty">{}</span>"#, bucket)?;
        }
    }
    writeln!(w, "</nav>\n<main>\n<h1>Guild: {}</h1>", title)?;
    if snap.is_empty() {
        writeln!(w, "<p>No games found.</p>")?;
    }
    for (bucket, games) in snap.groups() {
        writeln!(w, r#"<h2 id="{}">{}</h2>"#, anchor(bucket), bucket)?;
        writeln!(w, r#"<div class="grid">"#)?;
        for game in games {
            card(game, w)?;
        }
        writeln!(w, "</div>")?;
    }
    writeln!(w, "</main>")
}

fn card(game: &Game, w: &mut impl Write) -> io::Result<()> {
    let image = game.image.as_deref().unwrap_or(PLACEHOLDER_IMAGE);
    writeln!(
        w,
        r#"<div class="card">
  <a href="{url}" target="_blank"><img src="{image}" alt="{name}"></a>
  <div class="hex-badge" style="background-color: {color};">{rating}</div>
  <p class="game-title">{name}</p>
  <p class="game-players">{players}</p>
</div>"#,
        url = escape(&game.url()),
        image = escape(image),
        name = escape(&game.name),
        color = rating::shade(game.rating).hex(),
        rating = rating::label(game.rating),
        players = escape(&game.players_label())
    )
}
